//! Broker configuration loader.
//!
//! Reads `broker.toml` from the configuration directory and deserializes it
//! into [`BrokerSettings`]. Falls back to the defaults (a local broker with
//! guest credentials) when the file is missing or malformed.

use std::path::Path;

use guilds_types::config::BrokerSettings;

/// Load broker settings from `{config_dir}/broker.toml`.
///
/// - If the file does not exist, returns [`BrokerSettings::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the
///   default.
/// - If the file exists and parses successfully, returns the parsed settings.
pub async fn load_broker_settings(config_dir: &Path) -> BrokerSettings {
    let settings_path = config_dir.join("broker.toml");

    let content = match tokio::fs::read_to_string(&settings_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(
                "No broker.toml found at {}, using defaults",
                settings_path.display()
            );
            return BrokerSettings::default();
        }
        Err(err) => {
            tracing::warn!(
                "Failed to read {}: {err}, using defaults",
                settings_path.display()
            );
            return BrokerSettings::default();
        }
    };

    match toml::from_str::<BrokerSettings>(&content) {
        Ok(settings) => settings,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                settings_path.display()
            );
            BrokerSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        let settings = load_broker_settings(tmp.path()).await;
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.client_name, "guilds");
    }

    #[tokio::test]
    async fn valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("broker.toml"),
            r#"
host = "rabbit.internal"
port = 5673
client_name = "guilds-worker"
rpc_timeout_secs = 30
"#,
        )
        .await
        .unwrap();

        let settings = load_broker_settings(tmp.path()).await;
        assert_eq!(settings.host, "rabbit.internal");
        assert_eq!(settings.port, 5673);
        assert_eq!(settings.callback_queue(), "guilds-worker-callback");
        assert_eq!(settings.rpc_timeout_secs, 30);
        // Unspecified fields keep their defaults.
        assert_eq!(settings.username, "guest");
    }

    #[tokio::test]
    async fn invalid_toml_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("broker.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let settings = load_broker_settings(tmp.path()).await;
        assert_eq!(settings.port, 5672);
        assert_eq!(settings.client_name, "guilds");
    }
}
