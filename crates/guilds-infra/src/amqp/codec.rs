//! Wire codec between [`Delivery`] and AMQP message primitives.
//!
//! The body is the JSON-encoded payload (tagged with its `kind` field); the
//! correlation id, timestamp, and reply destination travel as AMQP message
//! properties. Timestamps are milliseconds since the Unix epoch.

use chrono::TimeZone;
use chrono::Utc;
use uuid::Uuid;

use guilds_types::delivery::Delivery;
use guilds_types::error::BrokerError;
use guilds_types::payload::Payload;

/// Encode a payload into a wire body.
pub fn encode_body(payload: &Payload) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(payload)
}

/// Decode a wire body and its message properties into a [`Delivery`].
///
/// An unparseable correlation id decodes to `None` rather than failing the
/// whole delivery; a missing timestamp defaults to the receive time.
pub fn decode_delivery(
    body: &[u8],
    correlation_id: Option<&str>,
    timestamp_millis: Option<u64>,
    reply_to: Option<&str>,
) -> Result<Delivery, BrokerError> {
    let payload: Payload =
        serde_json::from_slice(body).map_err(|err| BrokerError::Decode(err.to_string()))?;
    let correlation_id = correlation_id.and_then(|raw| Uuid::parse_str(raw).ok());
    let timestamp = timestamp_millis
        .and_then(|millis| Utc.timestamp_millis_opt(millis as i64).single());

    let mut delivery = Delivery::with_properties(payload, correlation_id, timestamp);
    if let Some(destination) = reply_to {
        delivery = delivery.reply_to(destination);
    }
    Ok(delivery)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_properties_survive_the_wire() {
        let payload = Payload::QueryGuild { guild_id: 42 };
        let body = encode_body(&payload).unwrap();
        let correlation_id = Uuid::new_v4();

        let delivery = decode_delivery(
            &body,
            Some(&correlation_id.to_string()),
            Some(1_700_000_000_000),
            Some("guilds-callback"),
        )
        .unwrap();

        assert_eq!(delivery.payload, payload);
        assert_eq!(delivery.correlation_id, Some(correlation_id));
        assert_eq!(delivery.timestamp.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(delivery.reply_to, "guilds-callback");
        assert!(delivery.event_id.is_empty());
    }

    #[test]
    fn garbage_body_is_a_decode_error() {
        let err = decode_delivery(b"not json", None, None, None).unwrap_err();
        assert!(matches!(err, BrokerError::Decode(_)));
    }

    #[test]
    fn unknown_payload_kind_is_a_decode_error() {
        let err =
            decode_delivery(br#"{"kind":"launch_missiles"}"#, None, None, None).unwrap_err();
        assert!(matches!(err, BrokerError::Decode(_)));
    }

    #[test]
    fn unparseable_correlation_id_decodes_to_none() {
        let body = encode_body(&Payload::DeleteGuild { guild_id: 7 }).unwrap();
        let delivery = decode_delivery(&body, Some("not-a-uuid"), None, None).unwrap();
        assert_eq!(delivery.correlation_id, None);
    }

    #[test]
    fn missing_properties_default_sensibly() {
        let body = encode_body(&Payload::DeleteGuild { guild_id: 7 }).unwrap();
        let before = Utc::now();
        let delivery = decode_delivery(&body, None, None, None).unwrap();
        assert!(delivery.timestamp >= before);
        assert!(delivery.reply_to.is_empty());
    }
}
