//! Explicit handler registry.
//!
//! Handlers are registered per payload kind at composition time. Lookup is a
//! plain map access; a missing entry is a configuration error, not a runtime
//! condition to retry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use guilds_types::delivery::Delivery;
use guilds_types::error::DispatchError;
use guilds_types::payload::{Payload, PayloadKind};

/// Executes a command delivery for its side effects. Commands produce no
/// reply.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, delivery: Delivery) -> Result<(), DispatchError>;
}

/// Executes a query delivery and produces the reply payload to send back.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<Payload, DispatchError>;
}

/// Payload-kind-keyed lookup tables for command and query handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    commands: HashMap<PayloadKind, Arc<dyn CommandHandler>>,
    queries: HashMap<PayloadKind, Arc<dyn QueryHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command handler for `kind`, replacing any previous entry.
    pub fn with_command(mut self, kind: PayloadKind, handler: Arc<dyn CommandHandler>) -> Self {
        self.commands.insert(kind, handler);
        self
    }

    /// Register a query handler for `kind`, replacing any previous entry.
    pub fn with_query(mut self, kind: PayloadKind, handler: Arc<dyn QueryHandler>) -> Self {
        self.queries.insert(kind, handler);
        self
    }

    pub fn command(&self, kind: PayloadKind) -> Result<Arc<dyn CommandHandler>, DispatchError> {
        self.commands
            .get(&kind)
            .cloned()
            .ok_or(DispatchError::HandlerNotFound(kind))
    }

    pub fn query(&self, kind: PayloadKind) -> Result<Arc<dyn QueryHandler>, DispatchError> {
        self.queries
            .get(&kind)
            .cloned()
            .ok_or(DispatchError::HandlerNotFound(kind))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use guilds_types::guild::GuildState;

    struct NoopCommand;

    #[async_trait]
    impl CommandHandler for NoopCommand {
        async fn handle(&self, _delivery: Delivery) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    struct EmptyGuildQuery;

    #[async_trait]
    impl QueryHandler for EmptyGuildQuery {
        async fn handle(&self, _delivery: &Delivery) -> Result<Payload, DispatchError> {
            Ok(Payload::GuildResult {
                view: GuildState::empty().to_view(),
            })
        }
    }

    #[test]
    fn lookup_finds_registered_handlers() {
        let registry = HandlerRegistry::new()
            .with_command(PayloadKind::CreateGuild, Arc::new(NoopCommand))
            .with_query(PayloadKind::QueryGuild, Arc::new(EmptyGuildQuery));

        assert!(registry.command(PayloadKind::CreateGuild).is_ok());
        assert!(registry.query(PayloadKind::QueryGuild).is_ok());
    }

    #[test]
    fn missing_handlers_surface_handler_not_found() {
        let registry = HandlerRegistry::new();
        let Err(err) = registry.command(PayloadKind::DeleteGuild) else {
            panic!("lookup in an empty registry must fail");
        };
        assert!(matches!(
            err,
            DispatchError::HandlerNotFound(PayloadKind::DeleteGuild)
        ));
        assert!(registry.query(PayloadKind::QueryGuild).is_err());
    }

    #[test]
    fn command_and_query_tables_are_disjoint() {
        let registry =
            HandlerRegistry::new().with_command(PayloadKind::CreateGuild, Arc::new(NoopCommand));
        assert!(registry.query(PayloadKind::CreateGuild).is_err());
    }
}
