//! Query handlers.
//!
//! Queries never fail on an unknown guild: they answer with the empty view,
//! leaving non-existence encoded as an empty persistence id.

use std::sync::Arc;

use async_trait::async_trait;

use guilds_types::delivery::Delivery;
use guilds_types::error::DispatchError;
use guilds_types::guild::GuildState;
use guilds_types::payload::{Payload, PayloadKind};

use crate::aggregate::GuildCache;
use crate::broker::MessageBroker;
use crate::dispatch::QueryHandler;
use crate::repository::{EventStore, GuildStore};

pub struct QueryGuildHandler<S: GuildStore, E: EventStore, B: MessageBroker + 'static> {
    cache: Arc<GuildCache<S, E, B>>,
}

impl<S: GuildStore, E: EventStore, B: MessageBroker + 'static> QueryGuildHandler<S, E, B> {
    pub fn new(cache: Arc<GuildCache<S, E, B>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<S: GuildStore, E: EventStore, B: MessageBroker + 'static> QueryHandler
    for QueryGuildHandler<S, E, B>
{
    async fn handle(&self, delivery: &Delivery) -> Result<Payload, DispatchError> {
        let Payload::QueryGuild { guild_id } = &delivery.payload else {
            return Err(DispatchError::UnexpectedPayload {
                expected: PayloadKind::QueryGuild,
                actual: delivery.payload.kind(),
            });
        };
        let view = match self.cache.get(*guild_id).await? {
            Some(handle) => handle.state().to_view(),
            None => GuildState::empty().to_view(),
        };
        Ok(Payload::GuildResult { view })
    }
}

pub struct QuerySubscribedChannelsHandler<S: GuildStore, E: EventStore, B: MessageBroker + 'static>
{
    cache: Arc<GuildCache<S, E, B>>,
}

impl<S: GuildStore, E: EventStore, B: MessageBroker + 'static>
    QuerySubscribedChannelsHandler<S, E, B>
{
    pub fn new(cache: Arc<GuildCache<S, E, B>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<S: GuildStore, E: EventStore, B: MessageBroker + 'static> QueryHandler
    for QuerySubscribedChannelsHandler<S, E, B>
{
    async fn handle(&self, delivery: &Delivery) -> Result<Payload, DispatchError> {
        let Payload::QuerySubscribedChannels { guild_id } = &delivery.payload else {
            return Err(DispatchError::UnexpectedPayload {
                expected: PayloadKind::QuerySubscribedChannels,
                actual: delivery.payload.kind(),
            });
        };
        let channels = match self.cache.get(*guild_id).await? {
            Some(handle) => handle
                .state()
                .subscribed_channels
                .iter()
                .map(|c| c.to_view())
                .collect(),
            None => Vec::new(),
        };
        Ok(Payload::SubscribedChannelsResult { channels })
    }
}
