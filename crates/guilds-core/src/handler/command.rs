//! Command handlers.
//!
//! Each handler resolves the target guild through the cache, mutates its
//! handle, and records the triggering delivery on the outbox. Commands that
//! would not change anything (creating an existing guild, renaming to the
//! current name, re-subscribing a channel) are skipped without error.

use std::sync::Arc;

use async_trait::async_trait;

use guilds_types::delivery::Delivery;
use guilds_types::error::DispatchError;
use guilds_types::payload::{Payload, PayloadKind};

use crate::aggregate::GuildCache;
use crate::broker::MessageBroker;
use crate::dispatch::CommandHandler;
use crate::repository::{EventStore, GuildStore};

pub struct CreateGuildHandler<S: GuildStore, E: EventStore, B: MessageBroker + 'static> {
    cache: Arc<GuildCache<S, E, B>>,
}

impl<S: GuildStore, E: EventStore, B: MessageBroker + 'static> CreateGuildHandler<S, E, B> {
    pub fn new(cache: Arc<GuildCache<S, E, B>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<S: GuildStore, E: EventStore, B: MessageBroker + 'static> CommandHandler
    for CreateGuildHandler<S, E, B>
{
    async fn handle(&self, delivery: Delivery) -> Result<(), DispatchError> {
        let Payload::CreateGuild { name, guild_id } = &delivery.payload else {
            return Err(DispatchError::UnexpectedPayload {
                expected: PayloadKind::CreateGuild,
                actual: delivery.payload.kind(),
            });
        };
        if self.cache.get(*guild_id).await?.is_some() {
            tracing::debug!(guild_id, "guild already exists, skipping create");
            return Ok(());
        }
        let handle = self.cache.load_or_create(*guild_id).await?;
        handle.change_name(name).await?;
        handle.add_pending_event(delivery.clone()).await?;
        Ok(())
    }
}

pub struct ChangeGuildNameHandler<S: GuildStore, E: EventStore, B: MessageBroker + 'static> {
    cache: Arc<GuildCache<S, E, B>>,
}

impl<S: GuildStore, E: EventStore, B: MessageBroker + 'static> ChangeGuildNameHandler<S, E, B> {
    pub fn new(cache: Arc<GuildCache<S, E, B>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<S: GuildStore, E: EventStore, B: MessageBroker + 'static> CommandHandler
    for ChangeGuildNameHandler<S, E, B>
{
    async fn handle(&self, delivery: Delivery) -> Result<(), DispatchError> {
        let Payload::ChangeGuildName { name, guild_id } = &delivery.payload else {
            return Err(DispatchError::UnexpectedPayload {
                expected: PayloadKind::ChangeGuildName,
                actual: delivery.payload.kind(),
            });
        };
        let Some(handle) = self.cache.get(*guild_id).await? else {
            tracing::debug!(guild_id, "unknown guild, skipping rename");
            return Ok(());
        };
        if handle.state().name == *name {
            return Ok(());
        }
        handle.change_name(name).await?;
        handle.add_pending_event(delivery.clone()).await?;
        Ok(())
    }
}

pub struct SubscribeChannelHandler<S: GuildStore, E: EventStore, B: MessageBroker + 'static> {
    cache: Arc<GuildCache<S, E, B>>,
}

impl<S: GuildStore, E: EventStore, B: MessageBroker + 'static> SubscribeChannelHandler<S, E, B> {
    pub fn new(cache: Arc<GuildCache<S, E, B>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<S: GuildStore, E: EventStore, B: MessageBroker + 'static> CommandHandler
    for SubscribeChannelHandler<S, E, B>
{
    async fn handle(&self, delivery: Delivery) -> Result<(), DispatchError> {
        let Payload::SubscribeChannel {
            name,
            channel_id,
            guild_id,
        } = &delivery.payload
        else {
            return Err(DispatchError::UnexpectedPayload {
                expected: PayloadKind::SubscribeChannel,
                actual: delivery.payload.kind(),
            });
        };
        let Some(handle) = self.cache.get(*guild_id).await? else {
            tracing::debug!(guild_id, "unknown guild, skipping subscribe");
            return Ok(());
        };
        if handle
            .state()
            .subscribed_channels
            .iter()
            .any(|c| c.channel_id == *channel_id)
        {
            return Ok(());
        }
        handle.subscribe_channel(name, *channel_id).await?;
        handle.add_pending_event(delivery.clone()).await?;
        Ok(())
    }
}

pub struct UnsubscribeChannelHandler<S: GuildStore, E: EventStore, B: MessageBroker + 'static> {
    cache: Arc<GuildCache<S, E, B>>,
}

impl<S: GuildStore, E: EventStore, B: MessageBroker + 'static> UnsubscribeChannelHandler<S, E, B> {
    pub fn new(cache: Arc<GuildCache<S, E, B>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<S: GuildStore, E: EventStore, B: MessageBroker + 'static> CommandHandler
    for UnsubscribeChannelHandler<S, E, B>
{
    async fn handle(&self, delivery: Delivery) -> Result<(), DispatchError> {
        let Payload::UnsubscribeChannel {
            channel_id,
            guild_id,
        } = &delivery.payload
        else {
            return Err(DispatchError::UnexpectedPayload {
                expected: PayloadKind::UnsubscribeChannel,
                actual: delivery.payload.kind(),
            });
        };
        let Some(handle) = self.cache.get(*guild_id).await? else {
            tracing::debug!(guild_id, "unknown guild, skipping unsubscribe");
            return Ok(());
        };
        handle.unsubscribe_channel(*channel_id).await?;
        handle.add_pending_event(delivery.clone()).await?;
        Ok(())
    }
}

pub struct DeleteGuildHandler<S: GuildStore, E: EventStore, B: MessageBroker + 'static> {
    cache: Arc<GuildCache<S, E, B>>,
}

impl<S: GuildStore, E: EventStore, B: MessageBroker + 'static> DeleteGuildHandler<S, E, B> {
    pub fn new(cache: Arc<GuildCache<S, E, B>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<S: GuildStore, E: EventStore, B: MessageBroker + 'static> CommandHandler
    for DeleteGuildHandler<S, E, B>
{
    async fn handle(&self, delivery: Delivery) -> Result<(), DispatchError> {
        let Payload::DeleteGuild { guild_id } = &delivery.payload else {
            return Err(DispatchError::UnexpectedPayload {
                expected: PayloadKind::DeleteGuild,
                actual: delivery.payload.kind(),
            });
        };
        self.cache.delete(*guild_id).await?;
        Ok(())
    }
}
