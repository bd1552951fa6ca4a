//! The guild mutation pipeline.
//!
//! `GuildService` is the persistence collaborator every state-changing
//! operation on a guild handle goes through: apply a transform to the current
//! snapshot, persist the result, emit the matching notification routed by the
//! guild id, and hand the new snapshot back for publication.

use std::sync::Arc;

use guilds_types::delivery::Delivery;
use guilds_types::error::{RepositoryError, ServiceError};
use guilds_types::guild::{GuildState, SubscribedChannel};
use guilds_types::payload::Payload;

use crate::broker::MessageBroker;
use crate::repository::{EventStore, GuildStore};

/// Orchestrates persist + notify for guild mutations.
///
/// Generic over the persistence and broker ports; one instance is shared by
/// every handle in the process.
pub struct GuildService<S: GuildStore, E: EventStore, B: MessageBroker> {
    store: S,
    events: E,
    broker: Arc<B>,
}

impl<S: GuildStore, E: EventStore, B: MessageBroker> GuildService<S, E, B> {
    pub fn new(store: S, events: E, broker: Arc<B>) -> Self {
        Self {
            store,
            events,
            broker,
        }
    }

    /// Load the persisted state for `guild_id`, inserting a fresh
    /// empty-with-key record when none exists yet.
    pub async fn load_state(&self, guild_id: u64) -> Result<GuildState, RepositoryError> {
        if let Some(existing) = self.store.find_by_guild_id(guild_id).await? {
            return Ok(existing);
        }
        tracing::debug!(guild_id, "inserting fresh guild state");
        self.store
            .insert(GuildState {
                guild_id,
                ..GuildState::empty()
            })
            .await
    }

    /// Does any persisted state exist for `guild_id`?
    pub async fn guild_exists(&self, guild_id: u64) -> Result<bool, RepositoryError> {
        self.store.guild_exists(guild_id).await
    }

    /// Rename the guild and notify `GuildNameChanged` on the guild's routing
    /// key.
    pub async fn change_name(
        &self,
        name: &str,
        current: GuildState,
    ) -> Result<GuildState, ServiceError> {
        let new_state = self
            .apply(current, |old| GuildState {
                name: name.to_string(),
                ..old
            })
            .await?;
        self.broker
            .notify(
                Payload::GuildNameChanged {
                    name: name.to_string(),
                },
                &new_state.guild_id.to_string(),
            )
            .await?;
        Ok(new_state)
    }

    /// Add a channel subscription and notify `SubscribedToChannel`.
    /// Subscriptions are unique by channel id; re-subscribing an existing
    /// channel leaves the list untouched.
    pub async fn subscribe_channel(
        &self,
        name: &str,
        channel_id: u64,
        current: GuildState,
    ) -> Result<GuildState, ServiceError> {
        let channel = SubscribedChannel {
            name: name.to_string(),
            channel_id,
        };
        let new_state = self
            .apply(current, |mut old| {
                if !old
                    .subscribed_channels
                    .iter()
                    .any(|c| c.channel_id == channel_id)
                {
                    old.subscribed_channels.push(channel);
                }
                old
            })
            .await?;
        self.broker
            .notify(
                Payload::SubscribedToChannel {
                    name: name.to_string(),
                    channel_id,
                },
                &new_state.guild_id.to_string(),
            )
            .await?;
        Ok(new_state)
    }

    /// Remove a channel subscription and notify `UnsubscribedFromChannel`.
    pub async fn unsubscribe_channel(
        &self,
        channel_id: u64,
        current: GuildState,
    ) -> Result<GuildState, ServiceError> {
        let new_state = self
            .apply(current, |mut old| {
                old.subscribed_channels.retain(|c| c.channel_id != channel_id);
                old
            })
            .await?;
        self.broker
            .notify(
                Payload::UnsubscribedFromChannel { channel_id },
                &new_state.guild_id.to_string(),
            )
            .await?;
        Ok(new_state)
    }

    /// Record a domain-event delivery on the outbox. The delivery is first
    /// written to the event store, which assigns its `event_id`; the stored
    /// copy is what lands in `pending_events`.
    pub async fn add_pending_event(
        &self,
        delivery: Delivery,
        current: GuildState,
    ) -> Result<GuildState, RepositoryError> {
        let stored = self.events.add(&delivery).await?;
        tracing::trace!(event_id = %stored.event_id, "recording pending domain event");
        self.apply(current, |mut old| {
            old.pending_events.push(stored);
            old
        })
        .await
    }

    /// Drop a propagated domain-event delivery from the outbox.
    pub async fn remove_pending_event(
        &self,
        delivery: &Delivery,
        current: GuildState,
    ) -> Result<GuildState, RepositoryError> {
        self.apply(current, |mut old| {
            old.pending_events.retain(|pending| pending != delivery);
            old
        })
        .await
    }

    /// Delete the persisted record and notify `GuildDeleted`.
    pub async fn delete_state(&self, state: &GuildState) -> Result<(), ServiceError> {
        tracing::debug!(guild_id = state.guild_id, "deleting guild state");
        self.store.delete(&state.id).await?;
        self.broker
            .notify(
                Payload::GuildDeleted {
                    guild_id: state.guild_id,
                },
                &state.guild_id.to_string(),
            )
            .await?;
        Ok(())
    }

    /// The canonical mutation step: transform the caller's current snapshot
    /// and persist the result. Publication back to the handle's state cell is
    /// the caller's job.
    async fn apply<F>(&self, current: GuildState, transform: F) -> Result<GuildState, RepositoryError>
    where
        F: FnOnce(GuildState) -> GuildState,
    {
        let new_state = transform(current);
        self.store.update(&new_state).await?;
        Ok(new_state)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
