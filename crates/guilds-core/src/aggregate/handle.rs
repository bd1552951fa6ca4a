//! The in-memory handle owning one guild's current snapshot.

use std::sync::Arc;

use guilds_types::delivery::Delivery;
use guilds_types::error::{RepositoryError, ServiceError};
use guilds_types::guild::GuildState;

use crate::broker::MessageBroker;
use crate::repository::{EventStore, GuildStore};
use crate::service::GuildService;

use super::state_cell::{StateCell, StateWatch};

/// One guild aggregate's live handle.
///
/// The handle owns the latest immutable snapshot behind a replay cell and
/// funnels every mutation through read-current → apply-via-service (which
/// persists and notifies) → publish-new-snapshot.
///
/// The handle performs no locking across concurrent mutations: two callers
/// mutating the same handle concurrently can both read the same "current"
/// snapshot and race to publish, losing one update. Callers that need the
/// causal snapshot sequence must serialize their own calls; the dispatcher's
/// serial command drain does exactly that.
pub struct GuildHandle<S: GuildStore, E: EventStore, B: MessageBroker> {
    service: Arc<GuildService<S, E, B>>,
    state: StateCell<GuildState>,
}

impl<S: GuildStore, E: EventStore, B: MessageBroker> GuildHandle<S, E, B> {
    /// Construct an empty handle. It holds no state until
    /// [`load_or_create`](Self::load_or_create) runs.
    pub fn new(service: Arc<GuildService<S, E, B>>) -> Self {
        Self {
            service,
            state: StateCell::new(GuildState::empty()),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> GuildState {
        self.state.get()
    }

    /// Subscribe to the state stream: the current snapshot immediately, then
    /// every published snapshot in order.
    pub fn watch(&self) -> StateWatch<GuildState> {
        self.state.watch()
    }

    /// True iff the current snapshot has been persisted.
    pub fn has_state(&self) -> bool {
        self.state.get().exists()
    }

    /// Load the persisted state for `guild_id` (inserting a fresh record when
    /// none exists) and publish it. No-op when the handle already has state.
    pub async fn load_or_create(&self, guild_id: u64) -> Result<(), RepositoryError> {
        if self.has_state() {
            return Ok(());
        }
        let state = self.service.load_state(guild_id).await?;
        self.state.publish(state);
        Ok(())
    }

    pub async fn change_name(&self, name: &str) -> Result<GuildState, ServiceError> {
        let new_state = self.service.change_name(name, self.state.get()).await?;
        self.state.publish(new_state.clone());
        Ok(new_state)
    }

    pub async fn subscribe_channel(
        &self,
        name: &str,
        channel_id: u64,
    ) -> Result<GuildState, ServiceError> {
        let new_state = self
            .service
            .subscribe_channel(name, channel_id, self.state.get())
            .await?;
        self.state.publish(new_state.clone());
        Ok(new_state)
    }

    pub async fn unsubscribe_channel(&self, channel_id: u64) -> Result<GuildState, ServiceError> {
        let new_state = self
            .service
            .unsubscribe_channel(channel_id, self.state.get())
            .await?;
        self.state.publish(new_state.clone());
        Ok(new_state)
    }

    /// Record a domain-event delivery on the outbox. No-op when the handle
    /// has no state.
    pub async fn add_pending_event(&self, delivery: Delivery) -> Result<(), RepositoryError> {
        if !self.has_state() {
            return Ok(());
        }
        let new_state = self
            .service
            .add_pending_event(delivery, self.state.get())
            .await?;
        self.state.publish(new_state);
        Ok(())
    }

    /// Drop a propagated domain-event delivery from the outbox. No-op when
    /// the handle has no state.
    pub async fn remove_pending_event(&self, delivery: &Delivery) -> Result<(), RepositoryError> {
        if !self.has_state() {
            return Ok(());
        }
        let new_state = self
            .service
            .remove_pending_event(delivery, self.state.get())
            .await?;
        self.state.publish(new_state);
        Ok(())
    }

    /// Delete the persisted record and publish the empty snapshot, signalling
    /// removability from the cache. No-op when the handle has no state.
    pub async fn delete(&self) -> Result<(), ServiceError> {
        let current = self.state.get();
        if !current.exists() {
            return Ok(());
        }
        self.service.delete_state(&current).await?;
        self.state.publish(GuildState::empty());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
