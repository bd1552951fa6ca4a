//! Process-local registry of live guild handles.

use std::sync::Arc;

use dashmap::DashMap;

use guilds_types::error::{RepositoryError, ServiceError};

use crate::broker::MessageBroker;
use crate::repository::{EventStore, GuildStore};
use crate::service::GuildService;

use super::handle::GuildHandle;

/// Maps an external guild key to at most one live handle per process.
///
/// The cache is process-local: horizontally scaled instances each hold an
/// independent, potentially divergent cache. There is no locking spanning a
/// full load-or-create sequence, only the map's atomic insert.
pub struct GuildCache<S: GuildStore, E: EventStore, B: MessageBroker> {
    service: Arc<GuildService<S, E, B>>,
    guilds: DashMap<u64, Arc<GuildHandle<S, E, B>>>,
}

impl<S: GuildStore, E: EventStore, B: MessageBroker> GuildCache<S, E, B> {
    pub fn new(service: Arc<GuildService<S, E, B>>) -> Self {
        Self {
            service,
            guilds: DashMap::new(),
        }
    }

    /// The cached handle for `guild_id`, loading it when the store knows the
    /// key. `None` when the guild neither is cached nor exists.
    pub async fn get(
        &self,
        guild_id: u64,
    ) -> Result<Option<Arc<GuildHandle<S, E, B>>>, RepositoryError> {
        if let Some(handle) = self.guilds.get(&guild_id) {
            return Ok(Some(handle.clone()));
        }
        if self.service.guild_exists(guild_id).await? {
            return Ok(Some(self.load_or_create(guild_id).await?));
        }
        Ok(None)
    }

    /// Construct a new handle, load (or insert) its state, and register it.
    ///
    /// Does not consult the cache first: concurrent callers racing on the
    /// same uncached key each construct and register a handle, and the last
    /// registration wins, orphaning the others.
    pub async fn load_or_create(
        &self,
        guild_id: u64,
    ) -> Result<Arc<GuildHandle<S, E, B>>, RepositoryError> {
        tracing::debug!(guild_id, "loading guild handle");
        let handle = Arc::new(GuildHandle::new(self.service.clone()));
        handle.load_or_create(guild_id).await?;
        self.guilds.insert(guild_id, handle.clone());
        Ok(handle)
    }

    /// Evict the handle for `guild_id` and delete its state. No-op when the
    /// key is not cached.
    pub async fn delete(&self, guild_id: u64) -> Result<(), ServiceError> {
        if let Some((_, handle)) = self.guilds.remove(&guild_id) {
            tracing::debug!(guild_id, "evicting guild handle");
            handle.delete().await?;
        }
        Ok(())
    }

    /// Is a handle for `guild_id` currently registered?
    pub fn contains(&self, guild_id: u64) -> bool {
        self.guilds.contains_key(&guild_id)
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.guilds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guilds.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
