//! In-memory reference implementations of the persistence ports.

use dashmap::DashMap;
use uuid::Uuid;

use guilds_types::delivery::Delivery;
use guilds_types::error::RepositoryError;
use guilds_types::guild::GuildState;

use super::event_store::EventStore;
use super::guild_store::GuildStore;

/// DashMap-backed [`GuildStore`], keyed by document id.
#[derive(Default)]
pub struct MemoryGuildStore {
    rows: DashMap<String, GuildState>,
}

impl MemoryGuildStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl GuildStore for MemoryGuildStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<GuildState>, RepositoryError> {
        Ok(self.rows.get(id).map(|row| row.clone()))
    }

    async fn find_by_guild_id(&self, guild_id: u64) -> Result<Option<GuildState>, RepositoryError> {
        Ok(self
            .rows
            .iter()
            .find(|row| row.guild_id == guild_id)
            .map(|row| row.clone()))
    }

    async fn insert(&self, state: GuildState) -> Result<GuildState, RepositoryError> {
        if !state.id.is_empty() {
            return Err(RepositoryError::Conflict(format!(
                "state already has id '{}'",
                state.id
            )));
        }
        let stored = GuildState {
            id: Uuid::new_v4().simple().to_string(),
            ..state
        };
        self.rows.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn update(&self, state: &GuildState) -> Result<(), RepositoryError> {
        if !self.rows.contains_key(&state.id) {
            return Err(RepositoryError::NotFound);
        }
        self.rows.insert(state.id.clone(), state.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.rows.remove(id);
        Ok(())
    }

    async fn guild_exists(&self, guild_id: u64) -> Result<bool, RepositoryError> {
        Ok(self.rows.iter().any(|row| row.guild_id == guild_id))
    }
}

/// DashMap-backed [`EventStore`].
#[derive(Default)]
pub struct MemoryEventStore {
    events: DashMap<String, Delivery>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventStore for MemoryEventStore {
    async fn add(&self, delivery: &Delivery) -> Result<Delivery, RepositoryError> {
        let stored = Delivery {
            event_id: Uuid::new_v4().simple().to_string(),
            ..delivery.clone()
        };
        self.events.insert(stored.event_id.clone(), stored.clone());
        Ok(stored)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
