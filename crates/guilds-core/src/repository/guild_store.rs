//! Guild state persistence port.

use std::future::Future;

use guilds_types::error::RepositoryError;
use guilds_types::guild::GuildState;

/// Persistence for guild state documents.
///
/// `id` is the store-assigned document identity; `guild_id` is the external
/// numeric key. Implementations live outside this crate (the in-memory
/// reference lives in [`super::memory`]).
pub trait GuildStore: Send + Sync + 'static {
    /// Look up a state by its document id.
    fn find_by_id(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<GuildState>, RepositoryError>> + Send;

    /// Look up a state by the external guild key.
    fn find_by_guild_id(
        &self,
        guild_id: u64,
    ) -> impl Future<Output = Result<Option<GuildState>, RepositoryError>> + Send;

    /// Insert a new state. Returns the stored state with its document id
    /// assigned.
    fn insert(
        &self,
        state: GuildState,
    ) -> impl Future<Output = Result<GuildState, RepositoryError>> + Send;

    /// Replace the stored state identified by `state.id`.
    fn update(
        &self,
        state: &GuildState,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete the state identified by `id`.
    fn delete(&self, id: &str) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Does a state exist for the external guild key?
    fn guild_exists(
        &self,
        guild_id: u64,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;
}

impl<T: GuildStore> GuildStore for std::sync::Arc<T> {
    fn find_by_id(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<GuildState>, RepositoryError>> + Send {
        (**self).find_by_id(id)
    }

    fn find_by_guild_id(
        &self,
        guild_id: u64,
    ) -> impl Future<Output = Result<Option<GuildState>, RepositoryError>> + Send {
        (**self).find_by_guild_id(guild_id)
    }

    fn insert(
        &self,
        state: GuildState,
    ) -> impl Future<Output = Result<GuildState, RepositoryError>> + Send {
        (**self).insert(state)
    }

    fn update(&self, state: &GuildState) -> impl Future<Output = Result<(), RepositoryError>> + Send {
        (**self).update(state)
    }

    fn delete(&self, id: &str) -> impl Future<Output = Result<(), RepositoryError>> + Send {
        (**self).delete(id)
    }

    fn guild_exists(
        &self,
        guild_id: u64,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send {
        (**self).guild_exists(guild_id)
    }
}
