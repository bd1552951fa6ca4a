//! The guild handler set and its registry wiring.

mod command;
mod query;

pub use command::{
    ChangeGuildNameHandler, CreateGuildHandler, DeleteGuildHandler, SubscribeChannelHandler,
    UnsubscribeChannelHandler,
};
pub use query::{QueryGuildHandler, QuerySubscribedChannelsHandler};

use std::sync::Arc;

use guilds_types::payload::PayloadKind;

use crate::aggregate::GuildCache;
use crate::broker::MessageBroker;
use crate::dispatch::HandlerRegistry;
use crate::repository::{EventStore, GuildStore};

/// The full handler registry for the guilds service: every command and query
/// kind mapped to its handler, all sharing one cache.
pub fn guild_registry<S, E, B>(cache: Arc<GuildCache<S, E, B>>) -> HandlerRegistry
where
    S: GuildStore,
    E: EventStore,
    B: MessageBroker + 'static,
{
    HandlerRegistry::new()
        .with_command(
            PayloadKind::CreateGuild,
            Arc::new(CreateGuildHandler::new(cache.clone())),
        )
        .with_command(
            PayloadKind::ChangeGuildName,
            Arc::new(ChangeGuildNameHandler::new(cache.clone())),
        )
        .with_command(
            PayloadKind::SubscribeChannel,
            Arc::new(SubscribeChannelHandler::new(cache.clone())),
        )
        .with_command(
            PayloadKind::UnsubscribeChannel,
            Arc::new(UnsubscribeChannelHandler::new(cache.clone())),
        )
        .with_command(
            PayloadKind::DeleteGuild,
            Arc::new(DeleteGuildHandler::new(cache.clone())),
        )
        .with_query(
            PayloadKind::QueryGuild,
            Arc::new(QueryGuildHandler::new(cache.clone())),
        )
        .with_query(
            PayloadKind::QuerySubscribedChannels,
            Arc::new(QuerySubscribedChannelsHandler::new(cache)),
        )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
