//! The closed wire payload union carried by every broker delivery.
//!
//! Receivers deserialize polymorphically via the explicit `kind` tag rather
//! than runtime type metadata, so the set of payloads the service understands
//! is a closed enum. `PayloadKind` is the fieldless discriminant used as the
//! handler-registry key, and `PayloadFamily` is the coarse split the
//! dispatcher partitions the ingress stream by.

use serde::{Deserialize, Serialize};

use crate::error::FaultKind;
use crate::guild::{GuildView, SubscribedChannelView};

/// Every message body the service sends or receives over the broker.
///
/// Commands produce no reply; queries produce exactly one reply payload sent
/// back to the requester's reply destination. Notifications are fire-and-
/// forget fan-out. `Fault` is the error reply a failed query produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    // -- Commands ----------------------------------------------------------
    /// Register a guild and give it its initial name.
    CreateGuild { name: String, guild_id: u64 },
    /// Rename an existing guild.
    ChangeGuildName { name: String, guild_id: u64 },
    /// Subscribe a guild to a channel.
    SubscribeChannel {
        name: String,
        channel_id: u64,
        guild_id: u64,
    },
    /// Remove a channel subscription.
    UnsubscribeChannel { channel_id: u64, guild_id: u64 },
    /// Delete a guild and evict it from the cache.
    DeleteGuild { guild_id: u64 },

    // -- Queries -----------------------------------------------------------
    /// Fetch the full guild view.
    QueryGuild { guild_id: u64 },
    /// Fetch only the subscribed channel list.
    QuerySubscribedChannels { guild_id: u64 },

    // -- Query replies -----------------------------------------------------
    /// Reply to [`Payload::QueryGuild`].
    GuildResult { view: GuildView },
    /// Reply to [`Payload::QuerySubscribedChannels`].
    SubscribedChannelsResult {
        channels: Vec<SubscribedChannelView>,
    },
    /// Error reply sent when a query handler fails, so the requester does
    /// not have to wait out the RPC timeout.
    Fault { fault: FaultKind, message: String },

    // -- Notifications -----------------------------------------------------
    GuildCreated { name: String, guild_id: u64 },
    GuildNameChanged { name: String },
    SubscribedToChannel { name: String, channel_id: u64 },
    UnsubscribedFromChannel { channel_id: u64 },
    GuildDeleted { guild_id: u64 },
}

impl Payload {
    /// The fieldless discriminant, used as the handler-registry key.
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::CreateGuild { .. } => PayloadKind::CreateGuild,
            Payload::ChangeGuildName { .. } => PayloadKind::ChangeGuildName,
            Payload::SubscribeChannel { .. } => PayloadKind::SubscribeChannel,
            Payload::UnsubscribeChannel { .. } => PayloadKind::UnsubscribeChannel,
            Payload::DeleteGuild { .. } => PayloadKind::DeleteGuild,
            Payload::QueryGuild { .. } => PayloadKind::QueryGuild,
            Payload::QuerySubscribedChannels { .. } => PayloadKind::QuerySubscribedChannels,
            Payload::GuildResult { .. } => PayloadKind::GuildResult,
            Payload::SubscribedChannelsResult { .. } => PayloadKind::SubscribedChannelsResult,
            Payload::Fault { .. } => PayloadKind::Fault,
            Payload::GuildCreated { .. } => PayloadKind::GuildCreated,
            Payload::GuildNameChanged { .. } => PayloadKind::GuildNameChanged,
            Payload::SubscribedToChannel { .. } => PayloadKind::SubscribedToChannel,
            Payload::UnsubscribedFromChannel { .. } => PayloadKind::UnsubscribedFromChannel,
            Payload::GuildDeleted { .. } => PayloadKind::GuildDeleted,
        }
    }

    /// The coarse family the dispatcher partitions by.
    pub fn family(&self) -> PayloadFamily {
        self.kind().family()
    }
}

/// Fieldless discriminant for [`Payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    CreateGuild,
    ChangeGuildName,
    SubscribeChannel,
    UnsubscribeChannel,
    DeleteGuild,
    QueryGuild,
    QuerySubscribedChannels,
    GuildResult,
    SubscribedChannelsResult,
    Fault,
    GuildCreated,
    GuildNameChanged,
    SubscribedToChannel,
    UnsubscribedFromChannel,
    GuildDeleted,
}

impl PayloadKind {
    pub fn family(self) -> PayloadFamily {
        match self {
            PayloadKind::CreateGuild
            | PayloadKind::ChangeGuildName
            | PayloadKind::SubscribeChannel
            | PayloadKind::UnsubscribeChannel
            | PayloadKind::DeleteGuild => PayloadFamily::Command,
            PayloadKind::QueryGuild | PayloadKind::QuerySubscribedChannels => PayloadFamily::Query,
            PayloadKind::GuildResult | PayloadKind::SubscribedChannelsResult | PayloadKind::Fault => {
                PayloadFamily::Reply
            }
            PayloadKind::GuildCreated
            | PayloadKind::GuildNameChanged
            | PayloadKind::SubscribedToChannel
            | PayloadKind::UnsubscribedFromChannel
            | PayloadKind::GuildDeleted => PayloadFamily::Notification,
        }
    }
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// How a payload participates in the request/reply protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFamily {
    /// Executed for side effects, no reply.
    Command,
    /// Executed to produce a reply payload.
    Query,
    /// A query result or fault traveling back on a reply destination.
    Reply,
    /// Fan-out domain notification.
    Notification,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
