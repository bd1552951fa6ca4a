//! Guild aggregate state and its read-side views.

use serde::{Deserialize, Serialize};

use crate::delivery::Delivery;

/// Immutable snapshot of one guild aggregate.
///
/// A guild exists iff `id` is non-empty: `id` is the persistence identity
/// assigned by the store on insert, while `guild_id` is the external numeric
/// key clients address the guild by. `pending_events` is the outbox of
/// domain-event deliveries awaiting propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildState {
    pub name: String,
    pub guild_id: u64,
    /// Insertion-ordered, unique by channel id.
    pub subscribed_channels: Vec<SubscribedChannel>,
    pub pending_events: Vec<Delivery>,
    /// Persistence identity; empty until the state has been stored.
    #[serde(default)]
    pub id: String,
}

impl GuildState {
    /// The canonical zero value used before any load.
    pub fn empty() -> Self {
        Self {
            name: String::new(),
            guild_id: 0,
            subscribed_channels: Vec::new(),
            pending_events: Vec::new(),
            id: String::new(),
        }
    }

    /// True iff this snapshot has been persisted.
    pub fn exists(&self) -> bool {
        !self.id.is_empty()
    }

    /// Read-side projection of this snapshot.
    pub fn to_view(&self) -> GuildView {
        GuildView {
            name: self.name.clone(),
            guild_id: self.guild_id,
            subscribed_channels: self
                .subscribed_channels
                .iter()
                .map(SubscribedChannel::to_view)
                .collect(),
            id: self.id.clone(),
        }
    }
}

/// A channel a guild is subscribed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribedChannel {
    pub name: String,
    pub channel_id: u64,
}

impl SubscribedChannel {
    pub fn to_view(&self) -> SubscribedChannelView {
        SubscribedChannelView {
            name: self.name.clone(),
            channel_id: self.channel_id,
        }
    }
}

/// What queries return for a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildView {
    pub name: String,
    pub guild_id: u64,
    pub subscribed_channels: Vec<SubscribedChannelView>,
    pub id: String,
}

/// What queries return for a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribedChannelView {
    pub name: String,
    pub channel_id: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
