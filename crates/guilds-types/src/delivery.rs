//! The broker delivery envelope.
//!
//! Every message that crosses the broker is wrapped in a [`Delivery`]: the
//! payload plus the broker-native properties (correlation id, timestamp,
//! reply destination) and the persistence identity assigned by the event
//! store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payload::Payload;

/// A payload wrapped with its broker properties.
///
/// The correlation id is set once at construction and never mutated: it
/// exists solely to pair an RPC request with its reply, never to express
/// ordering. `event_id` is empty until the delivery has round-tripped to the
/// event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub payload: Payload,
    /// Pairs a request with its reply. `None` for deliveries that arrived
    /// without a parseable correlation property.
    pub correlation_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    /// Destination the receiver should publish a reply to; empty for
    /// non-RPC traffic.
    pub reply_to: String,
    /// Persistence identity, assigned only after a successful round-trip to
    /// the event store.
    #[serde(default)]
    pub event_id: String,
}

impl Delivery {
    /// Wrap a payload with a fresh correlation id and the current time.
    pub fn of(payload: Payload) -> Self {
        Self::with_properties(payload, Some(Uuid::new_v4()), None)
    }

    /// Wrap a payload with explicit broker properties, as decoded off the
    /// wire. A missing timestamp defaults to the current time.
    pub fn with_properties(
        payload: Payload,
        correlation_id: Option<Uuid>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            payload,
            correlation_id,
            timestamp: timestamp.unwrap_or_else(Utc::now),
            reply_to: String::new(),
            event_id: String::new(),
        }
    }

    /// Set the reply destination. Builder-style, used when publishing an RPC
    /// request.
    pub fn reply_to(mut self, destination: impl Into<String>) -> Self {
        self.reply_to = destination.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
