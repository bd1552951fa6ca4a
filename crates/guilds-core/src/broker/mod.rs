//! The message broker port.
//!
//! `MessageBroker` is the request/reply, pub/sub, and topic-routing contract
//! the rest of the service is written against. `guilds-infra` provides the
//! AMQP implementation; [`MemoryBroker`] is the in-process substrate used by
//! tests and single-process deployments.

mod memory;
mod topic;

pub use memory::MemoryBroker;
pub use topic::topic_matches;

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

use guilds_types::delivery::Delivery;
use guilds_types::error::BrokerError;
use guilds_types::payload::{Payload, PayloadKind};

/// The well-known RPC ingress queue shared by all producers and the single
/// dispatcher.
pub const RPC_QUEUE: &str = "rpc_queue";

/// Fan-out stream of deliveries for one destination.
///
/// Every observer of a destination receives every delivery; a destination's
/// underlying consumer is a process-wide singleton.
pub type DeliveryStream = broadcast::Receiver<Delivery>;

/// Request/reply, pub/sub, and topic routing over an at-least-once queueing
/// substrate.
///
/// Implementations own the broker connection for the process lifetime,
/// establish it lazily on first use, and cache one consumer per destination
/// key (queue name, bare routing key, or `topic.routing_key`), reusing it for
/// subsequent observers even under concurrent calls.
pub trait MessageBroker: Send + Sync {
    /// Publish `request` to the RPC ingress with a fresh correlation id and
    /// await the first reply on this client's callback queue carrying the
    /// same correlation id.
    ///
    /// Fails with [`BrokerError::Timeout`] when the bound elapses and with
    /// [`BrokerError::UnexpectedResponseType`] when the matched reply is not
    /// of the `expected` kind.
    fn send_and_receive(
        &self,
        request: Payload,
        expected: PayloadKind,
    ) -> impl Future<Output = Result<Delivery, BrokerError>> + Send;

    /// Publish a notification on the direct-routing notification channel.
    /// An empty routing key is a valid, distinct key.
    fn notify(
        &self,
        message: Payload,
        routing_key: &str,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Observe notifications bound to exactly `routing_key`. Multiple
    /// observers of the same key each receive every notification.
    fn observe_notifications(
        &self,
        routing_key: &str,
    ) -> impl Future<Output = Result<DeliveryStream, BrokerError>> + Send;

    /// Publish to a topic exchange with a concrete routing key.
    fn send_to_topic(
        &self,
        message: Payload,
        topic: &str,
        routing_key: &str,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Observe a topic exchange through a wildcard-capable binding pattern
    /// (`*` matches one word, `#` zero or more).
    fn observe_topic(
        &self,
        topic: &str,
        routing_key: &str,
    ) -> impl Future<Output = Result<DeliveryStream, BrokerError>> + Send;

    /// Publish directly to a named queue, optionally tagged with a
    /// correlation id. This is both the RPC ingress path and the RPC reply
    /// path.
    fn send_to_queue(
        &self,
        message: Payload,
        queue: &str,
        correlation_id: Option<Uuid>,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Observe a named point-to-point queue.
    fn observe_queue(
        &self,
        queue: &str,
    ) -> impl Future<Output = Result<DeliveryStream, BrokerError>> + Send;
}

/// Drain `rx` until a delivery tagged with `correlation_id` arrives, bounded
/// by `timeout`.
///
/// Replies carrying other correlation ids are skipped, never buffered: matching
/// is purely by correlation id, not arrival order. Shared by broker
/// implementations.
pub async fn await_reply(
    mut rx: DeliveryStream,
    correlation_id: Uuid,
    expected: PayloadKind,
    timeout: Duration,
) -> Result<Delivery, BrokerError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let received = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .map_err(|_| BrokerError::Timeout(timeout))?;
        match received {
            Ok(delivery) => {
                if delivery.correlation_id != Some(correlation_id) {
                    continue;
                }
                let actual = delivery.payload.kind();
                if actual != expected {
                    return Err(BrokerError::UnexpectedResponseType { expected, actual });
                }
                return Ok(delivery);
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "reply stream lagged while awaiting correlation match");
            }
            Err(broadcast::error::RecvError::Closed) => return Err(BrokerError::Closed),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
