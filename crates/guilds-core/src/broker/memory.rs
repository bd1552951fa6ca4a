//! In-process broker substrate.
//!
//! `MemoryBroker` implements the full [`MessageBroker`] contract on
//! `tokio::sync::broadcast` channels: point-to-point queues, a direct
//! notification exchange keyed by exact routing key, and topic exchanges with
//! pattern-bound subscriptions. Publishing to a destination nobody observes
//! is a no-op, and every observer of a destination receives every delivery.
//!
//! It backs the core test suite and doubles as a valid substrate for a
//! single-process deployment.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use guilds_types::config::BrokerSettings;
use guilds_types::delivery::Delivery;
use guilds_types::error::BrokerError;
use guilds_types::payload::{Payload, PayloadKind};

use super::topic::topic_matches;
use super::{DeliveryStream, MessageBroker, RPC_QUEUE, await_reply};

/// Per-destination channel capacity. Consumers that fall further behind than
/// this observe a lagged stream, mirroring at-least-once (not exactly-once)
/// substrate semantics.
const DESTINATION_CAPACITY: usize = 256;

/// In-process [`MessageBroker`] implementation.
///
/// Cloning is cheap and shares the underlying destination tables, so a
/// producer and the dispatcher can hold the same broker.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

struct Inner {
    settings: BrokerSettings,
    rpc_timeout: Duration,
    /// Point-to-point queues by name.
    queues: DashMap<String, broadcast::Sender<Delivery>>,
    /// Direct notification exchange: one channel per exact routing key.
    notifications: DashMap<String, broadcast::Sender<Delivery>>,
    /// Topic exchanges: per topic, one channel per binding pattern.
    topics: DashMap<String, DashMap<String, broadcast::Sender<Delivery>>>,
}

impl MemoryBroker {
    pub fn new(settings: BrokerSettings) -> Self {
        let rpc_timeout = settings.rpc_timeout();
        Self::build(settings, rpc_timeout)
    }

    /// Construct with an explicit RPC timeout bound. Tests use this to keep
    /// the timeout path fast.
    pub fn with_rpc_timeout(settings: BrokerSettings, rpc_timeout: Duration) -> Self {
        Self::build(settings, rpc_timeout)
    }

    fn build(settings: BrokerSettings, rpc_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                rpc_timeout,
                queues: DashMap::new(),
                notifications: DashMap::new(),
                topics: DashMap::new(),
            }),
        }
    }

    fn queue_sender(&self, queue: &str) -> broadcast::Sender<Delivery> {
        self.inner
            .queues
            .entry(queue.to_string())
            .or_insert_with(|| broadcast::channel(DESTINATION_CAPACITY).0)
            .clone()
    }

    fn notification_sender(&self, routing_key: &str) -> broadcast::Sender<Delivery> {
        self.inner
            .notifications
            .entry(routing_key.to_string())
            .or_insert_with(|| broadcast::channel(DESTINATION_CAPACITY).0)
            .clone()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(BrokerSettings::default())
    }
}

impl MessageBroker for MemoryBroker {
    async fn send_and_receive(
        &self,
        request: Payload,
        expected: PayloadKind,
    ) -> Result<Delivery, BrokerError> {
        let callback = self.inner.settings.callback_queue();
        // Subscribe before publishing so the reply cannot race the consumer.
        let replies = self.queue_sender(&callback).subscribe();

        let delivery = Delivery::of(request).reply_to(callback);
        let correlation_id = delivery
            .correlation_id
            .ok_or_else(|| BrokerError::Publish {
                destination: RPC_QUEUE.to_string(),
                reason: "rpc request missing correlation id".to_string(),
            })?;
        tracing::debug!(kind = %delivery.payload.kind(), %correlation_id, "sending rpc request");
        let _ = self.queue_sender(RPC_QUEUE).send(delivery);

        await_reply(replies, correlation_id, expected, self.inner.rpc_timeout).await
    }

    async fn notify(&self, message: Payload, routing_key: &str) -> Result<(), BrokerError> {
        tracing::debug!(kind = %message.kind(), routing_key, "publishing notification");
        let delivery = Delivery::with_properties(message, None, None);
        let _ = self.notification_sender(routing_key).send(delivery);
        Ok(())
    }

    async fn observe_notifications(
        &self,
        routing_key: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        Ok(self.notification_sender(routing_key).subscribe())
    }

    async fn send_to_topic(
        &self,
        message: Payload,
        topic: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        tracing::debug!(kind = %message.kind(), topic, routing_key, "publishing to topic");
        let delivery = Delivery::with_properties(message, None, None);
        if let Some(bindings) = self.inner.topics.get(topic) {
            for binding in bindings.iter() {
                if topic_matches(binding.key(), routing_key) {
                    let _ = binding.value().send(delivery.clone());
                }
            }
        }
        Ok(())
    }

    async fn observe_topic(
        &self,
        topic: &str,
        routing_key: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        let bindings = self
            .inner
            .topics
            .entry(topic.to_string())
            .or_insert_with(DashMap::new);
        let sender = bindings
            .entry(routing_key.to_string())
            .or_insert_with(|| broadcast::channel(DESTINATION_CAPACITY).0)
            .clone();
        Ok(sender.subscribe())
    }

    async fn send_to_queue(
        &self,
        message: Payload,
        queue: &str,
        correlation_id: Option<Uuid>,
    ) -> Result<(), BrokerError> {
        tracing::trace!(kind = %message.kind(), queue, "sending to queue");
        let delivery = Delivery::with_properties(message, correlation_id, None);
        let _ = self.queue_sender(queue).send(delivery);
        Ok(())
    }

    async fn observe_queue(&self, queue: &str) -> Result<DeliveryStream, BrokerError> {
        Ok(self.queue_sender(queue).subscribe())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn broker() -> MemoryBroker {
        MemoryBroker::with_rpc_timeout(BrokerSettings::default(), Duration::from_millis(500))
    }

    #[tokio::test]
    async fn rpc_round_trip_completes_with_the_matching_reply() {
        let broker = broker();
        let responder = broker.clone();

        let server = tokio::spawn(async move {
            let mut ingress = responder.observe_queue(RPC_QUEUE).await.unwrap();
            let request = ingress.recv().await.unwrap();
            // A reply under a foreign correlation id must not complete the call.
            responder
                .send_to_queue(
                    Payload::GuildDeleted { guild_id: 999 },
                    &request.reply_to,
                    Some(Uuid::new_v4()),
                )
                .await
                .unwrap();
            responder
                .send_to_queue(
                    Payload::GuildResult {
                        view: guilds_types::guild::GuildState::empty().to_view(),
                    },
                    &request.reply_to,
                    request.correlation_id,
                )
                .await
                .unwrap();
        });

        // Let the responder subscribe to the ingress first.
        tokio::task::yield_now().await;
        let reply = broker
            .send_and_receive(Payload::QueryGuild { guild_id: 42 }, PayloadKind::GuildResult)
            .await
            .unwrap();
        assert_eq!(reply.payload.kind(), PayloadKind::GuildResult);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn rpc_times_out_when_nobody_replies() {
        let broker =
            MemoryBroker::with_rpc_timeout(BrokerSettings::default(), Duration::from_millis(50));
        let err = broker
            .send_and_receive(Payload::QueryGuild { guild_id: 42 }, PayloadKind::GuildResult)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Timeout(_)));
    }

    #[tokio::test]
    async fn rpc_request_carries_the_callback_destination() {
        let broker = broker();
        let mut ingress = broker.observe_queue(RPC_QUEUE).await.unwrap();

        let client = broker.clone();
        tokio::spawn(async move {
            let _ = client
                .send_and_receive(Payload::QueryGuild { guild_id: 1 }, PayloadKind::GuildResult)
                .await;
        });

        let request = ingress.recv().await.unwrap();
        assert_eq!(request.reply_to, "guilds-callback");
        assert!(request.correlation_id.is_some());
    }

    #[tokio::test]
    async fn queue_observers_share_one_consumer_and_all_receive() {
        let broker = broker();
        let mut first = broker.observe_queue("q").await.unwrap();
        let mut second = broker.observe_queue("q").await.unwrap();
        // The destination table holds exactly one underlying channel for "q".
        assert_eq!(broker.inner.queues.len(), 1);

        broker
            .send_to_queue(Payload::DeleteGuild { guild_id: 7 }, "q", None)
            .await
            .unwrap();

        assert_eq!(
            first.recv().await.unwrap().payload,
            Payload::DeleteGuild { guild_id: 7 }
        );
        assert_eq!(
            second.recv().await.unwrap().payload,
            Payload::DeleteGuild { guild_id: 7 }
        );
    }

    #[tokio::test]
    async fn notifications_are_isolated_by_routing_key() {
        let broker = broker();
        let mut keyed = broker.observe_notifications("42").await.unwrap();
        let mut unkeyed = broker.observe_notifications("").await.unwrap();

        broker
            .notify(
                Payload::GuildNameChanged {
                    name: "Foo".to_string(),
                },
                "42",
            )
            .await
            .unwrap();

        let delivery = keyed.recv().await.unwrap();
        assert_eq!(delivery.payload.kind(), PayloadKind::GuildNameChanged);
        // The empty key is its own destination, not a broadcast of all keys.
        assert!(unkeyed.try_recv().is_err());
    }

    #[tokio::test]
    async fn topic_bindings_route_by_pattern() {
        let broker = broker();
        let mut all = broker.observe_topic("guild-events", "#").await.unwrap();
        let mut created = broker
            .observe_topic("guild-events", "*.created")
            .await
            .unwrap();

        broker
            .send_to_topic(
                Payload::GuildCreated {
                    name: "Foo".to_string(),
                    guild_id: 42,
                },
                "guild-events",
                "guilds.created",
            )
            .await
            .unwrap();
        broker
            .send_to_topic(
                Payload::GuildDeleted { guild_id: 42 },
                "guild-events",
                "guilds.deleted",
            )
            .await
            .unwrap();

        assert_eq!(all.recv().await.unwrap().payload.kind(), PayloadKind::GuildCreated);
        assert_eq!(all.recv().await.unwrap().payload.kind(), PayloadKind::GuildDeleted);
        assert_eq!(
            created.recv().await.unwrap().payload.kind(),
            PayloadKind::GuildCreated
        );
        assert!(created.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_observers_is_a_no_op() {
        let broker = broker();
        broker
            .send_to_queue(Payload::DeleteGuild { guild_id: 1 }, "nowhere", None)
            .await
            .unwrap();
        broker
            .notify(Payload::GuildDeleted { guild_id: 1 }, "nobody")
            .await
            .unwrap();
        broker
            .send_to_topic(Payload::GuildDeleted { guild_id: 1 }, "t", "k")
            .await
            .unwrap();
    }
}
