//! The lapin-backed broker adapter.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use futures_util::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::{Mutex, OnceCell, broadcast};
use tokio::task::AbortHandle;
use uuid::Uuid;

use guilds_core::broker::{DeliveryStream, MessageBroker, RPC_QUEUE, await_reply};
use guilds_types::config::BrokerSettings;
use guilds_types::delivery::Delivery;
use guilds_types::error::BrokerError;
use guilds_types::payload::{Payload, PayloadKind};

use super::codec;

/// Per-destination fan-out capacity, matching the in-process broker.
const DESTINATION_CAPACITY: usize = 256;

/// [`MessageBroker`] over AMQP 0.9.1.
///
/// The connection is established lazily on first use and owned for the
/// process lifetime. Consumers are cached per destination key: the first
/// observer of a destination declares its queue and starts the pump task,
/// and every later observer taps the same fan-out channel.
pub struct AmqpMessageBroker {
    settings: BrokerSettings,
    connection: OnceCell<Connection>,
    consumers: DashMap<String, ConsumerEntry>,
    /// Serializes consumer setup so concurrent first observers of one
    /// destination cannot each start a pump.
    setup: Mutex<()>,
    closed: AtomicBool,
}

struct ConsumerEntry {
    sender: broadcast::Sender<Delivery>,
    pump: AbortHandle,
    // Held so the consumer's channel outlives setup.
    _channel: Channel,
}

impl AmqpMessageBroker {
    pub fn new(settings: BrokerSettings) -> Self {
        Self {
            settings,
            connection: OnceCell::new(),
            consumers: DashMap::new(),
            setup: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Shut the broker down: stop every pump task and close the connection.
    /// Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for entry in self.consumers.iter() {
            entry.value().pump.abort();
        }
        if let Some(connection) = self.connection.get() {
            if let Err(err) = connection.close(200, "client shutdown").await {
                tracing::warn!(error = %err, "amqp connection close failed");
            }
        }
        tracing::info!("amqp broker closed");
    }

    async fn connection(&self) -> Result<&Connection, BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        self.connection
            .get_or_try_init(|| async {
                let uri = self.settings.amqp_uri();
                tracing::info!(
                    host = %self.settings.host,
                    port = self.settings.port,
                    "connecting to amqp broker"
                );
                Connection::connect(&uri, ConnectionProperties::default())
                    .await
                    .map_err(|err| BrokerError::Connection(err.to_string()))
            })
            .await
    }

    async fn channel(&self) -> Result<Channel, BrokerError> {
        self.connection()
            .await?
            .create_channel()
            .await
            .map_err(|err| BrokerError::Connection(err.to_string()))
    }

    /// Publish to a named queue through the default exchange, declaring the
    /// queue first so the publish cannot be unroutable.
    async fn publish_to_queue(
        &self,
        queue: &str,
        payload: &Payload,
        properties: BasicProperties,
    ) -> Result<(), BrokerError> {
        let channel = self.channel().await?;
        channel
            .queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
            .await
            .map_err(|err| BrokerError::Connection(err.to_string()))?;
        self.publish(&channel, "", queue, payload, properties, queue)
            .await
    }

    /// Publish through a declared exchange.
    async fn publish_to_exchange(
        &self,
        exchange: &str,
        kind: ExchangeKind,
        routing_key: &str,
        payload: &Payload,
        properties: BasicProperties,
    ) -> Result<(), BrokerError> {
        let channel = self.channel().await?;
        channel
            .exchange_declare(
                exchange,
                kind,
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|err| BrokerError::Connection(err.to_string()))?;
        self.publish(&channel, exchange, routing_key, payload, properties, exchange)
            .await
    }

    async fn publish(
        &self,
        channel: &Channel,
        exchange: &str,
        routing_key: &str,
        payload: &Payload,
        properties: BasicProperties,
        destination: &str,
    ) -> Result<(), BrokerError> {
        let body = codec::encode_body(payload).map_err(|err| BrokerError::Publish {
            destination: destination.to_string(),
            reason: err.to_string(),
        })?;
        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
            .map_err(|err| BrokerError::Publish {
                destination: destination.to_string(),
                reason: err.to_string(),
            })?
            .await
            .map_err(|err| BrokerError::Publish {
                destination: destination.to_string(),
                reason: err.to_string(),
            })?;
        Ok(())
    }

    /// Return a stream over `key`'s cached consumer, creating the consumer on
    /// first use.
    ///
    /// `binding`, when present, binds the declared queue to an exchange; a
    /// plain queue consumer passes `None`.
    async fn consume_singleton(
        &self,
        key: String,
        queue: String,
        options: QueueDeclareOptions,
        binding: Option<(String, ExchangeKind, String)>,
    ) -> Result<DeliveryStream, BrokerError> {
        if let Some(entry) = self.consumers.get(&key) {
            return Ok(entry.sender.subscribe());
        }
        let _guard = self.setup.lock().await;
        if let Some(entry) = self.consumers.get(&key) {
            return Ok(entry.sender.subscribe());
        }

        let channel = self.channel().await?;
        channel
            .queue_declare(&queue, options, FieldTable::default())
            .await
            .map_err(|err| BrokerError::Connection(err.to_string()))?;
        if let Some((exchange, kind, routing_key)) = binding {
            channel
                .exchange_declare(
                    &exchange,
                    kind,
                    ExchangeDeclareOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|err| BrokerError::Connection(err.to_string()))?;
            channel
                .queue_bind(
                    &queue,
                    &exchange,
                    &routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|err| BrokerError::Connection(err.to_string()))?;
        }

        let consumer = channel
            .basic_consume(
                &queue,
                "",
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| BrokerError::Connection(err.to_string()))?;

        tracing::debug!(%key, %queue, "starting amqp consumer");
        let (sender, stream) = broadcast::channel(DESTINATION_CAPACITY);
        let pump = tokio::spawn(pump(consumer, sender.clone(), queue));
        self.consumers.insert(
            key,
            ConsumerEntry {
                sender,
                pump: pump.abort_handle(),
                _channel: channel,
            },
        );
        Ok(stream)
    }

    fn stamp(delivery: &Delivery) -> BasicProperties {
        let properties =
            BasicProperties::default().with_timestamp(delivery.timestamp.timestamp_millis() as u64);
        match delivery.correlation_id {
            Some(id) => properties.with_correlation_id(id.to_string().into()),
            None => properties,
        }
    }
}

/// Forward decoded deliveries from an AMQP consumer into the destination's
/// fan-out channel until the consumer ends or the pump is aborted.
async fn pump(
    mut consumer: lapin::Consumer,
    sender: broadcast::Sender<Delivery>,
    queue: String,
) {
    while let Some(attempt) = consumer.next().await {
        let message = match attempt {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(queue, error = %err, "amqp consumer stream errored");
                break;
            }
        };
        let decoded = codec::decode_delivery(
            &message.data,
            message
                .properties
                .correlation_id()
                .as_ref()
                .map(|raw| raw.as_str()),
            *message.properties.timestamp(),
            message
                .properties
                .reply_to()
                .as_ref()
                .map(|raw| raw.as_str()),
        );
        match decoded {
            Ok(delivery) => {
                // No observers right now is fine; the consumer stays live.
                let _ = sender.send(delivery);
            }
            Err(err) => {
                tracing::warn!(queue, error = %err, "dropping undecodable delivery");
            }
        }
    }
    tracing::debug!(queue, "amqp consumer pump finished");
}

impl MessageBroker for AmqpMessageBroker {
    async fn send_and_receive(
        &self,
        request: Payload,
        expected: PayloadKind,
    ) -> Result<Delivery, BrokerError> {
        let callback = self.settings.callback_queue();
        // Subscribe before publishing so the reply cannot race the consumer.
        let replies = self
            .consume_singleton(
                callback.clone(),
                callback.clone(),
                QueueDeclareOptions::default(),
                None,
            )
            .await?;

        let delivery = Delivery::of(request).reply_to(callback.clone());
        let correlation_id = delivery
            .correlation_id
            .ok_or_else(|| BrokerError::Publish {
                destination: RPC_QUEUE.to_string(),
                reason: "rpc request missing correlation id".to_string(),
            })?;
        let properties = Self::stamp(&delivery).with_reply_to(callback.into());
        tracing::debug!(kind = %delivery.payload.kind(), %correlation_id, "sending rpc request");
        self.publish_to_queue(RPC_QUEUE, &delivery.payload, properties)
            .await?;

        await_reply(replies, correlation_id, expected, self.settings.rpc_timeout()).await
    }

    async fn notify(&self, message: Payload, routing_key: &str) -> Result<(), BrokerError> {
        tracing::debug!(kind = %message.kind(), routing_key, "publishing notification");
        let delivery = Delivery::with_properties(message, None, None);
        self.publish_to_exchange(
            &self.settings.notifications_exchange,
            ExchangeKind::Direct,
            routing_key,
            &delivery.payload,
            Self::stamp(&delivery),
        )
        .await
    }

    async fn observe_notifications(
        &self,
        routing_key: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        let exchange = self.settings.notifications_exchange.clone();
        self.consume_singleton(
            format!("notify:{routing_key}"),
            format!("{}-notify-{routing_key}", self.settings.client_name),
            QueueDeclareOptions {
                auto_delete: true,
                ..QueueDeclareOptions::default()
            },
            Some((exchange, ExchangeKind::Direct, routing_key.to_string())),
        )
        .await
    }

    async fn send_to_topic(
        &self,
        message: Payload,
        topic: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        tracing::debug!(kind = %message.kind(), topic, routing_key, "publishing to topic");
        let delivery = Delivery::with_properties(message, None, None);
        self.publish_to_exchange(
            topic,
            ExchangeKind::Topic,
            routing_key,
            &delivery.payload,
            Self::stamp(&delivery),
        )
        .await
    }

    async fn observe_topic(
        &self,
        topic: &str,
        routing_key: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        self.consume_singleton(
            format!("topic:{topic}:{routing_key}"),
            format!("{}-{topic}-{routing_key}", self.settings.client_name),
            QueueDeclareOptions {
                auto_delete: true,
                ..QueueDeclareOptions::default()
            },
            Some((topic.to_string(), ExchangeKind::Topic, routing_key.to_string())),
        )
        .await
    }

    async fn send_to_queue(
        &self,
        message: Payload,
        queue: &str,
        correlation_id: Option<Uuid>,
    ) -> Result<(), BrokerError> {
        tracing::trace!(kind = %message.kind(), queue, "sending to queue");
        let delivery = Delivery::with_properties(message, correlation_id, None);
        self.publish_to_queue(queue, &delivery.payload, Self::stamp(&delivery))
            .await
    }

    async fn observe_queue(&self, queue: &str) -> Result<DeliveryStream, BrokerError> {
        self.consume_singleton(
            queue.to_string(),
            queue.to_string(),
            QueueDeclareOptions::default(),
            None,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // Wire-level behavior is covered by the codec tests; everything here is
    // connection-free.

    #[test]
    fn stamp_carries_correlation_id_and_timestamp() {
        let delivery = Delivery::of(Payload::QueryGuild { guild_id: 42 });
        let properties = AmqpMessageBroker::stamp(&delivery);
        assert_eq!(
            properties.correlation_id().as_ref().map(|raw| raw.as_str()),
            delivery.correlation_id.map(|id| id.to_string()).as_deref()
        );
        assert_eq!(
            *properties.timestamp(),
            Some(delivery.timestamp.timestamp_millis() as u64)
        );
    }

    #[test]
    fn stamp_omits_absent_correlation_ids() {
        let delivery =
            Delivery::with_properties(Payload::DeleteGuild { guild_id: 7 }, None, None);
        let properties = AmqpMessageBroker::stamp(&delivery);
        assert!(properties.correlation_id().is_none());
    }

    #[test]
    fn broker_starts_unconnected() {
        let broker = AmqpMessageBroker::new(BrokerSettings::default());
        assert!(broker.connection.get().is_none());
        assert!(broker.consumers.is_empty());
    }

    #[tokio::test]
    async fn closed_broker_refuses_new_work() {
        let broker = AmqpMessageBroker::new(BrokerSettings::default());
        broker.close().await;
        let err = broker.observe_queue("q").await.unwrap_err();
        assert!(matches!(err, BrokerError::Closed));
        // Close is idempotent.
        broker.close().await;
    }
}
