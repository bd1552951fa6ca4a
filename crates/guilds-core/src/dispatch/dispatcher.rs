//! The RPC ingress demultiplexer.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use guilds_types::delivery::Delivery;
use guilds_types::error::{BrokerError, DispatchError, FaultKind};
use guilds_types::payload::{Payload, PayloadFamily};

use crate::broker::{DeliveryStream, MessageBroker, RPC_QUEUE};

use super::registry::HandlerRegistry;

/// Demultiplexes the shared RPC ingress queue into two serial drains.
///
/// Both drains observe the full ingress stream and filter by payload family:
/// the command drain executes commands strictly one at a time in arrival
/// order, and the query drain does the same for queries while replying on the
/// requester's reply destination. A failing handler is logged and the drain
/// moves on; a payload kind with no registered handler is a configuration
/// error that halts its drain.
pub struct RequestDispatcher<B: MessageBroker + 'static> {
    broker: Arc<B>,
    registry: Arc<HandlerRegistry>,
    cancel: CancellationToken,
    drains: Vec<JoinHandle<()>>,
}

impl<B: MessageBroker + 'static> RequestDispatcher<B> {
    pub fn new(broker: Arc<B>, registry: HandlerRegistry) -> Self {
        Self {
            broker,
            registry: Arc::new(registry),
            cancel: CancellationToken::new(),
            drains: Vec::new(),
        }
    }

    /// Subscribe to the RPC ingress and spawn both drains. Calling `start` on
    /// a running dispatcher is a no-op.
    pub async fn start(&mut self) -> Result<(), BrokerError> {
        if !self.drains.is_empty() {
            return Ok(());
        }
        let commands = self.broker.observe_queue(RPC_QUEUE).await?;
        let queries = self.broker.observe_queue(RPC_QUEUE).await?;
        tracing::info!(queue = RPC_QUEUE, "dispatcher consuming rpc ingress");

        self.drains.push(tokio::spawn(command_drain(
            commands,
            self.registry.clone(),
            self.cancel.clone(),
        )));
        self.drains.push(tokio::spawn(query_drain(
            queries,
            self.registry.clone(),
            self.broker.clone(),
            self.cancel.clone(),
        )));
        Ok(())
    }

    /// Cancel both drains and wait for them to wind down.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for drain in self.drains.drain(..) {
            if let Err(err) = drain.await {
                tracing::warn!(error = %err, "dispatcher drain panicked");
            }
        }
        tracing::info!("dispatcher stopped");
    }
}

/// Receive the next delivery or `None` when the drain should wind down.
async fn next_delivery(
    rx: &mut DeliveryStream,
    cancel: &CancellationToken,
    drain: &'static str,
) -> Option<Delivery> {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => return None,
            received = rx.recv() => received,
        };
        match received {
            Ok(delivery) => return Some(delivery),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(drain, missed, "ingress stream lagged, deliveries dropped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!(drain, "ingress stream closed");
                return None;
            }
        }
    }
}

async fn command_drain(
    mut rx: DeliveryStream,
    registry: Arc<HandlerRegistry>,
    cancel: CancellationToken,
) {
    while let Some(delivery) = next_delivery(&mut rx, &cancel, "command").await {
        if delivery.payload.family() != PayloadFamily::Command {
            continue;
        }
        let kind = delivery.payload.kind();
        let handler = match registry.command(kind) {
            Ok(handler) => handler,
            Err(err) => {
                tracing::error!(%kind, error = %err, "command drain halting");
                break;
            }
        };
        tracing::debug!(%kind, "executing command");
        if let Err(err) = handler.handle(delivery).await {
            tracing::warn!(%kind, error = %err, "command handler failed");
        }
    }
}

async fn query_drain<B: MessageBroker>(
    mut rx: DeliveryStream,
    registry: Arc<HandlerRegistry>,
    broker: Arc<B>,
    cancel: CancellationToken,
) {
    while let Some(delivery) = next_delivery(&mut rx, &cancel, "query").await {
        if delivery.payload.family() != PayloadFamily::Query {
            continue;
        }
        let kind = delivery.payload.kind();
        let outcome = match registry.query(kind) {
            Ok(handler) => {
                tracing::debug!(%kind, "executing query");
                handler.handle(&delivery).await
            }
            Err(err) => {
                tracing::error!(%kind, error = %err, "query drain halting");
                reply_fault(&*broker, &delivery, &err).await;
                break;
            }
        };
        match outcome {
            Ok(reply) => {
                if let Err(err) = broker
                    .send_to_queue(reply, &delivery.reply_to, delivery.correlation_id)
                    .await
                {
                    tracing::warn!(%kind, error = %err, "failed to send query reply");
                }
            }
            Err(err) => {
                tracing::warn!(%kind, error = %err, "query handler failed");
                reply_fault(&*broker, &delivery, &err).await;
            }
        }
    }
}

/// Send a `Fault` reply so the requester fails fast instead of waiting out
/// the RPC timeout. Requests without a reply destination get none.
async fn reply_fault<B: MessageBroker>(broker: &B, request: &Delivery, err: &DispatchError) {
    if request.reply_to.is_empty() {
        return;
    }
    let fault = Payload::Fault {
        fault: FaultKind::from(err),
        message: err.to_string(),
    };
    if let Err(send_err) = broker
        .send_to_queue(fault, &request.reply_to, request.correlation_id)
        .await
    {
        tracing::warn!(error = %send_err, "failed to send fault reply");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::{Mutex, Semaphore};

    use guilds_types::config::BrokerSettings;
    use guilds_types::guild::GuildState;
    use guilds_types::payload::PayloadKind;

    use crate::broker::MemoryBroker;
    use crate::dispatch::{CommandHandler, QueryHandler};

    use super::*;

    /// Records handled command payloads, gated by a semaphore so tests can
    /// hold the drain mid-delivery.
    struct GatedRecorder {
        gate: Semaphore,
        seen: Mutex<Vec<PayloadKind>>,
    }

    impl GatedRecorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandHandler for GatedRecorder {
        async fn handle(&self, delivery: Delivery) -> Result<(), DispatchError> {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| DispatchError::HandlerNotFound(delivery.payload.kind()))?;
            permit.forget();
            self.seen.lock().await.push(delivery.payload.kind());
            Ok(())
        }
    }

    struct FailingCommand;

    #[async_trait]
    impl CommandHandler for FailingCommand {
        async fn handle(&self, _delivery: Delivery) -> Result<(), DispatchError> {
            Err(guilds_types::error::RepositoryError::Connection.into())
        }
    }

    struct CountingCommand {
        handled: AtomicUsize,
    }

    #[async_trait]
    impl CommandHandler for CountingCommand {
        async fn handle(&self, _delivery: Delivery) -> Result<(), DispatchError> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct EmptyGuildQuery;

    #[async_trait]
    impl QueryHandler for EmptyGuildQuery {
        async fn handle(&self, _delivery: &Delivery) -> Result<Payload, DispatchError> {
            Ok(Payload::GuildResult {
                view: GuildState::empty().to_view(),
            })
        }
    }

    struct FailingQuery;

    #[async_trait]
    impl QueryHandler for FailingQuery {
        async fn handle(&self, _delivery: &Delivery) -> Result<Payload, DispatchError> {
            Err(guilds_types::error::RepositoryError::Query("boom".to_string()).into())
        }
    }

    fn broker() -> Arc<MemoryBroker> {
        Arc::new(MemoryBroker::with_rpc_timeout(
            BrokerSettings::default(),
            Duration::from_millis(500),
        ))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn commands_drain_serially_in_arrival_order() {
        let broker = broker();
        let recorder = GatedRecorder::new();
        let registry = HandlerRegistry::new()
            .with_command(PayloadKind::CreateGuild, recorder.clone())
            .with_command(PayloadKind::DeleteGuild, recorder.clone());
        let mut dispatcher = RequestDispatcher::new(broker.clone(), registry);
        dispatcher.start().await.unwrap();

        broker
            .send_to_queue(
                Payload::CreateGuild {
                    name: "Foo".to_string(),
                    guild_id: 42,
                },
                RPC_QUEUE,
                None,
            )
            .await
            .unwrap();
        broker
            .send_to_queue(Payload::DeleteGuild { guild_id: 42 }, RPC_QUEUE, None)
            .await
            .unwrap();

        // Neither command completes until the gate opens.
        settle().await;
        assert!(recorder.seen.lock().await.is_empty());

        recorder.gate.add_permits(1);
        settle().await;
        assert_eq!(
            *recorder.seen.lock().await,
            vec![PayloadKind::CreateGuild]
        );

        recorder.gate.add_permits(1);
        settle().await;
        assert_eq!(
            *recorder.seen.lock().await,
            vec![PayloadKind::CreateGuild, PayloadKind::DeleteGuild]
        );

        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn queries_are_answered_on_the_reply_destination() {
        let broker = broker();
        let registry =
            HandlerRegistry::new().with_query(PayloadKind::QueryGuild, Arc::new(EmptyGuildQuery));
        let mut dispatcher = RequestDispatcher::new(broker.clone(), registry);
        dispatcher.start().await.unwrap();

        let reply = broker
            .send_and_receive(Payload::QueryGuild { guild_id: 42 }, PayloadKind::GuildResult)
            .await
            .unwrap();
        assert!(matches!(reply.payload, Payload::GuildResult { .. }));

        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn query_drain_keeps_answering_while_a_command_blocks() {
        let broker = broker();
        let recorder = GatedRecorder::new();
        let registry = HandlerRegistry::new()
            .with_command(PayloadKind::CreateGuild, recorder.clone())
            .with_query(PayloadKind::QueryGuild, Arc::new(EmptyGuildQuery));
        let mut dispatcher = RequestDispatcher::new(broker.clone(), registry);
        dispatcher.start().await.unwrap();

        // Park the command drain mid-delivery on the closed gate.
        broker
            .send_to_queue(
                Payload::CreateGuild {
                    name: "Foo".to_string(),
                    guild_id: 42,
                },
                RPC_QUEUE,
                None,
            )
            .await
            .unwrap();
        settle().await;
        assert!(recorder.seen.lock().await.is_empty());

        // Queries run on their own drain, so this resolves well inside the
        // RPC timeout instead of queueing behind the stuck command.
        let reply = broker
            .send_and_receive(Payload::QueryGuild { guild_id: 42 }, PayloadKind::GuildResult)
            .await
            .unwrap();
        assert!(matches!(reply.payload, Payload::GuildResult { .. }));
        assert!(recorder.seen.lock().await.is_empty());

        recorder.gate.add_permits(1);
        settle().await;
        assert_eq!(*recorder.seen.lock().await, vec![PayloadKind::CreateGuild]);

        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn failed_queries_fault_instead_of_timing_out() {
        let broker = broker();
        let registry =
            HandlerRegistry::new().with_query(PayloadKind::QueryGuild, Arc::new(FailingQuery));
        let mut dispatcher = RequestDispatcher::new(broker.clone(), registry);
        dispatcher.start().await.unwrap();

        let err = broker
            .send_and_receive(Payload::QueryGuild { guild_id: 42 }, PayloadKind::GuildResult)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BrokerError::UnexpectedResponseType {
                expected: PayloadKind::GuildResult,
                actual: PayloadKind::Fault,
            }
        ));

        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn failing_command_handler_does_not_halt_the_drain() {
        let broker = broker();
        let counter = Arc::new(CountingCommand {
            handled: AtomicUsize::new(0),
        });
        let registry = HandlerRegistry::new()
            .with_command(PayloadKind::CreateGuild, Arc::new(FailingCommand))
            .with_command(PayloadKind::DeleteGuild, counter.clone());
        let mut dispatcher = RequestDispatcher::new(broker.clone(), registry);
        dispatcher.start().await.unwrap();

        broker
            .send_to_queue(
                Payload::CreateGuild {
                    name: "Foo".to_string(),
                    guild_id: 42,
                },
                RPC_QUEUE,
                None,
            )
            .await
            .unwrap();
        broker
            .send_to_queue(Payload::DeleteGuild { guild_id: 42 }, RPC_QUEUE, None)
            .await
            .unwrap();

        settle().await;
        assert_eq!(counter.handled.load(Ordering::SeqCst), 1);

        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn unregistered_command_kind_halts_the_command_drain() {
        let broker = broker();
        let counter = Arc::new(CountingCommand {
            handled: AtomicUsize::new(0),
        });
        let registry = HandlerRegistry::new().with_command(PayloadKind::DeleteGuild, counter.clone());
        let mut dispatcher = RequestDispatcher::new(broker.clone(), registry);
        dispatcher.start().await.unwrap();

        broker
            .send_to_queue(
                Payload::ChangeGuildName {
                    name: "Foo".to_string(),
                    guild_id: 42,
                },
                RPC_QUEUE,
                None,
            )
            .await
            .unwrap();
        // Arrives after the halt and is never executed.
        broker
            .send_to_queue(Payload::DeleteGuild { guild_id: 42 }, RPC_QUEUE, None)
            .await
            .unwrap();

        settle().await;
        assert_eq!(counter.handled.load(Ordering::SeqCst), 0);

        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn replies_and_notifications_on_the_ingress_are_ignored() {
        let broker = broker();
        let counter = Arc::new(CountingCommand {
            handled: AtomicUsize::new(0),
        });
        let registry = HandlerRegistry::new().with_command(PayloadKind::DeleteGuild, counter.clone());
        let mut dispatcher = RequestDispatcher::new(broker.clone(), registry);
        dispatcher.start().await.unwrap();

        broker
            .send_to_queue(Payload::GuildDeleted { guild_id: 42 }, RPC_QUEUE, None)
            .await
            .unwrap();
        broker
            .send_to_queue(
                Payload::Fault {
                    fault: FaultKind::Repository,
                    message: "stray".to_string(),
                },
                RPC_QUEUE,
                None,
            )
            .await
            .unwrap();
        broker
            .send_to_queue(Payload::DeleteGuild { guild_id: 42 }, RPC_QUEUE, None)
            .await
            .unwrap();

        settle().await;
        assert_eq!(counter.handled.load(Ordering::SeqCst), 1);

        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn stop_winds_both_drains_down() {
        let broker = broker();
        let mut dispatcher = RequestDispatcher::new(broker.clone(), HandlerRegistry::new());
        dispatcher.start().await.unwrap();
        dispatcher.stop().await;
        // Idempotent.
        dispatcher.stop().await;
    }
}
