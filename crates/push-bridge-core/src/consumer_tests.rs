//! Tests for the consumption loop.

use super::*;
use crate::error::DeliveryError;
use async_trait::async_trait;
use pubsub_runtime::{
    InMemoryProvider, PublishMessage, PullFailure, ReceiveSettings, SubscriptionName,
    SubscriptionProvider,
};
use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Test Doubles
// ============================================================================

/// Push client that answers with scripted status codes
#[derive(Default)]
struct ScriptedDelivery {
    statuses: Mutex<VecDeque<u16>>,
    envelopes: Mutex<Vec<PushEnvelope>>,
    gate: Option<Arc<Notify>>,
    delay: Duration,
    started: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedDelivery {
    fn with_statuses(statuses: &[u16]) -> Self {
        Self {
            statuses: Mutex::new(statuses.iter().copied().collect()),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.envelopes.lock().unwrap().len()
    }
}

#[async_trait]
impl PushDelivery for ScriptedDelivery {
    async fn deliver(&self, _url: &str, envelope: &PushEnvelope) -> Result<(), DeliveryError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.envelopes.lock().unwrap().push(envelope.clone());

        let status = self.statuses.lock().unwrap().pop_front().unwrap_or(200);
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(DeliveryError::UnexpectedStatus {
                status,
                reason: String::new(),
            })
        }
    }
}

struct Harness {
    provider: Arc<InMemoryProvider>,
    name: SubscriptionName,
    delivery: Arc<ScriptedDelivery>,
    consumer: Arc<MessageConsumer>,
}

fn harness(delivery: ScriptedDelivery, max_outstanding_messages: usize) -> Harness {
    let provider = Arc::new(InMemoryProvider::new());
    let config = BridgeConfig::new("p", "s", Some("http://localhost:9/push")).unwrap();
    let name = config.subscription_name().clone();
    provider.create_subscription(&name);

    let settings = ReceiveSettings {
        max_messages: 10,
        max_outstanding_messages,
        pull_timeout: Duration::from_millis(50),
    };
    let subscription = Subscription::new(provider.clone(), name.clone(), settings);
    let delivery = Arc::new(delivery);
    let consumer = Arc::new(MessageConsumer::new(
        subscription,
        Arc::new(config),
        delivery.clone(),
    ));

    Harness {
        provider,
        name,
        delivery,
        consumer,
    }
}

fn spawn_run(
    consumer: &Arc<MessageConsumer>,
    token: &CancellationToken,
) -> tokio::task::JoinHandle<Result<(), ConsumerError>> {
    let consumer = Arc::clone(consumer);
    let token = token.clone();
    tokio::spawn(async move { consumer.run(token).await })
}

/// Log sink shared with a thread-local `fmt` subscriber
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn error_lines(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.contains(" ERROR "))
            .collect()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ============================================================================
// Logging Tests
// ============================================================================

mod logging {
    use super::*;
    use pubsub_runtime::MessageId;

    /// Verify that a successful delivery logs no error.
    #[tokio::test]
    async fn test_success_logs_no_error() {
        // Arrange
        let logs = CapturedLogs::default();
        let _guard = logs.install();
        let h = harness(ScriptedDelivery::default(), 10);
        h.provider
            .publish(
                &h.name,
                PublishMessage::new("ok").with_message_id("m-ok".parse::<MessageId>().unwrap()),
            )
            .unwrap();
        let token = CancellationToken::new();

        // Act
        let run = spawn_run(&h.consumer, &token);
        wait_until(|| h.provider.acknowledged_count(&h.name) == 1).await;
        token.cancel();
        run.await.unwrap().unwrap();

        // Assert
        assert!(logs.error_lines().is_empty(), "{:?}", logs.error_lines());
        assert!(logs
            .lines()
            .iter()
            .any(|line| line.contains("Message processed successfully")
                && line.contains("message_id=m-ok")));
    }

    /// Verify that a failed delivery logs an error naming the message.
    #[tokio::test]
    async fn test_failure_logs_error_with_message_id() {
        // Arrange
        let logs = CapturedLogs::default();
        let _guard = logs.install();
        let h = harness(ScriptedDelivery::with_statuses(&[500]), 10);
        h.provider
            .publish(
                &h.name,
                PublishMessage::new("fail once")
                    .with_message_id("m-fail".parse::<MessageId>().unwrap()),
            )
            .unwrap();
        let token = CancellationToken::new();

        // Act
        let run = spawn_run(&h.consumer, &token);
        wait_until(|| h.provider.acknowledged_count(&h.name) == 1).await;
        token.cancel();
        run.await.unwrap().unwrap();

        // Assert
        let errors = logs.error_lines();
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(errors[0].contains("Failed to deliver message"));
        assert!(errors[0].contains("message_id=m-fail"));
        assert!(errors[0].contains("500"));
    }
}

// ============================================================================
// Per-Message Protocol Tests
// ============================================================================

mod per_message_protocol {
    use super::*;

    /// Verify that successful deliveries are acked.
    #[tokio::test]
    async fn test_successful_delivery_acks() {
        let h = harness(ScriptedDelivery::default(), 10);
        for body in ["a", "b", "c"] {
            h.provider.publish(&h.name, PublishMessage::new(body)).unwrap();
        }
        let token = CancellationToken::new();

        let run = spawn_run(&h.consumer, &token);
        wait_until(|| h.provider.acknowledged_count(&h.name) == 3).await;
        token.cancel();

        assert!(run.await.unwrap().is_ok());
        assert_eq!(h.provider.nacked_count(&h.name), 0);
        assert_eq!(h.delivery.calls(), 3);
        assert_eq!(h.consumer.stats().acked, 3);
        assert_eq!(h.consumer.state(), ConsumerState::Stopped);
    }

    /// Verify that a failed delivery is nacked and the redelivery is acked.
    #[tokio::test]
    async fn test_failed_delivery_nacks_and_redelivers() {
        let h = harness(ScriptedDelivery::with_statuses(&[500, 200]), 10);
        h.provider
            .publish(&h.name, PublishMessage::new("retry me"))
            .unwrap();
        let token = CancellationToken::new();

        let run = spawn_run(&h.consumer, &token);
        wait_until(|| h.provider.acknowledged_count(&h.name) == 1).await;
        token.cancel();

        assert!(run.await.unwrap().is_ok());
        assert_eq!(h.provider.nacked_count(&h.name), 1);
        assert_eq!(h.delivery.calls(), 2);

        let stats = h.consumer.stats();
        assert_eq!(stats.acked, 1);
        assert_eq!(stats.nacked, 1);
    }

    /// Verify that each message is resolved exactly once.
    #[tokio::test]
    async fn test_every_message_resolved_once() {
        let h = harness(ScriptedDelivery::with_statuses(&[200, 404, 200, 503]), 4);
        for i in 0..4 {
            h.provider
                .publish(&h.name, PublishMessage::new(format!("m{}", i)))
                .unwrap();
        }
        let token = CancellationToken::new();

        let run = spawn_run(&h.consumer, &token);
        wait_until(|| h.provider.acknowledged_count(&h.name) == 4).await;
        token.cancel();
        run.await.unwrap().unwrap();

        let calls = h.delivery.calls();
        let resolved = h.provider.acknowledged_count(&h.name) + h.provider.nacked_count(&h.name);
        assert_eq!(resolved, calls);
        assert_eq!(h.provider.leased_count(&h.name), 0);
    }

    /// Verify that the envelope carries the configured subscription.
    #[tokio::test]
    async fn test_envelope_uses_configured_subscription() {
        let h = harness(ScriptedDelivery::default(), 10);
        h.provider
            .publish(&h.name, PublishMessage::new("hello"))
            .unwrap();
        let token = CancellationToken::new();

        let run = spawn_run(&h.consumer, &token);
        wait_until(|| h.delivery.calls() == 1).await;
        token.cancel();
        run.await.unwrap().unwrap();

        let envelopes = h.delivery.envelopes.lock().unwrap();
        assert_eq!(envelopes[0].subscription, "projects/p/subscriptions/s");
        assert_eq!(envelopes[0].message.data, "aGVsbG8=");
    }
}

// ============================================================================
// Cancellation Tests
// ============================================================================

mod cancellation {
    use super::*;

    /// Verify that cancelling before any message is a clean stop.
    #[tokio::test]
    async fn test_cancel_before_any_message() {
        let h = harness(ScriptedDelivery::default(), 10);
        let token = CancellationToken::new();
        token.cancel();

        let result = h.consumer.run(token).await;

        assert!(result.is_ok());
        assert_eq!(h.delivery.calls(), 0);
        assert_eq!(h.provider.acknowledged_count(&h.name), 0);
        assert_eq!(h.provider.nacked_count(&h.name), 0);
    }

    /// Verify that in-flight deliveries finish before run returns.
    #[tokio::test]
    async fn test_in_flight_delivery_completes() {
        let gate = Arc::new(Notify::new());
        let h = harness(
            ScriptedDelivery {
                gate: Some(gate.clone()),
                ..Default::default()
            },
            10,
        );
        h.provider.publish(&h.name, PublishMessage::new("a")).unwrap();
        let token = CancellationToken::new();

        let run = spawn_run(&h.consumer, &token);
        wait_until(|| h.delivery.started.load(Ordering::SeqCst) == 1).await;
        token.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!run.is_finished());
        assert_eq!(h.consumer.state(), ConsumerState::Running);

        gate.notify_one();
        assert!(run.await.unwrap().is_ok());
        assert_eq!(h.provider.acknowledged_count(&h.name), 1);
    }

    /// Verify that messages waiting after cancellation are released undelivered.
    #[tokio::test]
    async fn test_waiting_messages_are_released() {
        let gate = Arc::new(Notify::new());
        let h = harness(
            ScriptedDelivery {
                gate: Some(gate.clone()),
                ..Default::default()
            },
            1,
        );
        for body in ["a", "b", "c"] {
            h.provider.publish(&h.name, PublishMessage::new(body)).unwrap();
        }
        let token = CancellationToken::new();

        let run = spawn_run(&h.consumer, &token);
        wait_until(|| h.delivery.started.load(Ordering::SeqCst) == 1).await;
        token.cancel();
        gate.notify_one();
        run.await.unwrap().unwrap();

        assert_eq!(h.delivery.calls(), 1);
        assert_eq!(h.provider.acknowledged_count(&h.name), 1);
        assert_eq!(h.provider.nacked_count(&h.name), 2);
        assert_eq!(h.provider.pending_count(&h.name), 2);
        assert_eq!(h.consumer.stats().released, 2);
    }
}

// ============================================================================
// Concurrency and Termination Tests
// ============================================================================

mod concurrency_and_termination {
    use super::*;

    /// Verify that no more than max_outstanding_messages are delivered at once.
    #[tokio::test]
    async fn test_outstanding_messages_are_bounded() {
        let h = harness(
            ScriptedDelivery {
                delay: Duration::from_millis(30),
                ..Default::default()
            },
            2,
        );
        for i in 0..6 {
            h.provider
                .publish(&h.name, PublishMessage::new(format!("m{}", i)))
                .unwrap();
        }
        let token = CancellationToken::new();

        let run = spawn_run(&h.consumer, &token);
        wait_until(|| h.provider.acknowledged_count(&h.name) == 6).await;
        token.cancel();
        run.await.unwrap().unwrap();

        let max_active = h.delivery.max_active.load(Ordering::SeqCst);
        assert!(max_active <= 2, "max concurrent deliveries was {}", max_active);
        assert!(max_active >= 1);
    }

    /// Verify that a non-transient receive failure ends the loop with an error.
    #[tokio::test]
    async fn test_receive_failure_is_loop_error() {
        let h = harness(ScriptedDelivery::default(), 10);
        h.provider.fail_next_pulls(PullFailure::Permanent, 1);

        let result = h.consumer.run(CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(ConsumerError::Receive(SubscriptionError::PermissionDenied { .. }))
        ));
        assert_eq!(h.consumer.state(), ConsumerState::Stopped);
    }

    /// Verify that a rejected ack is counted and a closed client ends the loop.
    #[tokio::test]
    async fn test_rejected_ack_is_counted() {
        let gate = Arc::new(Notify::new());
        let h = harness(
            ScriptedDelivery {
                gate: Some(gate.clone()),
                ..Default::default()
            },
            10,
        );
        h.provider.publish(&h.name, PublishMessage::new("a")).unwrap();
        let token = CancellationToken::new();

        let run = spawn_run(&h.consumer, &token);
        wait_until(|| h.delivery.started.load(Ordering::SeqCst) == 1).await;
        h.provider.close().await.unwrap();
        gate.notify_one();

        let result = run.await.unwrap();
        assert!(matches!(
            result,
            Err(ConsumerError::Receive(SubscriptionError::ClientClosed))
        ));
        let stats = h.consumer.stats();
        assert_eq!(stats.resolve_failures, 1);
        assert_eq!(stats.acked, 0);
        assert_eq!(stats.nacked, 0);
    }
}
