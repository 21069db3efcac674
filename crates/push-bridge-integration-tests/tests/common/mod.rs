//! Common test utilities for push bridge integration tests
//!
//! This module provides:
//! - A bridge harness over the in-memory subscription provider
//! - A wiremock-based stand-in for the Pub/Sub REST API
//! - Polling helpers for asynchronous assertions

use push_bridge_core::{Bridge, BridgeConfig, BridgeError, PushClient, PushClientConfig};
use pubsub_runtime::{InMemoryProvider, ReceiveSettings, SubscriptionName};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PROJECT: &str = "p";
pub const SUBSCRIPTION: &str = "s";

/// Receive settings with a short pull timeout so cancellation is observed quickly
pub fn fast_settings() -> ReceiveSettings {
    ReceiveSettings {
        pull_timeout: Duration::from_millis(50),
        ..Default::default()
    }
}

/// Poll `condition` until it holds, failing the test after five seconds
#[allow(dead_code)]
pub async fn wait_until<F, Fut>(description: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    assert!(result.is_ok(), "timed out waiting for: {}", description);
}

// ============================================================================
// In-Memory Harness
// ============================================================================

/// A bridge wired to an in-memory subscription and a real HTTP push client
#[allow(dead_code)]
pub struct MemoryHarness {
    pub provider: Arc<InMemoryProvider>,
    pub name: SubscriptionName,
    pub token: CancellationToken,
    config: BridgeConfig,
}

#[allow(dead_code)]
impl MemoryHarness {
    /// Harness pushing to `url` with the subscription already created
    pub fn new(url: &str) -> Self {
        let config = BridgeConfig::new(PROJECT, SUBSCRIPTION, Some(url)).unwrap();
        let name = config.subscription_name().clone();
        let provider = Arc::new(InMemoryProvider::new());
        provider.create_subscription(&name);

        Self {
            provider,
            name,
            token: CancellationToken::new(),
            config,
        }
    }

    /// Harness whose subscription does not exist
    pub fn without_subscription(url: &str) -> Self {
        let config = BridgeConfig::new(PROJECT, SUBSCRIPTION, Some(url)).unwrap();

        Self {
            provider: Arc::new(InMemoryProvider::new()),
            name: config.subscription_name().clone(),
            token: CancellationToken::new(),
            config,
        }
    }

    /// Start the bridge in the background
    pub fn start(&self) -> JoinHandle<Result<(), BridgeError>> {
        let delivery = PushClient::new(PushClientConfig::default()).unwrap();
        let bridge = Bridge::new(
            self.config.clone(),
            self.provider.clone(),
            fast_settings(),
            Arc::new(delivery),
        );
        tokio::spawn(bridge.run(self.token.clone()))
    }

    /// Wait until `count` messages are acknowledged
    pub async fn wait_for_acks(&self, count: usize) {
        let provider = self.provider.clone();
        let name = self.name.clone();
        wait_until("acknowledgements", || {
            let provider = provider.clone();
            let name = name.clone();
            async move { provider.acknowledged_count(&name) >= count }
        })
        .await;
    }

    /// Cancel the bridge and return its result
    pub async fn stop(
        &self,
        handle: JoinHandle<Result<(), BridgeError>>,
    ) -> Result<(), BridgeError> {
        self.token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("bridge should stop after cancellation")
            .unwrap()
    }
}

// ============================================================================
// Pub/Sub REST Stand-In
// ============================================================================

/// REST path of the test subscription
#[allow(dead_code)]
pub fn subscription_path() -> String {
    format!("/v1/projects/{}/subscriptions/{}", PROJECT, SUBSCRIPTION)
}

/// Mock server answering like a Pub/Sub emulator holding `messages`
///
/// Each entry is `(ack_id, wire message)`. The messages are returned by the
/// first pull; later pulls return an empty batch after a short delay.
#[allow(dead_code)]
pub async fn emulator_with(messages: Vec<(&str, serde_json::Value)>) -> MockServer {
    let server = MockServer::start().await;
    let subscription = subscription_path();

    Mock::given(method("GET"))
        .and(path(subscription.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": format!("projects/{}/subscriptions/{}", PROJECT, SUBSCRIPTION)
        })))
        .mount(&server)
        .await;

    let received: Vec<serde_json::Value> = messages
        .into_iter()
        .map(|(ack_id, message)| {
            serde_json::json!({
                "ackId": ack_id,
                "message": message,
                "deliveryAttempt": 1
            })
        })
        .collect();

    Mock::given(method("POST"))
        .and(path(format!("{}:pull", subscription)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "receivedMessages": received })),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{}:pull", subscription)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({}))
                .set_delay(Duration::from_millis(50)),
        )
        .with_priority(2)
        .mount(&server)
        .await;

    for action in ["acknowledge", "modifyAckDeadline"] {
        Mock::given(method("POST"))
            .and(path(format!("{}:{}", subscription, action)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;
    }

    server
}

/// Request bodies the emulator received for `action`
#[allow(dead_code)]
pub async fn action_bodies(server: &MockServer, action: &str) -> Vec<serde_json::Value> {
    let suffix = format!(":{}", action);
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path().ends_with(&suffix))
        .filter_map(|request| serde_json::from_slice(&request.body).ok())
        .collect()
}
