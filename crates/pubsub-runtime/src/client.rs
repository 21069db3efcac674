//! Provider trait and factory for subscription operations.

use crate::error::SubscriptionError;
use crate::message::{AckId, ReceivedMessage, SubscriptionName};
use crate::provider::{ProviderConfig, ProviderType};
use crate::providers::{InMemoryProvider, PubSubProvider};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Interface implemented by specific subscription backends (Pub/Sub REST, in-memory)
///
/// Implementations hold no per-message state and must be safe to call
/// concurrently from many message handlers.
#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    /// Check whether the subscription exists
    async fn subscription_exists(
        &self,
        subscription: &SubscriptionName,
    ) -> Result<bool, SubscriptionError>;

    /// Pull up to `max_messages`, waiting at most `timeout` for any to arrive
    ///
    /// Returns an empty batch when nothing arrived in time.
    async fn pull(
        &self,
        subscription: &SubscriptionName,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, SubscriptionError>;

    /// Mark messages as fully processed
    async fn acknowledge(
        &self,
        subscription: &SubscriptionName,
        ack_ids: &[AckId],
    ) -> Result<(), SubscriptionError>;

    /// Release messages for immediate redelivery
    async fn negative_acknowledge(
        &self,
        subscription: &SubscriptionName,
        ack_ids: &[AckId],
    ) -> Result<(), SubscriptionError>;

    /// Release client resources; later calls fail with `ClientClosed`
    async fn close(&self) -> Result<(), SubscriptionError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// Factory for creating subscription providers from configuration
pub struct SubscriptionClientFactory;

impl SubscriptionClientFactory {
    /// Create provider from configuration
    pub fn create_provider(
        config: ProviderConfig,
    ) -> Result<Arc<dyn SubscriptionProvider>, SubscriptionError> {
        let provider: Arc<dyn SubscriptionProvider> = match config {
            ProviderConfig::PubSub(pubsub_config) => Arc::new(PubSubProvider::new(pubsub_config)?),
            ProviderConfig::InMemory => Arc::new(InMemoryProvider::new()),
        };

        Ok(provider)
    }
}
