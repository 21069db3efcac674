//! Bridge runner: setup, consumption, and client cleanup.

use crate::config::BridgeConfig;
use crate::consumer::MessageConsumer;
use crate::delivery::{PushClient, PushClientConfig, PushDelivery};
use crate::error::{BridgeError, SetupError};
use pubsub_runtime::{
    ProviderConfig, ReceiveSettings, Subscription, SubscriptionClientFactory, SubscriptionProvider,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;

/// A configured bridge holding its subscription client and push client
pub struct Bridge {
    config: Arc<BridgeConfig>,
    provider: Arc<dyn SubscriptionProvider>,
    settings: ReceiveSettings,
    delivery: Arc<dyn PushDelivery>,
}

impl Bridge {
    /// Assemble a bridge from already constructed clients
    pub fn new(
        config: BridgeConfig,
        provider: Arc<dyn SubscriptionProvider>,
        settings: ReceiveSettings,
        delivery: Arc<dyn PushDelivery>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            provider,
            settings,
            delivery,
        }
    }

    /// Construct the push client and the subscription client
    ///
    /// The push client is built first so that no subscription client is left
    /// open when setup fails.
    pub fn connect(
        config: BridgeConfig,
        provider_config: ProviderConfig,
        settings: ReceiveSettings,
        push_config: PushClientConfig,
    ) -> Result<Self, SetupError> {
        let delivery = PushClient::new(push_config).map_err(SetupError::PushClient)?;
        let provider =
            SubscriptionClientFactory::create_provider(provider_config).map_err(SetupError::Client)?;

        Ok(Self::new(config, provider, settings, Arc::new(delivery)))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Verify the subscription, then consume until `token` is cancelled
    ///
    /// The subscription client is closed before returning, whatever the
    /// outcome; a failed close is logged and does not change the result.
    pub async fn run(self, token: CancellationToken) -> Result<(), BridgeError> {
        let result = self.consume(token).await;

        if let Err(e) = self.provider.close().await {
            warn!(error = %e, "Failed to close subscription client");
        }

        result
    }

    async fn consume(&self, token: CancellationToken) -> Result<(), BridgeError> {
        let name = self.config.subscription_name().clone();
        let subscription = Subscription::new(
            Arc::clone(&self.provider),
            name.clone(),
            self.settings.clone(),
        );

        let exists = subscription
            .exists()
            .await
            .map_err(|source| SetupError::ExistenceCheck {
                subscription: name.path(),
                source,
            })?;
        if !exists {
            return Err(SetupError::SubscriptionNotFound {
                subscription: name.path(),
            }
            .into());
        }

        info!(
            subscription = %name,
            provider = %self.provider.provider_type(),
            "Connected to Pub/Sub subscription"
        );

        let consumer = MessageConsumer::new(
            subscription,
            Arc::clone(&self.config),
            Arc::clone(&self.delivery),
        );
        consumer.run(token).await?;

        info!("Graceful shutdown complete");
        Ok(())
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.config)
            .field("provider", &self.provider.provider_type())
            .field("settings", &self.settings)
            .finish()
    }
}
