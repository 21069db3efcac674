//! Subscription handle and the channel-based receive loop.

use crate::ack::Delivery;
use crate::client::SubscriptionProvider;
use crate::error::SubscriptionError;
use crate::message::SubscriptionName;
use crate::provider::ReceiveSettings;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;

/// Delay used when a transient error carries no retry hint
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Handle to one subscription on a shared provider
#[derive(Clone)]
pub struct Subscription {
    provider: Arc<dyn SubscriptionProvider>,
    name: SubscriptionName,
    settings: ReceiveSettings,
}

impl Subscription {
    /// Create subscription handle
    pub fn new(
        provider: Arc<dyn SubscriptionProvider>,
        name: SubscriptionName,
        settings: ReceiveSettings,
    ) -> Self {
        Self {
            provider,
            name,
            settings,
        }
    }

    /// Fully qualified subscription name
    pub fn name(&self) -> &SubscriptionName {
        &self.name
    }

    /// Flow-control settings
    pub fn settings(&self) -> &ReceiveSettings {
        &self.settings
    }

    /// Check whether the subscription exists
    pub async fn exists(&self) -> Result<bool, SubscriptionError> {
        self.provider.subscription_exists(&self.name).await
    }

    /// Pull messages until `token` is cancelled, handing each one to `sender`
    ///
    /// Each message is sent together with its [`AckHandle`](crate::AckHandle).
    /// Messages are forwarded one at a time, so the channel capacity bounds
    /// how many received messages can wait for a consumer.
    ///
    /// # Returns
    ///
    /// - `Err(SubscriptionError::Cancelled)` once the token is cancelled
    /// - `Err(SubscriptionError::ReceiverClosed)` if the channel closes; any
    ///   messages that could not be handed over are nacked first
    /// - the pull error for any non-transient failure
    ///
    /// Transient pull failures are logged and retried after their suggested
    /// delay.
    pub async fn receive(
        &self,
        token: CancellationToken,
        sender: mpsc::Sender<Delivery>,
    ) -> Result<(), SubscriptionError> {
        info!(
            subscription = %self.name,
            provider = %self.provider.provider_type(),
            max_messages = self.settings.max_messages,
            "Starting message receipt"
        );

        loop {
            let pulled = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(subscription = %self.name, "Receive cancelled");
                    return Err(SubscriptionError::Cancelled);
                }
                result = self.provider.pull(
                    &self.name,
                    self.settings.max_messages,
                    self.settings.pull_timeout,
                ) => result,
            };

            let messages = match pulled {
                Ok(messages) => messages,
                Err(e) if e.is_transient() => {
                    let delay = e.retry_after().unwrap_or(DEFAULT_RETRY_DELAY);
                    warn!(
                        subscription = %self.name,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Transient error pulling messages; retrying"
                    );

                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(SubscriptionError::Cancelled),
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
                Err(e) => {
                    error!(
                        subscription = %self.name,
                        error = %e,
                        "Failed to pull messages"
                    );
                    return Err(e);
                }
            };

            if messages.is_empty() {
                continue;
            }

            debug!(
                subscription = %self.name,
                message_count = messages.len(),
                "Pulled message batch"
            );

            let mut pending = messages.into_iter();
            while let Some(message) = pending.next() {
                let delivery = Delivery::new(message, Arc::clone(&self.provider), self.name.clone());

                if let Err(mpsc::error::SendError(undelivered)) = sender.send(delivery).await {
                    warn!(
                        subscription = %self.name,
                        "Message receiver closed; releasing undelivered messages"
                    );

                    let mut orphaned = vec![undelivered];
                    orphaned.extend(pending.map(|message| {
                        Delivery::new(message, Arc::clone(&self.provider), self.name.clone())
                    }));

                    for delivery in orphaned {
                        let message_id = delivery.message.message_id.clone();
                        if let Err(e) = delivery.ack.nack().await {
                            warn!(
                                message_id = %message_id,
                                error = %e,
                                "Failed to release undelivered message"
                            );
                        }
                    }

                    return Err(SubscriptionError::ReceiverClosed);
                }
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("provider", &self.provider.provider_type())
            .finish()
    }
}
