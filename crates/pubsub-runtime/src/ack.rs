//! Acknowledgment handles for received messages.
//!
//! Every message handed out by [`Subscription::receive`](crate::Subscription::receive)
//! travels with an [`AckHandle`]. Both `ack` and `nack` take the handle by
//! value, so a message can be resolved at most once. Dropping an unresolved
//! handle logs a warning; the lease then runs out and the backend redelivers.

use crate::client::SubscriptionProvider;
use crate::error::SubscriptionError;
use crate::message::{AckId, MessageId, ReceivedMessage, SubscriptionName};
use std::sync::Arc;
use tracing::{debug, warn};

/// A received message paired with the handle that resolves it
#[derive(Debug)]
pub struct Delivery {
    pub message: ReceivedMessage,
    pub ack: AckHandle,
}

impl Delivery {
    /// Pair a received message with an acknowledgment handle for it
    pub fn new(
        message: ReceivedMessage,
        provider: Arc<dyn SubscriptionProvider>,
        subscription: SubscriptionName,
    ) -> Self {
        let ack = AckHandle {
            provider,
            subscription,
            ack_id: message.ack_id.clone(),
            message_id: message.message_id.clone(),
            resolved: false,
        };

        Self { message, ack }
    }
}

/// Single-use handle that acks or nacks one received message
pub struct AckHandle {
    provider: Arc<dyn SubscriptionProvider>,
    subscription: SubscriptionName,
    ack_id: AckId,
    message_id: MessageId,
    resolved: bool,
}

impl AckHandle {
    /// Ack ID of the lease this handle resolves
    pub fn ack_id(&self) -> &AckId {
        &self.ack_id
    }

    /// ID of the message this handle resolves
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Acknowledge the message so it is not redelivered
    pub async fn ack(mut self) -> Result<(), SubscriptionError> {
        self.resolved = true;
        debug!(message_id = %self.message_id, "Acknowledging message");
        self.provider
            .acknowledge(&self.subscription, std::slice::from_ref(&self.ack_id))
            .await
    }

    /// Negatively acknowledge the message so it is redelivered
    pub async fn nack(mut self) -> Result<(), SubscriptionError> {
        self.resolved = true;
        debug!(message_id = %self.message_id, "Negatively acknowledging message");
        self.provider
            .negative_acknowledge(&self.subscription, std::slice::from_ref(&self.ack_id))
            .await
    }
}

impl Drop for AckHandle {
    fn drop(&mut self) {
        if !self.resolved {
            warn!(
                message_id = %self.message_id,
                subscription = %self.subscription,
                "Acknowledgment handle dropped without ack or nack; message will be redelivered after its lease expires"
            );
        }
    }
}

impl std::fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckHandle")
            .field("subscription", &self.subscription)
            .field("ack_id", &self.ack_id)
            .field("message_id", &self.message_id)
            .field("resolved", &self.resolved)
            .field("provider", &"<SubscriptionProvider>")
            .finish()
    }
}
