//! In-memory subscription provider for testing and development.
//!
//! Messages are published straight into a named subscription and leased out
//! by `pull`. A lease ends with `acknowledge` (the message is gone) or
//! `negative_acknowledge` (the message goes back to the front of the
//! subscription with its delivery attempt preserved).
//!
//! The provider also supports injecting pull failures so consumers can be
//! tested against transient and permanent backend errors.

use crate::client::SubscriptionProvider;
use crate::error::SubscriptionError;
use crate::message::{
    AckId, MessageId, PublishMessage, ReceivedMessage, SubscriptionName, Timestamp,
};
use crate::provider::ProviderType;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Kind of failure injected into `pull`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullFailure {
    /// Fails with a retryable connection error
    Transient,
    /// Fails with a non-retryable permission error
    Permanent,
}

impl PullFailure {
    fn to_error(self) -> SubscriptionError {
        match self {
            Self::Transient => SubscriptionError::ConnectionFailed {
                message: "injected transient pull failure".to_string(),
            },
            Self::Permanent => SubscriptionError::PermissionDenied {
                operation: "pull".to_string(),
            },
        }
    }
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

struct SubscriptionStorage {
    subscriptions: HashMap<SubscriptionName, InMemorySubscription>,
    pull_failure: Option<(PullFailure, usize)>,
    closed: bool,
}

impl SubscriptionStorage {
    fn new() -> Self {
        Self {
            subscriptions: HashMap::new(),
            pull_failure: None,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<(), SubscriptionError> {
        if self.closed {
            return Err(SubscriptionError::ClientClosed);
        }
        Ok(())
    }

    fn subscription_mut(
        &mut self,
        name: &SubscriptionName,
    ) -> Result<&mut InMemorySubscription, SubscriptionError> {
        self.subscriptions
            .get_mut(name)
            .ok_or_else(|| SubscriptionError::SubscriptionNotFound {
                subscription: name.path(),
            })
    }

    /// Consume one injected failure, if any remain
    fn take_pull_failure(&mut self) -> Option<SubscriptionError> {
        let (failure, remaining) = self.pull_failure.as_mut()?;
        let error = failure.to_error();
        *remaining -= 1;
        if *remaining == 0 {
            self.pull_failure = None;
        }
        Some(error)
    }
}

#[derive(Default)]
struct InMemorySubscription {
    /// Messages waiting to be pulled (FIFO order)
    available: VecDeque<StoredMessage>,
    /// Leased messages keyed by ack ID
    leased: HashMap<String, StoredMessage>,
    acknowledged: usize,
    nacked: usize,
}

#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    data: Bytes,
    attributes: HashMap<String, String>,
    ordering_key: Option<String>,
    publish_time: Timestamp,
    delivery_attempt: u32,
}

impl StoredMessage {
    fn from_publish(message: PublishMessage) -> Self {
        Self {
            message_id: message.message_id.unwrap_or_default(),
            data: message.data,
            attributes: message.attributes,
            ordering_key: message.ordering_key,
            publish_time: message.publish_time.unwrap_or_else(Timestamp::now),
            delivery_attempt: 0,
        }
    }

    fn lease(&self, ack_id: AckId) -> ReceivedMessage {
        ReceivedMessage {
            message_id: self.message_id.clone(),
            data: self.data.clone(),
            attributes: self.attributes.clone(),
            ordering_key: self.ordering_key.clone(),
            publish_time: self.publish_time.clone(),
            ack_id,
            delivery_attempt: self.delivery_attempt,
        }
    }
}

// ============================================================================
// InMemoryProvider
// ============================================================================

/// In-memory subscription provider
pub struct InMemoryProvider {
    storage: Arc<RwLock<SubscriptionStorage>>,
    arrivals: Notify,
}

impl InMemoryProvider {
    /// Create new empty provider
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(SubscriptionStorage::new())),
            arrivals: Notify::new(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SubscriptionStorage> {
        self.storage.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SubscriptionStorage> {
        self.storage.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty subscription; existing subscriptions are left untouched
    pub fn create_subscription(&self, name: &SubscriptionName) {
        self.write().subscriptions.entry(name.clone()).or_default();
    }

    /// Publish a message directly into a subscription
    pub fn publish(
        &self,
        name: &SubscriptionName,
        message: PublishMessage,
    ) -> Result<MessageId, SubscriptionError> {
        let message_id = {
            let mut storage = self.write();
            storage.ensure_open()?;
            let stored = StoredMessage::from_publish(message);
            let message_id = stored.message_id.clone();
            storage.subscription_mut(name)?.available.push_back(stored);
            message_id
        };

        self.arrivals.notify_waiters();
        Ok(message_id)
    }

    /// Make the next `count` pulls fail with `failure`
    pub fn fail_next_pulls(&self, failure: PullFailure, count: usize) {
        let mut storage = self.write();
        storage.pull_failure = (count > 0).then_some((failure, count));
    }

    /// Remove any injected pull failures
    pub fn clear_pull_failures(&self) {
        self.write().pull_failure = None;
    }

    /// Number of messages acknowledged on a subscription
    pub fn acknowledged_count(&self, name: &SubscriptionName) -> usize {
        self.read()
            .subscriptions
            .get(name)
            .map_or(0, |s| s.acknowledged)
    }

    /// Number of negative acknowledgments on a subscription
    pub fn nacked_count(&self, name: &SubscriptionName) -> usize {
        self.read().subscriptions.get(name).map_or(0, |s| s.nacked)
    }

    /// Number of messages waiting to be pulled
    pub fn pending_count(&self, name: &SubscriptionName) -> usize {
        self.read()
            .subscriptions
            .get(name)
            .map_or(0, |s| s.available.len())
    }

    /// Number of messages leased and not yet acked or nacked
    pub fn leased_count(&self, name: &SubscriptionName) -> usize {
        self.read()
            .subscriptions
            .get(name)
            .map_or(0, |s| s.leased.len())
    }

    /// Check whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.read().closed
    }

    /// Lease up to `max_messages` from a subscription without waiting
    fn try_lease(
        &self,
        name: &SubscriptionName,
        max_messages: u32,
    ) -> Result<Vec<ReceivedMessage>, SubscriptionError> {
        let mut storage = self.write();
        storage.ensure_open()?;

        if let Some(error) = storage.take_pull_failure() {
            return Err(error);
        }

        let subscription = storage.subscription_mut(name)?;
        let mut leased = Vec::new();

        while leased.len() < max_messages as usize {
            let Some(mut stored) = subscription.available.pop_front() else {
                break;
            };

            stored.delivery_attempt += 1;
            let ack_id = uuid::Uuid::new_v4().to_string();
            leased.push(stored.lease(AckId::new(ack_id.clone())));
            subscription.leased.insert(ack_id, stored);
        }

        Ok(leased)
    }

    /// Resolve leases, either dropping the messages or returning them
    fn resolve(
        &self,
        name: &SubscriptionName,
        ack_ids: &[AckId],
        redeliver: bool,
    ) -> Result<(), SubscriptionError> {
        {
            let mut storage = self.write();
            storage.ensure_open()?;
            let subscription = storage.subscription_mut(name)?;

            // Check every ack ID before changing anything
            if let Some(missing) = ack_ids
                .iter()
                .find(|id| !subscription.leased.contains_key(id.as_str()))
            {
                return Err(SubscriptionError::MessageNotFound {
                    ack_id: missing.to_string(),
                });
            }

            for ack_id in ack_ids {
                let Some(stored) = subscription.leased.remove(ack_id.as_str()) else {
                    continue;
                };

                if redeliver {
                    subscription.nacked += 1;
                    subscription.available.push_front(stored);
                } else {
                    subscription.acknowledged += 1;
                }
            }
        }

        if redeliver {
            self.arrivals.notify_waiters();
        }

        Ok(())
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriptionProvider for InMemoryProvider {
    async fn subscription_exists(
        &self,
        subscription: &SubscriptionName,
    ) -> Result<bool, SubscriptionError> {
        let storage = self.read();
        storage.ensure_open()?;
        Ok(storage.subscriptions.contains_key(subscription))
    }

    async fn pull(
        &self,
        subscription: &SubscriptionName,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, SubscriptionError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register for wake-ups before looking, so a publish in between is not missed
            let arrival = self.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            let messages = self.try_lease(subscription, max_messages)?;
            if !messages.is_empty() {
                debug!(
                    subscription = %subscription,
                    message_count = messages.len(),
                    "Leased messages"
                );
                return Ok(messages);
            }

            if tokio::time::timeout_at(deadline, arrival).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn acknowledge(
        &self,
        subscription: &SubscriptionName,
        ack_ids: &[AckId],
    ) -> Result<(), SubscriptionError> {
        self.resolve(subscription, ack_ids, false)
    }

    async fn negative_acknowledge(
        &self,
        subscription: &SubscriptionName,
        ack_ids: &[AckId],
    ) -> Result<(), SubscriptionError> {
        self.resolve(subscription, ack_ids, true)
    }

    async fn close(&self) -> Result<(), SubscriptionError> {
        self.write().closed = true;
        self.arrivals.notify_waiters();
        Ok(())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}
