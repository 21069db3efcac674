//! Consumption loop: receive, transform, deliver, then ack or nack.
//!
//! The subscription's receive loop runs in its own task and hands messages
//! over a bounded channel. Each message is processed in a task of its own, at
//! most `max_outstanding_messages` at a time, and every message ends with
//! exactly one of:
//!
//! - `ack` after the push endpoint answered 2xx
//! - `nack` after any delivery failure
//! - `nack` without delivery when it was still waiting after cancellation
//!
//! `run` only returns once every message handed out has been resolved.

use crate::config::BridgeConfig;
use crate::delivery::PushDelivery;
use crate::envelope::PushEnvelope;
use crate::error::ConsumerError;
use pubsub_runtime::{Delivery, Subscription, SubscriptionError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;

/// Lifecycle state of the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Running,
    Stopped,
}

/// Counters of how messages were resolved
#[derive(Debug, Default)]
pub struct ConsumerStats {
    acked: AtomicU64,
    nacked: AtomicU64,
    released: AtomicU64,
    resolve_failures: AtomicU64,
}

/// Point-in-time copy of [`ConsumerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Delivered and acked
    pub acked: u64,
    /// Delivery failed, nacked
    pub nacked: u64,
    /// Nacked without delivery after cancellation
    pub released: u64,
    /// Ack or nack calls the subscription rejected
    pub resolve_failures: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            acked: self.acked.load(Ordering::Relaxed),
            nacked: self.nacked.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            resolve_failures: self.resolve_failures.load(Ordering::Relaxed),
        }
    }

    fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Drives the receive, deliver, resolve cycle for one subscription
pub struct MessageConsumer {
    subscription: Subscription,
    config: Arc<BridgeConfig>,
    delivery: Arc<dyn PushDelivery>,
    stats: Arc<ConsumerStats>,
    running: AtomicBool,
}

impl MessageConsumer {
    pub fn new(
        subscription: Subscription,
        config: Arc<BridgeConfig>,
        delivery: Arc<dyn PushDelivery>,
    ) -> Self {
        Self {
            subscription,
            config,
            delivery,
            stats: Arc::new(ConsumerStats::default()),
            running: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConsumerState {
        if self.running.load(Ordering::Acquire) {
            ConsumerState::Running
        } else {
            ConsumerState::Stopped
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Run until `token` is cancelled or the receive loop ends
    ///
    /// # Errors
    ///
    /// Cancellation is a clean stop and returns `Ok(())`. Any other end of
    /// the receive loop is a [`ConsumerError`].
    pub async fn run(&self, token: CancellationToken) -> Result<(), ConsumerError> {
        let limit = self.subscription.settings().max_outstanding_messages.max(1);
        let (sender, mut receiver) = mpsc::channel::<Delivery>(limit);

        let subscription = self.subscription.clone();
        let receive_token = token.clone();
        let receive_task =
            tokio::spawn(async move { subscription.receive(receive_token, sender).await });

        self.running.store(true, Ordering::Release);
        debug!(
            subscription = %self.subscription.name(),
            max_outstanding_messages = limit,
            "Consumer running"
        );

        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_join_failure(joined);
                }
                received = receiver.recv(), if in_flight.len() < limit => {
                    let Some(delivery) = received else {
                        // Receive loop ended and the channel is drained
                        break;
                    };

                    if token.is_cancelled() {
                        self.release(delivery).await;
                        continue;
                    }

                    in_flight.spawn(process_message(
                        delivery,
                        Arc::clone(&self.config),
                        Arc::clone(&self.delivery),
                        Arc::clone(&self.stats),
                    ));
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            log_join_failure(joined);
        }

        self.running.store(false, Ordering::Release);

        let outcome = match receive_task.await {
            Ok(Ok(())) | Ok(Err(SubscriptionError::Cancelled)) => Ok(()),
            Ok(Err(e)) => Err(ConsumerError::Receive(e)),
            Err(e) => Err(ConsumerError::ReceiveTaskFailed {
                message: e.to_string(),
            }),
        };

        let stats = self.stats();
        info!(
            acked = stats.acked,
            nacked = stats.nacked,
            released = stats.released,
            "Consumer stopped"
        );

        outcome
    }

    /// Hand a message back without delivering it
    async fn release(&self, delivery: Delivery) {
        let message_id = delivery.message.message_id.clone();
        match delivery.ack.nack().await {
            Ok(()) => {
                ConsumerStats::record(&self.stats.released);
                debug!(message_id = %message_id, "Released message after cancellation");
            }
            Err(e) => {
                ConsumerStats::record(&self.stats.resolve_failures);
                warn!(
                    message_id = %message_id,
                    error = %e,
                    "Failed to release message after cancellation"
                );
            }
        }
    }
}

/// Transform, deliver, and resolve one message
async fn process_message(
    delivery: Delivery,
    config: Arc<BridgeConfig>,
    client: Arc<dyn PushDelivery>,
    stats: Arc<ConsumerStats>,
) {
    let Delivery { message, ack } = delivery;
    let envelope = PushEnvelope::from_message(&message, &config);

    match client.deliver(config.url(), &envelope).await {
        Ok(()) => {
            if let Err(e) = ack.ack().await {
                ConsumerStats::record(&stats.resolve_failures);
                warn!(
                    message_id = %message.message_id,
                    error = %e,
                    "Failed to acknowledge message"
                );
                return;
            }

            ConsumerStats::record(&stats.acked);
            info!(
                message_id = %message.message_id,
                "Message processed successfully"
            );
        }
        Err(e) => {
            error!(
                message_id = %message.message_id,
                url = %config.url(),
                status = ?e.status(),
                error = %e,
                "Failed to deliver message"
            );

            match ack.nack().await {
                Ok(()) => ConsumerStats::record(&stats.nacked),
                Err(e) => {
                    ConsumerStats::record(&stats.resolve_failures);
                    warn!(
                        message_id = %message.message_id,
                        error = %e,
                        "Failed to negatively acknowledge message"
                    );
                }
            }
        }
    }
}

fn log_join_failure(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Message handler task failed");
    }
}
