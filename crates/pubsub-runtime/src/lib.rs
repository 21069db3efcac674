//! # Pub/Sub Runtime
//!
//! Subscription runtime for pulling messages from a Pub/Sub subscription and
//! resolving each one with exactly one acknowledgment.
//!
//! This library provides:
//! - Provider-agnostic subscription operations (existence, pull, ack, nack)
//! - A channel-based receive loop that honours a cancellation token
//! - Acknowledgment handles that are consumed by `ack` or `nack`
//! - A Pub/Sub REST provider (works against the emulator) and an in-memory provider
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all subscription operations
//! - [`message`] - Identifiers, timestamps and received messages
//! - [`provider`] - Provider types and configuration
//! - [`client`] - Provider trait and factory
//! - [`subscription`] - Subscription handle and receive loop
//! - [`ack`] - Acknowledgment handles
//! - [`providers`] - Concrete provider implementations

pub mod ack;
pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;
pub mod subscription;

// Re-export commonly used types at crate root for convenience
pub use ack::{AckHandle, Delivery};
pub use client::{SubscriptionClientFactory, SubscriptionProvider};
pub use error::{ConfigurationError, SerializationError, SubscriptionError, ValidationError};
pub use message::{
    AckId, MessageId, ProjectId, PublishMessage, ReceivedMessage, SubscriptionId,
    SubscriptionName, Timestamp,
};
pub use provider::{
    ProviderConfig, ProviderType, PubSubConfig, ReceiveSettings, DEFAULT_PUBSUB_ENDPOINT,
};
pub use providers::{InMemoryProvider, PubSubProvider, PullFailure};
pub use subscription::Subscription;
