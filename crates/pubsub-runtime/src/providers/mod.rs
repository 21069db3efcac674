//! Subscription provider implementations.
//!
//! This module contains concrete implementations of the `SubscriptionProvider`
//! trait for different backends.

pub mod memory;
pub mod pubsub;

pub use memory::{InMemoryProvider, PullFailure};
pub use pubsub::PubSubProvider;
