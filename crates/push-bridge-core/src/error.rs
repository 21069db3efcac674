//! Error types for the push bridge.

use pubsub_runtime::{SubscriptionError, ValidationError};
use thiserror::Error;

/// Invalid bridge configuration; raised before any connection is attempted
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required argument: --{flag}")]
    MissingArgument { flag: &'static str },

    #[error("invalid value for --{flag}: {source}")]
    InvalidArgument {
        flag: &'static str,
        #[source]
        source: ValidationError,
    },

    #[error("invalid setting: {message}")]
    InvalidSetting { message: String },
}

/// Failure while preparing the bridge to receive
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to create subscription client: {0}")]
    Client(#[source] SubscriptionError),

    #[error("failed to create push client: {0}")]
    PushClient(#[source] reqwest::Error),

    #[error("failed to check if subscription '{subscription}' exists: {source}")]
    ExistenceCheck {
        subscription: String,
        #[source]
        source: SubscriptionError,
    },

    #[error("subscription '{subscription}' does not exist")]
    SubscriptionNotFound { subscription: String },
}

/// Failure that ends the consumption loop
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("receive failed: {0}")]
    Receive(#[source] SubscriptionError),

    #[error("receive task failed: {message}")]
    ReceiveTaskFailed { message: String },
}

/// Failure delivering one envelope; the message is nacked
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to serialize push envelope: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("push request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("invalid push request to '{url}': {source}")]
    InvalidRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("push request failed: {source}")]
    Transport {
        #[source]
        source: reqwest::Error,
    },

    #[error("push endpoint returned HTTP {status} {reason}")]
    UnexpectedStatus { status: u16, reason: String },
}

impl DeliveryError {
    /// HTTP status returned by the endpoint, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Any fatal bridge error
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Consumer(#[from] ConsumerError),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
