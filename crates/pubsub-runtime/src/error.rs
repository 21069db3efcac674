//! Error types for subscription operations.

use std::time::Duration;
use thiserror::Error;

/// Comprehensive error type for all subscription operations
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Subscription not found: {subscription}")]
    SubscriptionNotFound { subscription: String },

    #[error("Message not found or ack ID expired: {ack_id}")]
    MessageNotFound { ack_id: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Permission denied for operation: {operation}")]
    PermissionDenied { operation: String },

    #[error("Request rejected: {message}")]
    InvalidRequest { message: String },

    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Subscription client is closed")]
    ClientClosed,

    #[error("Message receiver closed before all messages were handed over")]
    ReceiverClosed,

    #[error("Receive cancelled")]
    Cancelled,

    #[error("Serialization failed: {0}")]
    SerializationError(#[from] SerializationError),

    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

impl SubscriptionError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::SubscriptionNotFound { .. } => false,
            Self::MessageNotFound { .. } => false,
            Self::Timeout { .. } => true,
            Self::ConnectionFailed { .. } => true,
            Self::AuthenticationFailed { .. } => false,
            Self::PermissionDenied { .. } => false,
            Self::InvalidRequest { .. } => false,
            Self::ProviderError { .. } => true, // Provider-side errors are usually transient
            Self::ClientClosed => false,
            Self::ReceiverClosed => false,
            Self::Cancelled => false,
            Self::SerializationError(_) => false,
            Self::ConfigurationError(_) => false,
            Self::ValidationError(_) => false,
        }
    }

    /// Get suggested retry delay
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Timeout { .. } => Some(Duration::from_secs(1)),
            Self::ConnectionFailed { .. } => Some(Duration::from_secs(5)),
            Self::ProviderError { .. } => Some(Duration::from_secs(2)),
            _ => None,
        }
    }
}

/// Errors during message decoding
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Message data for '{message_id}' is not valid base64: {message}")]
    InvalidData { message_id: String, message: String },

    #[error("Publish time '{value}' is not a valid RFC3339 timestamp")]
    InvalidTimestamp { value: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
