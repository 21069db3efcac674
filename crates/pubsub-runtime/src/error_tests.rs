//! Tests for error types.

use super::*;

#[test]
fn test_error_transience() {
    assert!(SubscriptionError::ConnectionFailed {
        message: "network error".to_string(),
    }
    .is_transient());

    assert!(SubscriptionError::Timeout {
        duration: Duration::from_secs(30),
    }
    .is_transient());

    assert!(!SubscriptionError::SubscriptionNotFound {
        subscription: "projects/p/subscriptions/s".to_string(),
    }
    .is_transient());

    assert!(!SubscriptionError::PermissionDenied {
        operation: "pull".to_string(),
    }
    .is_transient());
}

#[test]
fn test_cancellation_is_not_retried() {
    assert!(!SubscriptionError::Cancelled.is_transient());
    assert!(!SubscriptionError::ReceiverClosed.is_transient());
    assert!(!SubscriptionError::ClientClosed.is_transient());
}

#[test]
fn test_retry_suggestions() {
    let connection = SubscriptionError::ConnectionFailed {
        message: "refused".to_string(),
    };
    assert_eq!(connection.retry_after(), Some(Duration::from_secs(5)));

    let provider = SubscriptionError::ProviderError {
        provider: "PubSub".to_string(),
        code: "UNAVAILABLE".to_string(),
        message: "try again".to_string(),
    };
    assert_eq!(provider.retry_after(), Some(Duration::from_secs(2)));

    let not_found = SubscriptionError::SubscriptionNotFound {
        subscription: "projects/p/subscriptions/s".to_string(),
    };
    assert_eq!(not_found.retry_after(), None);
}

#[test]
fn test_error_messages_carry_details() {
    let error = SubscriptionError::MessageNotFound {
        ack_id: "ack-123".to_string(),
    };
    assert!(error.to_string().contains("ack-123"));

    let error: SubscriptionError = ValidationError::Required {
        field: "project".to_string(),
    }
    .into();
    assert!(error.to_string().contains("project"));
}
