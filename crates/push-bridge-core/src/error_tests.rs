//! Tests for bridge error types.

use super::*;

#[test]
fn test_missing_argument_names_flag() {
    let error = ConfigError::MissingArgument { flag: "project" };
    assert_eq!(error.to_string(), "missing required argument: --project");
}

#[test]
fn test_delivery_error_status() {
    let error = DeliveryError::UnexpectedStatus {
        status: 500,
        reason: "Internal Server Error".to_string(),
    };
    assert_eq!(error.status(), Some(500));
    assert!(error.to_string().contains("500"));

    let error = DeliveryError::Timeout { seconds: 10 };
    assert_eq!(error.status(), None);
}

#[test]
fn test_bridge_error_is_transparent() {
    let error: BridgeError = SetupError::SubscriptionNotFound {
        subscription: "projects/p/subscriptions/s".to_string(),
    }
    .into();

    assert_eq!(
        error.to_string(),
        "subscription 'projects/p/subscriptions/s' does not exist"
    );
}
