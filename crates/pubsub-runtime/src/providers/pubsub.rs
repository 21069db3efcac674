//! Pub/Sub provider implementation using the v1 REST API.
//!
//! Requests go straight to the REST endpoints with `reqwest`, so the provider
//! works against the public API, the local emulator, and mocked HTTP servers
//! in tests alike.
//!
//! ## Endpoints
//!
//! - `GET  /v1/projects/{p}/subscriptions/{s}` - existence check
//! - `POST /v1/projects/{p}/subscriptions/{s}:pull` - lease messages
//! - `POST /v1/projects/{p}/subscriptions/{s}:acknowledge` - ack
//! - `POST /v1/projects/{p}/subscriptions/{s}:modifyAckDeadline` with a zero
//!   deadline - nack
//!
//! ## Authentication
//!
//! When `access_token` is configured it is sent as a bearer token. The
//! emulator accepts unauthenticated requests.

use crate::client::SubscriptionProvider;
use crate::error::{SerializationError, SubscriptionError};
use crate::message::{AckId, MessageId, ReceivedMessage, SubscriptionName, Timestamp};
use crate::provider::{ProviderType, PubSubConfig};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "pubsub_tests.rs"]
mod tests;

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    max_messages: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<WireReceivedMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReceivedMessage {
    ack_id: String,
    message: WireMessage,
    #[serde(default)]
    delivery_attempt: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(default)]
    data: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
    message_id: String,
    publish_time: String,
    #[serde(default)]
    ordering_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcknowledgeRequest<'a> {
    ack_ids: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyAckDeadlineRequest<'a> {
    ack_ids: Vec<&'a str>,
    ack_deadline_seconds: u32,
}

/// Google API error body: `{"error": {"code": 404, "message": "...", "status": "NOT_FOUND"}}`
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl WireReceivedMessage {
    fn into_received(self) -> Result<ReceivedMessage, SerializationError> {
        let message = self.message;

        let data = STANDARD
            .decode(message.data.as_bytes())
            .map_err(|e| SerializationError::InvalidData {
                message_id: message.message_id.clone(),
                message: e.to_string(),
            })?;

        let publish_time: Timestamp =
            message
                .publish_time
                .parse()
                .map_err(|_| SerializationError::InvalidTimestamp {
                    value: message.publish_time.clone(),
                })?;

        let message_id: MessageId =
            message
                .message_id
                .parse()
                .map_err(|_| SerializationError::InvalidData {
                    message_id: String::new(),
                    message: "missing messageId".to_string(),
                })?;

        Ok(ReceivedMessage {
            message_id,
            data: Bytes::from(data),
            attributes: message.attributes,
            ordering_key: message.ordering_key,
            publish_time,
            ack_id: AckId::new(self.ack_id),
            // Only populated when a dead letter policy is set
            delivery_attempt: self.delivery_attempt.max(1),
        })
    }
}

// ============================================================================
// PubSubProvider
// ============================================================================

/// Subscription provider backed by the Pub/Sub REST API
pub struct PubSubProvider {
    http_client: HttpClient,
    config: PubSubConfig,
    base_url: String,
    closed: AtomicBool,
}

impl PubSubProvider {
    /// Create new provider
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the endpoint is not a valid base URL or
    /// the HTTP client cannot be built.
    pub fn new(config: PubSubConfig) -> Result<Self, SubscriptionError> {
        config.validate()?;

        let http_client = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SubscriptionError::ConnectionFailed {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let base_url = config.base_url();

        debug!(base_url = %base_url, "Created Pub/Sub REST provider");

        Ok(Self {
            http_client,
            config,
            base_url,
            closed: AtomicBool::new(false),
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn ensure_open(&self) -> Result<(), SubscriptionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SubscriptionError::ClientClosed);
        }
        Ok(())
    }

    fn subscription_url(&self, subscription: &SubscriptionName, action: Option<&str>) -> String {
        match action {
            Some(action) => format!("{}/v1/{}:{}", self.base_url, subscription.path(), action),
            None => format!("{}/v1/{}", self.base_url, subscription.path()),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.access_token.as_deref() {
            Some(token) if !token.is_empty() => request.bearer_auth(token),
            _ => request,
        }
    }

    /// Send request and map transport failures
    async fn send(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<reqwest::Response, SubscriptionError> {
        self.authorize(request)
            .send()
            .await
            .map_err(|e| map_transport_error(e, operation, self.config.request_timeout))
    }

    /// POST a JSON body and fail on any non-success status
    async fn post_action<T: Serialize + ?Sized>(
        &self,
        subscription: &SubscriptionName,
        action: &str,
        body: &T,
    ) -> Result<(), SubscriptionError> {
        let request = self
            .http_client
            .post(self.subscription_url(subscription, Some(action)))
            .json(body);

        let response = self.send(request, action).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(response, subscription, action).await);
        }

        Ok(())
    }
}

impl fmt::Debug for PubSubProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PubSubProvider")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.config.access_token.is_some())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

#[async_trait]
impl SubscriptionProvider for PubSubProvider {
    async fn subscription_exists(
        &self,
        subscription: &SubscriptionName,
    ) -> Result<bool, SubscriptionError> {
        self.ensure_open()?;

        let request = self
            .http_client
            .get(self.subscription_url(subscription, None));
        let response = self.send(request, "get").await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(error_from_response(response, subscription, "get").await),
        }
    }

    async fn pull(
        &self,
        subscription: &SubscriptionName,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, SubscriptionError> {
        self.ensure_open()?;

        let request = self
            .http_client
            .post(self.subscription_url(subscription, Some("pull")))
            .timeout(timeout)
            .json(&PullRequest { max_messages });

        let response = match self.authorize(request).send().await {
            Ok(response) => response,
            // Long poll ended without messages
            Err(e) if e.is_timeout() => return Ok(Vec::new()),
            Err(e) => return Err(map_transport_error(e, "pull", timeout)),
        };

        if !response.status().is_success() {
            return Err(error_from_response(response, subscription, "pull").await);
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => return Ok(Vec::new()),
            Err(e) => return Err(map_transport_error(e, "pull", timeout)),
        };

        let parsed: PullResponse = if body.iter().all(u8::is_ascii_whitespace) {
            PullResponse::default()
        } else {
            serde_json::from_slice(&body).map_err(SerializationError::from)?
        };

        let mut messages = Vec::with_capacity(parsed.received_messages.len());
        let mut undecodable = Vec::new();
        for received in parsed.received_messages {
            let ack_id = AckId::new(received.ack_id.clone());
            let message_id = received.message.message_id.clone();
            match received.into_received() {
                Ok(message) => messages.push(message),
                Err(e) => {
                    warn!(
                        subscription = %subscription,
                        message_id = %message_id,
                        error = %e,
                        "Discarding undecodable message; returning it to the subscription"
                    );
                    undecodable.push(ack_id);
                }
            }
        }

        // Undecodable messages never reach the caller, so they are nacked here
        if let Err(e) = self.negative_acknowledge(subscription, &undecodable).await {
            warn!(
                subscription = %subscription,
                count = undecodable.len(),
                error = %e,
                "Failed to return undecodable messages"
            );
        }

        debug!(
            subscription = %subscription,
            message_count = messages.len(),
            "Pulled messages"
        );

        Ok(messages)
    }

    async fn acknowledge(
        &self,
        subscription: &SubscriptionName,
        ack_ids: &[AckId],
    ) -> Result<(), SubscriptionError> {
        self.ensure_open()?;
        if ack_ids.is_empty() {
            return Ok(());
        }

        let body = AcknowledgeRequest {
            ack_ids: ack_ids.iter().map(AckId::as_str).collect(),
        };
        self.post_action(subscription, "acknowledge", &body).await
    }

    async fn negative_acknowledge(
        &self,
        subscription: &SubscriptionName,
        ack_ids: &[AckId],
    ) -> Result<(), SubscriptionError> {
        self.ensure_open()?;
        if ack_ids.is_empty() {
            return Ok(());
        }

        let body = ModifyAckDeadlineRequest {
            ack_ids: ack_ids.iter().map(AckId::as_str).collect(),
            ack_deadline_seconds: 0,
        };
        self.post_action(subscription, "modifyAckDeadline", &body)
            .await
    }

    async fn close(&self) -> Result<(), SubscriptionError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Pub/Sub provider already closed");
        }
        Ok(())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::PubSub
    }
}

// ============================================================================
// Error Mapping
// ============================================================================

fn map_transport_error(error: reqwest::Error, operation: &str, timeout: Duration) -> SubscriptionError {
    if error.is_timeout() {
        SubscriptionError::Timeout { duration: timeout }
    } else if error.is_connect() {
        SubscriptionError::ConnectionFailed {
            message: format!("{} connection failed: {}", operation, error),
        }
    } else {
        SubscriptionError::ConnectionFailed {
            message: format!("{} request failed: {}", operation, error),
        }
    }
}

/// Map a non-success response to a subscription error
async fn error_from_response(
    response: reqwest::Response,
    subscription: &SubscriptionName,
    operation: &str,
) -> SubscriptionError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let (code, message) = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(parsed) => (parsed.error.status, parsed.error.message),
        Err(_) => (String::new(), body),
    };
    let code = if code.is_empty() {
        status.as_str().to_string()
    } else {
        code
    };

    map_status(status, code, message, subscription, operation)
}

fn map_status(
    status: StatusCode,
    code: String,
    message: String,
    subscription: &SubscriptionName,
    operation: &str,
) -> SubscriptionError {
    match status {
        StatusCode::UNAUTHORIZED => SubscriptionError::AuthenticationFailed { message },
        StatusCode::FORBIDDEN => SubscriptionError::PermissionDenied {
            operation: operation.to_string(),
        },
        StatusCode::NOT_FOUND => SubscriptionError::SubscriptionNotFound {
            subscription: subscription.path(),
        },
        StatusCode::TOO_MANY_REQUESTS => SubscriptionError::ProviderError {
            provider: ProviderType::PubSub.to_string(),
            code,
            message,
        },
        s if s.is_server_error() => SubscriptionError::ProviderError {
            provider: ProviderType::PubSub.to_string(),
            code,
            message,
        },
        _ => SubscriptionError::InvalidRequest {
            message: format!("{} failed with {} ({}): {}", operation, status, code, message),
        },
    }
}
