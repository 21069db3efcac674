//! HTTP push client.

use crate::envelope::PushEnvelope;
use crate::error::DeliveryError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

/// Timeout applied to every push request
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers one envelope to a push endpoint
///
/// Implementations must not retry; redelivery is left to the subscription.
#[async_trait]
pub trait PushDelivery: Send + Sync {
    /// POST `envelope` to `url`; any non-2xx outcome is an error
    async fn deliver(&self, url: &str, envelope: &PushEnvelope) -> Result<(), DeliveryError>;
}

/// Push client settings
#[derive(Debug, Clone)]
pub struct PushClientConfig {
    pub timeout: Duration,
}

impl Default for PushClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PUSH_TIMEOUT,
        }
    }
}

/// [`PushDelivery`] over `reqwest`
#[derive(Debug, Clone)]
pub struct PushClient {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl PushClient {
    /// Create push client
    pub fn new(config: PushClientConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            http_client,
            timeout: config.timeout,
        })
    }

    fn map_send_error(&self, url: &str, error: reqwest::Error) -> DeliveryError {
        if error.is_builder() {
            DeliveryError::InvalidRequest {
                url: url.to_string(),
                source: error,
            }
        } else if error.is_timeout() {
            DeliveryError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            DeliveryError::Transport { source: error }
        }
    }
}

#[async_trait]
impl PushDelivery for PushClient {
    async fn deliver(&self, url: &str, envelope: &PushEnvelope) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(envelope)?;

        let response = self
            .http_client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::UnexpectedStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        debug!(
            url = %url,
            status = status.as_u16(),
            message_id = %envelope.message.message_id,
            "Push endpoint accepted message"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;
