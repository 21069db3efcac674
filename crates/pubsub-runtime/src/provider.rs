//! Provider types and configuration.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default public Pub/Sub API endpoint
pub const DEFAULT_PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";

/// Enumeration of supported subscription providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    PubSub,
    InMemory,
}

impl ProviderType {
    /// Name used in logs and provider errors
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PubSub => "PubSub",
            Self::InMemory => "InMemory",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-specific configuration
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    PubSub(PubSubConfig),
    InMemory,
}

/// Pub/Sub REST API configuration
#[derive(Debug, Clone)]
pub struct PubSubConfig {
    /// API endpoint used when no emulator host is set
    pub endpoint: String,
    /// `host:port` of a local emulator; takes precedence over `endpoint`
    pub emulator_host: Option<String>,
    /// Bearer token sent with every request, if any
    pub access_token: Option<String>,
    /// Timeout for non-pull requests
    pub request_timeout: Duration,
}

impl PubSubConfig {
    /// Base URL requests are issued against, without a trailing slash
    pub fn base_url(&self) -> String {
        match self.emulator_host.as_deref().filter(|h| !h.is_empty()) {
            Some(host) if host.starts_with("http://") || host.starts_with("https://") => {
                host.trim_end_matches('/').to_string()
            }
            Some(host) => format!("http://{}", host.trim_end_matches('/')),
            None => self.endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Validate that the base URL is usable
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let base = self.base_url();
        let parsed = url::Url::parse(&base).map_err(|e| ConfigurationError::Invalid {
            message: format!("invalid Pub/Sub endpoint '{}': {}", base, e),
        })?;

        if parsed.cannot_be_a_base() {
            return Err(ConfigurationError::Invalid {
                message: format!("Pub/Sub endpoint '{}' cannot be used as a base URL", base),
            });
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigurationError::Invalid {
                message: "request timeout must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_PUBSUB_ENDPOINT.to_string(),
            emulator_host: None,
            access_token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Flow-control settings for the receive loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveSettings {
    /// Maximum messages requested per pull
    pub max_messages: u32,
    /// Maximum messages handed out and not yet acked or nacked
    pub max_outstanding_messages: usize,
    /// How long a single pull may wait for messages
    pub pull_timeout: Duration,
}

impl ReceiveSettings {
    /// Validate flow-control limits
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_messages == 0 {
            return Err(ConfigurationError::Invalid {
                message: "max_messages must be at least 1".to_string(),
            });
        }

        if self.max_outstanding_messages == 0 {
            return Err(ConfigurationError::Invalid {
                message: "max_outstanding_messages must be at least 1".to_string(),
            });
        }

        if self.pull_timeout.is_zero() {
            return Err(ConfigurationError::Invalid {
                message: "pull timeout must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for ReceiveSettings {
    fn default() -> Self {
        Self {
            max_messages: 10,
            max_outstanding_messages: 10,
            pull_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
