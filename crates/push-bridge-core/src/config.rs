//! Immutable bridge configuration.

use crate::error::ConfigError;
use pubsub_runtime::{ProjectId, SubscriptionId, SubscriptionName};

/// Push endpoint used when none is configured
pub const DEFAULT_PUSH_URL: &str = "http://localhost:8080";

/// Which subscription to drain and where to push its messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    subscription: SubscriptionName,
    url: String,
}

impl BridgeConfig {
    /// Validate and build configuration
    ///
    /// Project and subscription are trimmed; a blank value counts as missing.
    /// `url` falls back to [`DEFAULT_PUSH_URL`] only when `None`. An explicit
    /// URL, even an empty one, is kept as given and not validated; a malformed
    /// URL fails each delivery instead.
    pub fn new(project: &str, subscription: &str, url: Option<&str>) -> Result<Self, ConfigError> {
        let project = required("project", project)?;
        let subscription = required("subscription", subscription)?;

        let project = ProjectId::new(project)
            .map_err(|source| ConfigError::InvalidArgument {
                flag: "project",
                source,
            })?;
        let subscription = SubscriptionId::new(subscription).map_err(|source| {
            ConfigError::InvalidArgument {
                flag: "subscription",
                source,
            }
        })?;

        let url = url.unwrap_or(DEFAULT_PUSH_URL).to_string();

        Ok(Self {
            subscription: SubscriptionName::new(project, subscription),
            url,
        })
    }

    pub fn project(&self) -> &ProjectId {
        self.subscription.project()
    }

    pub fn subscription(&self) -> &SubscriptionId {
        self.subscription.subscription()
    }

    /// Fully qualified subscription name
    pub fn subscription_name(&self) -> &SubscriptionName {
        &self.subscription
    }

    /// Push endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn required<'a>(flag: &'static str, value: &'a str) -> Result<&'a str, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::MissingArgument { flag });
    }
    Ok(value)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
