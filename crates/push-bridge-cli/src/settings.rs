//! Layered settings for the bridge binary.
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. built-in defaults (every field carries a serde default)
//! 2. the file given by `--config` / `PUSH_BRIDGE_CONFIG` (format from its extension)
//! 3. environment variables prefixed `PUSH_BRIDGE__`, sections separated by `__`,
//!    e.g. `PUSH_BRIDGE__PUBSUB__MAX_MESSAGES=5`
//! 4. explicit command-line flags
//!
//! `PUBSUB_EMULATOR_HOST` is used when no emulator host is configured.

use push_bridge_core::{BridgeConfig, ConfigError};
use pubsub_runtime::{
    ProviderConfig, PubSubConfig, ReceiveSettings, DEFAULT_PUBSUB_ENDPOINT,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;

/// Prefix of environment variables read as settings
pub const ENV_PREFIX: &str = "PUSH_BRIDGE";

/// Environment variable naming the Pub/Sub emulator
pub const EMULATOR_HOST_ENV: &str = "PUBSUB_EMULATOR_HOST";

/// Raw settings before validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub project: Option<String>,
    pub subscription: Option<String>,
    pub url: Option<String>,
    pub pubsub: PubSubSettings,
}

/// Subscription client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubSettings {
    pub endpoint: String,
    pub emulator_host: Option<String>,
    pub access_token: Option<String>,
    pub max_messages: u32,
    pub max_outstanding_messages: usize,
    pub pull_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for PubSubSettings {
    fn default() -> Self {
        let receive = ReceiveSettings::default();
        let client = PubSubConfig::default();
        Self {
            endpoint: DEFAULT_PUBSUB_ENDPOINT.to_string(),
            emulator_host: None,
            access_token: None,
            max_messages: receive.max_messages,
            max_outstanding_messages: receive.max_outstanding_messages,
            pull_timeout_seconds: receive.pull_timeout.as_secs(),
            request_timeout_seconds: client.request_timeout.as_secs(),
        }
    }
}

/// Values given explicitly on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub project: Option<String>,
    pub subscription: Option<String>,
    pub url: Option<String>,
}

/// Validated settings ready to start the bridge
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub bridge: BridgeConfig,
    pub provider: ProviderConfig,
    pub receive: ReceiveSettings,
}

impl BridgeSettings {
    /// Load settings from the optional file and the environment
    pub fn load(config_file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let mut settings: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        if settings.pubsub.emulator_host.is_none() {
            settings.pubsub.emulator_host = std::env::var(EMULATOR_HOST_ENV)
                .ok()
                .filter(|host| !host.trim().is_empty());
        }

        Ok(settings)
    }

    /// Apply explicit command-line values
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(project) = overrides.project {
            self.project = Some(project);
        }
        if let Some(subscription) = overrides.subscription {
            self.subscription = Some(subscription);
        }
        if let Some(url) = overrides.url {
            self.url = Some(url);
        }
    }

    /// Validate into the configuration types the bridge runs on
    pub fn resolve(&self) -> Result<ResolvedSettings, ConfigError> {
        let bridge = BridgeConfig::new(
            self.project.as_deref().unwrap_or_default(),
            self.subscription.as_deref().unwrap_or_default(),
            self.url.as_deref(),
        )?;

        let pubsub = PubSubConfig {
            endpoint: self.pubsub.endpoint.clone(),
            emulator_host: self.pubsub.emulator_host.clone(),
            access_token: self.pubsub.access_token.clone(),
            request_timeout: Duration::from_secs(self.pubsub.request_timeout_seconds),
        };
        pubsub.validate().map_err(|e| ConfigError::InvalidSetting {
            message: e.to_string(),
        })?;

        let receive = ReceiveSettings {
            max_messages: self.pubsub.max_messages,
            max_outstanding_messages: self.pubsub.max_outstanding_messages,
            pull_timeout: Duration::from_secs(self.pubsub.pull_timeout_seconds),
        };
        receive.validate().map_err(|e| ConfigError::InvalidSetting {
            message: e.to_string(),
        })?;

        Ok(ResolvedSettings {
            bridge,
            provider: ProviderConfig::PubSub(pubsub),
            receive,
        })
    }
}
