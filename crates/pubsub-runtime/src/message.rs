//! Message types for subscription operations including core domain identifiers.

use crate::error::ValidationError;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validate a single resource path segment (project or subscription ID)
fn validate_segment(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.contains('/') {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            message: "must not contain '/'".to_string(),
        });
    }

    Ok(())
}

/// Validated project identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    /// Create new project ID with validation
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        validate_segment("project", &id)?;
        Ok(Self(id))
    }

    /// Get project ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProjectId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Validated subscription identifier (the short name, not the full path)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Create new subscription ID with validation
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        validate_segment("subscription", &id)?;
        Ok(Self(id))
    }

    /// Get subscription ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriptionId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Fully qualified subscription: `projects/{project}/subscriptions/{subscription}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionName {
    project: ProjectId,
    subscription: SubscriptionId,
}

impl SubscriptionName {
    /// Create subscription name from its parts
    pub fn new(project: ProjectId, subscription: SubscriptionId) -> Self {
        Self {
            project,
            subscription,
        }
    }

    /// Create subscription name from raw strings with validation
    pub fn parse(project: &str, subscription: &str) -> Result<Self, ValidationError> {
        Ok(Self::new(
            ProjectId::new(project)?,
            SubscriptionId::new(subscription)?,
        ))
    }

    /// Get project ID
    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    /// Get subscription ID
    pub fn subscription(&self) -> &SubscriptionId {
        &self.subscription
    }

    /// Resource path used by the Pub/Sub API and in push envelopes
    pub fn path(&self) -> String {
        format!(
            "projects/{}/subscriptions/{}",
            self.project, self.subscription
        )
    }
}

impl std::fmt::Display for SubscriptionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// Unique identifier assigned to a message by the publisher side
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Opaque token identifying one lease of a received message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AckId(String);

impl AckId {
    /// Wrap a provider-issued ack ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get ack ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// RFC3339 with whole seconds and a `Z` suffix, e.g. `2024-01-01T00:00:00Z`
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = DateTime::parse_from_rfc3339(s)?;
        Ok(Self::from_datetime(dt.with_timezone(&Utc)))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message to be published (used by the in-memory provider and tests)
#[derive(Debug, Clone)]
pub struct PublishMessage {
    pub data: Bytes,
    pub attributes: HashMap<String, String>,
    pub ordering_key: Option<String>,
    pub message_id: Option<MessageId>,
    pub publish_time: Option<Timestamp>,
}

impl PublishMessage {
    /// Create new message with payload
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            attributes: HashMap::new(),
            ordering_key: None,
            message_id: None,
            publish_time: None,
        }
    }

    /// Add message attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set ordering key
    pub fn with_ordering_key(mut self, ordering_key: impl Into<String>) -> Self {
        self.ordering_key = Some(ordering_key.into());
        self
    }

    /// Use a fixed message ID instead of a generated one
    pub fn with_message_id(mut self, message_id: MessageId) -> Self {
        self.message_id = Some(message_id);
        self
    }

    /// Use a fixed publish time instead of the time of publishing
    pub fn with_publish_time(mut self, publish_time: Timestamp) -> Self {
        self.publish_time = Some(publish_time);
        self
    }
}

/// A message pulled from a subscription with its lease metadata
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub data: Bytes,
    pub attributes: HashMap<String, String>,
    pub ordering_key: Option<String>,
    pub publish_time: Timestamp,
    pub ack_id: AckId,
    pub delivery_attempt: u32,
}

impl ReceivedMessage {
    /// Ordering key, if one was set and is non-empty
    pub fn ordering_key(&self) -> Option<&str> {
        self.ordering_key.as_deref().filter(|key| !key.is_empty())
    }

    /// Check if the message has been delivered more than once
    pub fn is_redelivery(&self) -> bool {
        self.delivery_attempt > 1
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
