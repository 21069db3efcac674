//! Push envelope produced from a received message.
//!
//! The JSON shape matches what a push subscription POSTs to its endpoint:
//!
//! ```json
//! {
//!   "message": {
//!     "attributes": {"k": "v"},
//!     "data": "aGVsbG8=",
//!     "messageId": "m1",
//!     "orderingKey": "key",
//!     "publishTime": "2024-01-01T00:00:00Z"
//!   },
//!   "subscription": "projects/p/subscriptions/s"
//! }
//! ```
//!
//! `orderingKey` is omitted when the message has none.

use crate::config::BridgeConfig;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pubsub_runtime::ReceivedMessage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body POSTed to the push endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    pub subscription: String,
}

/// Message part of the push envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Sorted so the serialized body is stable
    pub attributes: BTreeMap<String, String>,
    /// Base64 (standard alphabet, padded) of the payload bytes
    pub data: String,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordering_key: Option<String>,
    pub publish_time: String,
}

impl PushEnvelope {
    /// Build the envelope for `message`; the subscription path comes from `config`
    pub fn from_message(message: &ReceivedMessage, config: &BridgeConfig) -> Self {
        Self {
            message: PushMessage {
                attributes: message
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                data: STANDARD.encode(&message.data),
                message_id: message.message_id.to_string(),
                ordering_key: message.ordering_key().map(str::to_string),
                publish_time: message.publish_time.to_rfc3339(),
            },
            subscription: config.subscription_name().path(),
        }
    }

    /// Decode the payload back into bytes
    pub fn decode_data(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.message.data)
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
