//! Message models produced while processing a notification

use serde::{Deserialize, Serialize};

use super::Placement;
use crate::gmail::api::MessagePart;

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message reported as added by a history delta
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSummary {
    pub id: MessageId,
    /// Labels at the time the history entry was recorded, if Gmail sent them
    pub label_ids: Option<Vec<String>>,
}

/// A fully resolved message
///
/// Holds the raw part tree from a single fetch; it is dropped once the
/// plain-text body has been extracted.
#[derive(Debug, Clone)]
pub struct FullMessage {
    pub id: MessageId,
    pub label_ids: Vec<String>,
    pub subject: String,
    pub snippet: String,
    pub payload: Option<MessagePart>,
}

/// A marker found in a message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub message_id: MessageId,
    pub subject: String,
    /// Prefix and identifier as they appear in the body
    pub marker: String,
    /// The validated identifier alone
    pub token: String,
    /// Full label set of the message
    pub label_ids: Vec<String>,
    pub placement: Placement,
    /// Configured flagged labels present on the message
    pub flagged_labels: Vec<String>,
}
