//! Cursor tracking for incremental Gmail sync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque Gmail historyId
///
/// Issued by Gmail and only ever compared for equality; never parsed or
/// ordered locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Cursor {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Cursor {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sync progress for one mailbox
///
/// Only one SyncState per mailbox. The cursor is the end cursor of the last
/// delta fetch that completed; it is replaced, never rolled back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Mailbox (Gmail user) identifier, normally the email address
    pub mailbox: String,
    /// Gmail historyId to resume from
    pub cursor: Cursor,
    /// When the cursor was last committed
    pub last_sync_at: DateTime<Utc>,
}

impl SyncState {
    pub fn new(mailbox: impl Into<String>, cursor: impl Into<Cursor>) -> Self {
        Self {
            mailbox: mailbox.into(),
            cursor: cursor.into(),
            last_sync_at: Utc::now(),
        }
    }

    /// Update with a new cursor after a successful delta fetch
    pub fn updated(mut self, cursor: impl Into<Cursor>) -> Self {
        self.cursor = cursor.into();
        self.last_sync_at = Utc::now();
        self
    }

    /// Check if this state is recent enough to be useful
    /// Gmail history IDs typically expire after about a week
    pub fn is_recent(&self) -> bool {
        let age = Utc::now() - self.last_sync_at;
        age.num_days() < 7
    }
}
