//! Per-mailbox mutual exclusion
//!
//! Overlapping notifications for one mailbox must not interleave their
//! fetch-then-commit sequences, or the later commit could overwrite a
//! cursor that covered more history.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Lazily created lock per mailbox identifier
#[derive(Debug, Default)]
pub struct MailboxLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MailboxLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock for a mailbox, creating it on first use
    pub fn get(&self, mailbox: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(mailbox.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of mailboxes seen so far
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
