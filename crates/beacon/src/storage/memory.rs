//! In-memory storage implementations
//!
//! Nothing survives a restart: after one, the first notification for a
//! mailbox bootstraps from its own historyId again.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::{CredentialStore, CursorStore};
use crate::models::SyncState;

#[derive(Debug, Default)]
struct TokenPair {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// In-memory implementation of CredentialStore
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    tokens: RwLock<TokenPair>,
}

impl InMemoryCredentialStore {
    /// Create an empty store (no credentials)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with a refresh token from the authorization handshake
    pub fn with_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            tokens: RwLock::new(TokenPair {
                access_token: None,
                refresh_token: Some(refresh_token.into()),
            }),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, TokenPair> {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, TokenPair> {
        self.tokens.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone()
    }

    fn set_access_token(&self, token: String) {
        self.write().access_token = Some(token);
    }

    fn set_refresh_token(&self, token: String) {
        self.write().refresh_token = Some(token);
    }

    fn invalidate_access_token(&self, token: &str) {
        let mut tokens = self.write();
        if tokens.access_token.as_deref() == Some(token) {
            tokens.access_token = None;
        }
    }

    fn clear(&self) {
        let mut tokens = self.write();
        tokens.access_token = None;
        tokens.refresh_token = None;
    }
}

/// In-memory implementation of CursorStore
///
/// Grows by one entry per mailbox ever seen.
#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    sync_states: RwLock<HashMap<String, SyncState>>,
}

impl InMemoryCursorStore {
    /// Create a new empty cursor store
    pub fn new() -> Self {
        Self::default()
    }
}

impl CursorStore for InMemoryCursorStore {
    fn get_sync_state(&self, mailbox: &str) -> Result<Option<SyncState>> {
        let states = self
            .sync_states
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(states.get(mailbox).cloned())
    }

    fn save_sync_state(&self, state: SyncState) -> Result<()> {
        let mut states = self
            .sync_states
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        states.insert(state.mailbox.clone(), state);
        Ok(())
    }

    fn list_sync_states(&self) -> Result<Vec<SyncState>> {
        let states = self
            .sync_states
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<SyncState> = states.values().cloned().collect();
        all.sort_by(|a, b| a.mailbox.cmp(&b.mailbox));
        Ok(all)
    }
}
