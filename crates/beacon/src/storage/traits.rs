//! Storage trait definitions

use crate::models::SyncState;
use anyhow::Result;

/// Holds the OAuth credential pair for the watched account
///
/// Implementations are shared between the refresher and the API client and
/// must be safe to use from several threads.
pub trait CredentialStore: Send + Sync {
    /// Current access token, if one is held
    fn access_token(&self) -> Option<String>;

    /// Current refresh token, if one is held
    fn refresh_token(&self) -> Option<String>;

    /// Replace the access token
    fn set_access_token(&self, token: String);

    /// Replace the refresh token
    fn set_refresh_token(&self, token: String);

    /// Drop the access token if it is still `token`
    ///
    /// Called when Gmail rejects `token`; a token stored concurrently by
    /// another refresh is left alone.
    fn invalidate_access_token(&self, token: &str);

    /// Drop both tokens
    fn clear(&self);
}

/// Maps mailbox identifiers to their last committed cursor
pub trait CursorStore: Send + Sync {
    /// Get sync state for a mailbox
    fn get_sync_state(&self, mailbox: &str) -> Result<Option<SyncState>>;

    /// Save sync state (upsert)
    fn save_sync_state(&self, state: SyncState) -> Result<()>;

    /// All known sync states, ordered by mailbox
    fn list_sync_states(&self) -> Result<Vec<SyncState>>;
}
