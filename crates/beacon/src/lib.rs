//! Beacon - Gmail push-notification consumer
//!
//! This crate turns mailbox-change notifications into deliverability reports:
//! - Gmail API client with single-retry credential refresh
//! - Incremental history sync driven by a per-mailbox cursor
//! - Plain-text body extraction and marker token matching
//! - Storage trait abstractions for credentials and cursors
//!
//! All network I/O is blocking; async callers run the handler on a blocking
//! thread.

pub mod config;
pub mod gmail;
pub mod marker;
pub mod models;
pub mod storage;
pub mod sync;

pub use config::{BeaconConfig, GmailCredentials};
pub use gmail::{
    ApiError, DeltaFetchError, GmailClient, MessageFetchError, RefreshError, TokenRefresher,
    Transport, TransportError, UreqTransport, api::ProfileResponse,
};
pub use marker::{Marker, MarkerExtractor};
pub use models::{Cursor, LabelId, MatchRecord, MessageId, Notification, Placement, SyncState};
pub use storage::{CredentialStore, CursorStore, InMemoryCredentialStore, InMemoryCursorStore};
pub use sync::{MailboxLocks, NotificationError, NotificationHandler, NotificationReport};
