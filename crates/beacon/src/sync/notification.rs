//! Push notification processing
//!
//! One notification runs decode, validate, cursor lookup, delta fetch,
//! per-message resolution and commit, in that order. Failures before the
//! per-message stage abort without touching the cursor table; per-message
//! failures are logged and skipped, except exhausted credentials, which
//! abort the notification before the commit.

use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError};
use std::time::Instant;

use super::locks::MailboxLocks;
use super::report::NotificationReport;
use crate::gmail::{ApiError, DeltaFetchError, GmailClient, MessageFetchError, extract_plain_text};
use crate::marker::MarkerExtractor;
use crate::models::{
    Cursor, DEFAULT_FLAGGED_LABELS, DecodeError, MatchRecord, MessageSummary, Notification,
    Placement, SyncState, flagged_labels,
};
use crate::storage::CursorStore;

/// Error that aborts a notification
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("failed to decode notification: {0}")]
    Decode(#[from] DecodeError),

    #[error("notification carries no mailbox")]
    MissingMailbox,

    #[error("no stored cursor for {0} and the notification carries no historyId")]
    MissingCursor(String),

    /// Credentials are exhausted; the account must be re-authorized
    #[error("credentials unavailable, re-authorization required: {0}")]
    Credential(#[source] ApiError),

    #[error(transparent)]
    DeltaFetch(DeltaFetchError),

    #[error("mailbox API call failed: {0}")]
    Api(#[source] ApiError),

    #[error("cursor store failed: {0}")]
    Store(#[from] anyhow::Error),
}

impl NotificationError {
    fn from_api(error: ApiError) -> Self {
        if error.is_credential_failure() {
            NotificationError::Credential(error)
        } else {
            NotificationError::Api(error)
        }
    }
}

impl From<DeltaFetchError> for NotificationError {
    fn from(error: DeltaFetchError) -> Self {
        match error {
            DeltaFetchError::Api(e) if e.is_credential_failure() => NotificationError::Credential(e),
            other => NotificationError::DeltaFetch(other),
        }
    }
}

/// Processes mailbox-change notifications
pub struct NotificationHandler {
    client: Arc<GmailClient>,
    cursors: Arc<dyn CursorStore>,
    locks: MailboxLocks,
    extractor: MarkerExtractor,
    flagged_labels: Vec<String>,
}

impl NotificationHandler {
    pub fn new(client: Arc<GmailClient>, cursors: Arc<dyn CursorStore>) -> Self {
        Self {
            client,
            cursors,
            locks: MailboxLocks::new(),
            extractor: MarkerExtractor::default(),
            flagged_labels: DEFAULT_FLAGGED_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_extractor(mut self, extractor: MarkerExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_flagged_labels(mut self, labels: Vec<String>) -> Self {
        self.flagged_labels = labels;
        self
    }

    pub fn cursors(&self) -> &Arc<dyn CursorStore> {
        &self.cursors
    }

    /// Decode a raw webhook body and process it
    pub fn handle_payload(&self, payload: &[u8]) -> Result<NotificationReport, NotificationError> {
        let notification = Notification::decode(payload)?;
        self.handle(notification)
    }

    /// Process a decoded notification
    ///
    /// The stored cursor wins over the notified one; the notified cursor is
    /// only a bootstrap for a mailbox seen for the first time. The end cursor
    /// is committed once every message was attempted. A message that fails
    /// is skipped, unless the failure is exhausted credentials: then the
    /// notification aborts and the cursor stays put.
    pub fn handle(&self, notification: Notification) -> Result<NotificationReport, NotificationError> {
        let started = Instant::now();
        let mailbox = notification.mailbox.ok_or(NotificationError::MissingMailbox)?;

        let lock = self.locks.get(&mailbox);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let stored = self.cursors.get_sync_state(&mailbox)?;
        let start_cursor = match (&stored, notification.cursor) {
            (Some(state), _) => state.cursor.clone(),
            (None, Some(notified)) => {
                debug!("No stored cursor for {}, starting from notified {}", mailbox, notified);
                notified
            }
            (None, None) => return Err(NotificationError::MissingCursor(mailbox)),
        };

        if let Some(state) = stored.as_ref().filter(|s| !s.is_recent()) {
            warn!(
                "Cursor {} for {} was last committed {}; Gmail may no longer accept it",
                state.cursor,
                mailbox,
                state.last_sync_at.to_rfc3339()
            );
        }

        let delta = self.client.fetch_delta(&mailbox, &start_cursor)?;

        let mut report = NotificationReport {
            mailbox: mailbox.clone(),
            delivery_id: notification.delivery_id,
            start_cursor,
            end_cursor: delta.end_cursor.clone(),
            messages_added: delta.added.len(),
            messages_resolved: 0,
            duplicates_skipped: 0,
            fetch_errors: 0,
            matches: Vec::new(),
            duration_ms: 0,
        };

        let mut seen = HashSet::new();
        for summary in &delta.added {
            if !seen.insert(&summary.id) {
                report.duplicates_skipped += 1;
                continue;
            }

            match self.process_message(&mailbox, summary) {
                Ok(found) => {
                    report.messages_resolved += 1;
                    report.matches.extend(found);
                }
                Err(e) if e.source.is_credential_failure() => {
                    error!("{}; leaving cursor at {}", e, report.start_cursor);
                    return Err(NotificationError::Credential(e.source));
                }
                Err(e) => {
                    warn!("{}", e);
                    report.fetch_errors += 1;
                }
            }
        }

        let state = match stored {
            Some(state) => state.updated(delta.end_cursor),
            None => SyncState::new(mailbox, delta.end_cursor),
        };
        self.cursors.save_sync_state(state)?;

        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        report.log();
        Ok(report)
    }

    /// Resolve one message and look for a marker in its plain-text body
    fn process_message(
        &self,
        mailbox: &str,
        summary: &MessageSummary,
    ) -> Result<Option<MatchRecord>, MessageFetchError> {
        let message = self.client.get_message(mailbox, &summary.id)?;

        let placement = Placement::from_labels(&message.label_ids);
        let flagged = flagged_labels(&message.label_ids, &self.flagged_labels);
        debug!(
            "Message {} placed {:?}, flagged labels {:?}",
            message.id, placement, flagged
        );

        let Some(text) = message.payload.as_ref().and_then(extract_plain_text) else {
            debug!("Message {} has no plain-text part", message.id);
            return Ok(None);
        };

        let Some(marker) = self.extractor.extract(&text) else {
            return Ok(None);
        };

        info!(
            "Marker {} in message {} placed {:?}",
            marker.text, message.id, placement
        );

        Ok(Some(MatchRecord {
            message_id: message.id,
            subject: message.subject,
            marker: marker.text,
            token: marker.token,
            label_ids: message.label_ids,
            placement,
            flagged_labels: flagged,
        }))
    }

    /// Reset a mailbox's cursor to its current historyId
    ///
    /// Operator action for a cursor that Gmail no longer accepts. Changes
    /// between the old cursor and now are skipped.
    pub fn resync(&self, mailbox: &str) -> Result<Cursor, NotificationError> {
        let lock = self.locks.get(mailbox);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let profile = self
            .client
            .get_profile(mailbox)
            .map_err(NotificationError::from_api)?;
        let cursor = Cursor::new(profile.history_id);

        let previous = self.cursors.get_sync_state(mailbox)?;
        let state = match previous {
            Some(state) => {
                warn!("Resyncing {} from {} to {}", mailbox, state.cursor, cursor);
                state.updated(cursor.clone())
            }
            None => {
                info!("Resyncing {} to {}", mailbox, cursor);
                SyncState::new(mailbox, cursor.clone())
            }
        };
        self.cursors.save_sync_state(state)?;

        Ok(cursor)
    }

    /// Store a bootstrap cursor for a mailbox that has none yet
    ///
    /// Returns false, leaving the table untouched, if a cursor exists.
    pub fn seed_cursor(&self, mailbox: &str, cursor: Cursor) -> Result<bool, NotificationError> {
        let lock = self.locks.get(mailbox);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if self.cursors.get_sync_state(mailbox)?.is_some() {
            return Ok(false);
        }
        self.cursors.save_sync_state(SyncState::new(mailbox, cursor))?;
        Ok(true)
    }
}
