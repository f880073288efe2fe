//! Structured outcome of one processed notification

use log::{info, warn};
use serde::Serialize;

use crate::models::{Cursor, MatchRecord};

/// Statistics and matches from processing one notification
#[derive(Debug, Clone, Serialize)]
pub struct NotificationReport {
    pub mailbox: String,
    /// Pub/Sub message id of the delivery, if present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
    /// Cursor the delta was fetched from
    pub start_cursor: Cursor,
    /// Cursor committed after processing
    pub end_cursor: Cursor,
    /// Number of added-message entries in the delta
    pub messages_added: usize,
    /// Number of messages fetched successfully
    pub messages_resolved: usize,
    /// Repeated ids within the delta that were not fetched again
    pub duplicates_skipped: usize,
    /// Number of messages that could not be fetched
    pub fetch_errors: usize,
    /// Markers found, in delta order
    pub matches: Vec<MatchRecord>,
    /// Duration of the processing
    pub duration_ms: u64,
}

impl NotificationReport {
    /// Emit the report as a single JSON log record
    pub fn log(&self) {
        match serde_json::to_string(self) {
            Ok(json) => info!("Notification processed: {}", json),
            Err(e) => warn!(
                "Notification processed for {} ({} matches); report not serializable: {}",
                self.mailbox,
                self.matches.len(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageId, Placement};

    #[test]
    fn test_report_serialization() {
        let report = NotificationReport {
            mailbox: "user@x.com".to_string(),
            delivery_id: None,
            start_cursor: Cursor::new("1"),
            end_cursor: Cursor::new("2"),
            messages_added: 1,
            messages_resolved: 1,
            duplicates_skipped: 0,
            fetch_errors: 0,
            matches: vec![MatchRecord {
                message_id: MessageId::new("m1"),
                subject: "delivery check".to_string(),
                marker: "spam-test-x".to_string(),
                token: "x".to_string(),
                label_ids: vec!["SPAM".to_string()],
                placement: Placement::Spam,
                flagged_labels: vec!["SPAM".to_string()],
            }],
            duration_ms: 3,
        };

        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mailbox"], "user@x.com");
        assert_eq!(json["end_cursor"], "2");
        assert!(json.get("delivery_id").is_none());
        assert_eq!(json["matches"][0]["token"], "x");
        assert_eq!(json["matches"][0]["placement"]["kind"], "spam");
    }
}
