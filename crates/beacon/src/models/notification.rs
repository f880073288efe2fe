//! Gmail push notification as delivered by Pub/Sub

use serde::Deserialize;

use super::Cursor;
use crate::gmail::decode_base64;

/// Error decoding an inbound push envelope
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid push envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("message data is not valid base64")]
    Base64,

    #[error("invalid notification data: {0}")]
    Data(#[source] serde_json::Error),
}

/// Pub/Sub push envelope: `{ "message": { "data": "<base64>", ... } }`
#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PushMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushMessage {
    data: String,
    message_id: Option<String>,
}

/// Decoded `data` field: `{ "emailAddress": ..., "historyId": ... }`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushData {
    email_address: Option<String>,
    history_id: Option<HistoryIdValue>,
}

/// Gmail sends historyId as a JSON number; accept strings too
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryIdValue {
    Number(u64),
    Text(String),
}

impl From<HistoryIdValue> for Cursor {
    fn from(value: HistoryIdValue) -> Self {
        match value {
            HistoryIdValue::Number(n) => Cursor::new(n.to_string()),
            HistoryIdValue::Text(s) => Cursor::new(s),
        }
    }
}

/// A mailbox-change notification
///
/// Fields are optional as decoded; the handler validates them.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Mailbox that changed (the user's email address)
    pub mailbox: Option<String>,
    /// historyId carried by the notification
    pub cursor: Option<Cursor>,
    /// Pub/Sub message id, for log correlation of redeliveries
    pub delivery_id: Option<String>,
}

impl Notification {
    pub fn new(mailbox: impl Into<String>, cursor: impl Into<Cursor>) -> Self {
        Self {
            mailbox: Some(mailbox.into()),
            cursor: Some(cursor.into()),
            delivery_id: None,
        }
    }

    /// Decode a raw webhook body
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let envelope: PushEnvelope =
            serde_json::from_slice(payload).map_err(DecodeError::Envelope)?;

        let data = decode_base64(envelope.message.data.trim()).ok_or(DecodeError::Base64)?;
        let data: PushData = serde_json::from_slice(&data).map_err(DecodeError::Data)?;

        Ok(Self {
            mailbox: data.email_address.filter(|m| !m.trim().is_empty()),
            cursor: data.history_id.map(Cursor::from),
            delivery_id: envelope.message.message_id,
        })
    }
}
