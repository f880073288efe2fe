//! Gmail API integration
//!
//! This module provides:
//! - An HTTP transport seam (ureq in production)
//! - OAuth2 access token refresh
//! - A Gmail API client that retries once after refreshing an expired token
//! - Response normalization and plain-text body extraction

mod auth;
mod client;
mod normalize;
pub mod transport;

pub use auth::{RefreshError, TokenRefresher};
pub use client::{ApiError, Delta, DeltaFetchError, GmailClient, MessageFetchError};
pub use normalize::{decode_base64, extract_plain_text, normalize_message};
pub use transport::{ApiRequest, Method, Transport, TransportError, UreqTransport};

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Response from users.history.list
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryResponse {
        pub history: Option<Vec<HistoryRecord>>,
        pub history_id: Option<String>,
        pub next_page_token: Option<String>,
    }

    /// A single history entry
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryRecord {
        pub id: Option<String>,
        pub messages_added: Option<Vec<HistoryMessageAdded>>,
    }

    /// A "message added" event
    #[derive(Debug, Deserialize)]
    pub struct HistoryMessageAdded {
        pub message: HistoryMessage,
    }

    /// Message reference inside a history event
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryMessage {
        pub id: String,
        pub label_ids: Option<Vec<String>>,
    }

    /// Full message from Gmail API (restricted by the `fields` parameter)
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        pub label_ids: Option<Vec<String>>,
        #[serde(default)]
        pub snippet: String,
        pub payload: Option<MessagePart>,
    }

    /// A node of the MIME part tree; the message payload is the root
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub mime_type: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Message body (base64url encoded when inline)
    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct MessageBody {
        pub size: Option<u32>,
        pub data: Option<String>,
    }

    /// Response from users.getProfile
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ProfileResponse {
        pub email_address: String,
        pub history_id: String,
    }

    /// Request body for users.watch
    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WatchRequest {
        pub topic_name: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pub label_ids: Vec<String>,
    }

    /// Response from users.watch
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WatchResponse {
        pub history_id: String,
        /// Expiration in epoch milliseconds
        pub expiration: Option<String>,
    }

    /// Token response from the identity provider
    #[derive(Debug, Deserialize)]
    pub struct TokenResponse {
        pub access_token: String,
        pub refresh_token: Option<String>,
        pub expires_in: Option<u64>,
    }
}
