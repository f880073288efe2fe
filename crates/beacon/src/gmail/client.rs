//! Gmail API HTTP client
//!
//! Every call goes through [`GmailClient::call`], which attaches the current
//! access token and recovers from an expired one with a single refresh and a
//! single retry.

use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::api::{
    GmailMessage, HistoryResponse, ProfileResponse, WatchRequest, WatchResponse,
};
use super::auth::{RefreshError, TokenRefresher};
use super::normalize::normalize_message;
use super::transport::{ApiRequest, Transport, TransportError};
use crate::models::{Cursor, FullMessage, MessageId, MessageSummary};
use crate::storage::CredentialStore;

/// Error from a Gmail API call
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No access token was held and none could be obtained
    #[error("no credential available: {0}")]
    NoCredential(#[source] RefreshError),

    /// Gmail rejected the token and the refresh that followed failed
    #[error("credential refresh failed: {0}")]
    RefreshFailed(#[source] RefreshError),

    /// Gmail rejected the request even with a freshly refreshed token
    #[error("request unauthorized after credential refresh")]
    Unauthorized,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

impl ApiError {
    /// True when the credential subsystem is exhausted and re-authorization is needed
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            ApiError::NoCredential(_) | ApiError::RefreshFailed(_) | ApiError::Unauthorized
        )
    }

    /// HTTP status of a transport failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Transport(TransportError::Status(code)) => Some(*code),
            _ => None,
        }
    }
}

/// Error fetching a history delta
#[derive(Debug, thiserror::Error)]
pub enum DeltaFetchError {
    /// The start cursor is too old or unknown (404 from Gmail)
    #[error("history ID {0} expired or invalid")]
    HistoryExpired(Cursor),

    /// Gmail answered without a historyId to resume from
    #[error("history response carried no historyId")]
    MissingHistoryId,

    #[error("failed to fetch history: {0}")]
    Api(#[from] ApiError),
}

/// Error resolving a single message
#[derive(Debug, thiserror::Error)]
#[error("failed to fetch message {id}: {source}")]
pub struct MessageFetchError {
    pub id: MessageId,
    #[source]
    pub source: ApiError,
}

/// Messages added since a cursor
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    /// Added messages in the order Gmail listed them; may contain duplicates
    pub added: Vec<MessageSummary>,
    /// Cursor to commit once the delta has been processed
    pub end_cursor: Cursor,
}

/// Gmail API client
pub struct GmailClient {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    refresher: TokenRefresher,
    base_url: String,
}

impl GmailClient {
    /// Gmail API base URL
    pub const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// One initial attempt plus one retry after a refresh
    const MAX_ATTEMPTS: usize = 2;

    /// Fields requested when resolving a message
    const MESSAGE_FIELDS: &'static str = "id,labelIds,snippet,payload(mimeType,headers,body,parts)";

    /// Create a new Gmail client sharing the refresher's transport and credentials
    pub fn new(refresher: TokenRefresher, transport: Arc<dyn Transport>) -> Self {
        let credentials = refresher.credentials().clone();
        Self {
            transport,
            credentials,
            refresher,
            base_url: Self::BASE_URL.to_string(),
        }
    }

    /// Use a different API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn user_url(&self, mailbox: &str, path: &str) -> String {
        format!(
            "{}/users/{}/{}",
            self.base_url,
            urlencoding::encode(mailbox),
            path
        )
    }

    /// Issue an authorized request
    ///
    /// At most one token refresh and at most one retried request happen per
    /// call. A 401 invalidates the token that was used. Other failures are
    /// returned without touching credentials.
    pub fn call(&self, request: &ApiRequest) -> Result<String, ApiError> {
        let (mut access_token, mut refreshed) = match self.credentials.access_token() {
            Some(token) => (token, false),
            None => {
                debug!("No access token held, refreshing before request");
                let token = self.refresher.refresh().map_err(ApiError::NoCredential)?;
                (token, true)
            }
        };

        for attempt in 1..=Self::MAX_ATTEMPTS {
            match self.transport.send(request, &access_token) {
                Ok(body) => return Ok(body),
                Err(e) if e.is_unauthorized() => {
                    self.credentials.invalidate_access_token(&access_token);
                    if refreshed || attempt == Self::MAX_ATTEMPTS {
                        return Err(ApiError::Unauthorized);
                    }
                    warn!("Access token rejected for {}, refreshing", request.url);
                    access_token = self.refresher.refresh().map_err(ApiError::RefreshFailed)?;
                    refreshed = true;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ApiError::Unauthorized)
    }

    /// Issue an authorized request and parse the JSON response
    pub fn call_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let body = self.call(request)?;
        Ok(serde_json::from_str(&body)?)
    }

    // === History API ===

    /// List one page of messageAdded history since a cursor
    ///
    /// # Errors
    /// Returns `DeltaFetchError::HistoryExpired` if the cursor is too old (404 from Gmail)
    pub fn list_history(
        &self,
        mailbox: &str,
        start: &Cursor,
        page_token: Option<&str>,
    ) -> Result<HistoryResponse, DeltaFetchError> {
        let mut request = ApiRequest::get(self.user_url(mailbox, "history"))
            .query("startHistoryId", start.as_str())
            .query("historyTypes", "messageAdded");

        if let Some(token) = page_token {
            request = request.query("pageToken", token);
        }

        match self.call_json(&request) {
            Ok(history) => Ok(history),
            Err(e) if e.status() == Some(404) => Err(DeltaFetchError::HistoryExpired(start.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch every message added since a cursor
    ///
    /// Follows pagination to the end. Message ids are flattened in the order
    /// Gmail returns them and are not deduplicated. The end cursor is the
    /// historyId of the last page.
    pub fn fetch_delta(&self, mailbox: &str, start: &Cursor) -> Result<Delta, DeltaFetchError> {
        let mut added = Vec::new();
        let mut end_cursor = None;
        let mut page_token: Option<String> = None;

        loop {
            let response = self.list_history(mailbox, start, page_token.as_deref())?;

            for record in response.history.unwrap_or_default() {
                for event in record.messages_added.unwrap_or_default() {
                    added.push(MessageSummary {
                        id: MessageId::new(event.message.id),
                        label_ids: event.message.label_ids,
                    });
                }
            }

            if let Some(history_id) = response.history_id {
                end_cursor = Some(Cursor::new(history_id));
            }

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        let end_cursor = end_cursor.ok_or(DeltaFetchError::MissingHistoryId)?;
        debug!(
            "History for {} since {}: {} added, end cursor {}",
            mailbox,
            start,
            added.len(),
            end_cursor
        );

        Ok(Delta { added, end_cursor })
    }

    // === Messages API ===

    /// Get a message with its labels and part tree
    pub fn get_message(&self, mailbox: &str, id: &MessageId) -> Result<FullMessage, MessageFetchError> {
        let path = format!("messages/{}", urlencoding::encode(id.as_str()));
        let request = ApiRequest::get(self.user_url(mailbox, &path))
            .query("format", "full")
            .query("fields", Self::MESSAGE_FIELDS);

        self.call_json::<GmailMessage>(&request)
            .map(normalize_message)
            .map_err(|source| MessageFetchError {
                id: id.clone(),
                source,
            })
    }

    // === Profile and push registration ===

    /// Get the mailbox profile, including its current historyId
    pub fn get_profile(&self, mailbox: &str) -> Result<ProfileResponse, ApiError> {
        self.call_json(&ApiRequest::get(self.user_url(mailbox, "profile")))
    }

    /// Register (or renew) push notifications to a Pub/Sub topic
    pub fn watch(
        &self,
        mailbox: &str,
        topic_name: &str,
        label_ids: &[String],
    ) -> Result<WatchResponse, ApiError> {
        let body = serde_json::to_value(WatchRequest {
            topic_name: topic_name.to_string(),
            label_ids: label_ids.to_vec(),
        })?;

        self.call_json(&ApiRequest::post_json(self.user_url(mailbox, "watch"), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::transport::Method;
    use crate::storage::InMemoryCredentialStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted transport: API responses are popped in order, token
    /// responses likewise; every call is recorded.
    #[derive(Default)]
    struct Scripted {
        api: Mutex<VecDeque<Result<String, TransportError>>>,
        token: Mutex<VecDeque<Result<String, TransportError>>>,
        sent: Mutex<Vec<(ApiRequest, String)>>,
        refreshes: Mutex<usize>,
    }

    impl Scripted {
        fn api(self, response: Result<&str, TransportError>) -> Self {
            self.api.lock().unwrap().push_back(response.map(str::to_string));
            self
        }

        fn token(self, response: Result<&str, TransportError>) -> Self {
            self.token.lock().unwrap().push_back(response.map(str::to_string));
            self
        }

        fn sent(&self) -> Vec<(ApiRequest, String)> {
            self.sent.lock().unwrap().clone()
        }

        fn refreshes(&self) -> usize {
            *self.refreshes.lock().unwrap()
        }
    }

    impl Transport for Scripted {
        fn send(&self, request: &ApiRequest, access_token: &str) -> Result<String, TransportError> {
            self.sent
                .lock()
                .unwrap()
                .push((request.clone(), access_token.to_string()));
            self.api
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TransportError::Network("unscripted".into())))
        }

        fn post_form(&self, _: &str, _: &[(&str, &str)]) -> Result<String, TransportError> {
            *self.refreshes.lock().unwrap() += 1;
            self.token
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TransportError::Network("unscripted".into())))
        }
    }

    fn client(transport: &Arc<Scripted>, store: &Arc<InMemoryCredentialStore>) -> GmailClient {
        let refresher = TokenRefresher::new("id", "secret", transport.clone(), store.clone());
        GmailClient::new(refresher, transport.clone()).with_base_url("https://gmail.test/v1/")
    }

    fn store_with(access: Option<&str>, refresh: Option<&str>) -> Arc<InMemoryCredentialStore> {
        let store = InMemoryCredentialStore::new();
        if let Some(a) = access {
            store.set_access_token(a.into());
        }
        if let Some(r) = refresh {
            store.set_refresh_token(r.into());
        }
        Arc::new(store)
    }

    #[test]
    fn test_call_attaches_current_token() {
        let transport = Arc::new(Scripted::default().api(Ok("{}")));
        let store = store_with(Some("a1"), Some("r1"));

        let body = client(&transport, &store)
            .call(&ApiRequest::get("https://gmail.test/v1/x"))
            .unwrap();

        assert_eq!(body, "{}");
        assert_eq!(transport.sent()[0].1, "a1");
        assert_eq!(transport.refreshes(), 0);
    }

    #[test]
    fn test_expired_token_refreshes_and_retries_once() {
        let transport = Arc::new(
            Scripted::default()
                .api(Err(TransportError::Status(401)))
                .api(Ok(r#"{"ok":true}"#))
                .token(Ok(r#"{"access_token":"a2"}"#)),
        );
        let store = store_with(Some("a1"), Some("r1"));
        let request = ApiRequest::get("https://gmail.test/v1/x").query("k", "v");

        let body = client(&transport, &store).call(&request).unwrap();

        assert_eq!(body, r#"{"ok":true}"#);
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, sent[1].0);
        assert_eq!(sent[0].1, "a1");
        assert_eq!(sent[1].1, "a2");
        assert_eq!(transport.refreshes(), 1);
        assert_eq!(store.access_token().as_deref(), Some("a2"));
    }

    #[test]
    fn test_retry_rejected_again_stops() {
        let transport = Arc::new(
            Scripted::default()
                .api(Err(TransportError::Status(401)))
                .api(Err(TransportError::Status(401)))
                .api(Ok("{}"))
                .token(Ok(r#"{"access_token":"a2"}"#))
                .token(Ok(r#"{"access_token":"a3"}"#)),
        );
        let store = store_with(Some("a1"), Some("r1"));

        let err = client(&transport, &store)
            .call(&ApiRequest::get("https://gmail.test/v1/x"))
            .unwrap_err();

        assert!(matches!(err, ApiError::Unauthorized));
        assert_eq!(transport.sent().len(), 2);
        assert_eq!(transport.refreshes(), 1);
        assert_eq!(store.access_token(), None);
    }

    #[test]
    fn test_failed_refresh_after_401_propagates() {
        let transport = Arc::new(
            Scripted::default()
                .api(Err(TransportError::Status(401)))
                .token(Err(TransportError::Status(400))),
        );
        let store = store_with(Some("a1"), Some("r1"));

        let err = client(&transport, &store)
            .call(&ApiRequest::get("https://gmail.test/v1/x"))
            .unwrap_err();

        assert!(matches!(err, ApiError::RefreshFailed(RefreshError::RefreshFailed(_))));
        assert!(err.is_credential_failure());
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(store.refresh_token(), None);
    }

    #[test]
    fn test_no_credentials_fails_before_any_request() {
        let transport = Arc::new(Scripted::default().api(Ok("{}")));
        let store = store_with(None, None);

        let err = client(&transport, &store)
            .call(&ApiRequest::get("https://gmail.test/v1/x"))
            .unwrap_err();

        assert!(matches!(err, ApiError::NoCredential(RefreshError::NoRefreshCredential)));
        assert!(transport.sent().is_empty());
        assert_eq!(transport.refreshes(), 0);
    }

    #[test]
    fn test_initial_refresh_counts_as_the_only_refresh() {
        let transport = Arc::new(
            Scripted::default()
                .api(Err(TransportError::Status(401)))
                .token(Ok(r#"{"access_token":"a1"}"#))
                .token(Ok(r#"{"access_token":"a2"}"#)),
        );
        let store = store_with(None, Some("r1"));

        let err = client(&transport, &store)
            .call(&ApiRequest::get("https://gmail.test/v1/x"))
            .unwrap_err();

        assert!(matches!(err, ApiError::Unauthorized));
        assert_eq!(transport.refreshes(), 1);
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn test_non_auth_failure_does_not_refresh() {
        let transport = Arc::new(Scripted::default().api(Err(TransportError::Status(500))));
        let store = store_with(Some("a1"), Some("r1"));

        let err = client(&transport, &store)
            .call(&ApiRequest::get("https://gmail.test/v1/x"))
            .unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert!(!err.is_credential_failure());
        assert_eq!(transport.refreshes(), 0);
        assert_eq!(store.access_token().as_deref(), Some("a1"));
    }

    #[test]
    fn test_fetch_delta_flattens_pages_in_order() {
        let transport = Arc::new(
            Scripted::default()
                .api(Ok(r#"{
                    "history": [
                        {"id": "101", "messagesAdded": [{"message": {"id": "m1", "labelIds": ["INBOX"]}}]},
                        {"id": "102"},
                        {"id": "103", "messagesAdded": [{"message": {"id": "m2"}}, {"message": {"id": "m1"}}]}
                    ],
                    "historyId": "103",
                    "nextPageToken": "p2"
                }"#))
                .api(Ok(r#"{
                    "history": [{"id": "104", "messagesAdded": [{"message": {"id": "m3"}}]}],
                    "historyId": "105"
                }"#)),
        );
        let store = store_with(Some("a1"), None);

        let delta = client(&transport, &store)
            .fetch_delta("user@x.com", &Cursor::new("100"))
            .unwrap();

        let ids: Vec<&str> = delta.added.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m1", "m3"]);
        assert_eq!(delta.added[0].label_ids, Some(vec!["INBOX".to_string()]));
        assert_eq!(delta.end_cursor, Cursor::new("105"));

        let sent = transport.sent();
        assert_eq!(sent[0].0.url, "https://gmail.test/v1/users/user%40x.com/history");
        assert_eq!(sent[0].0.query_value("startHistoryId"), Some("100"));
        assert_eq!(sent[0].0.query_value("historyTypes"), Some("messageAdded"));
        assert_eq!(sent[0].0.query_value("pageToken"), None);
        assert_eq!(sent[1].0.query_value("pageToken"), Some("p2"));
        assert_eq!(sent[1].0.query_value("startHistoryId"), Some("100"));
    }

    #[test]
    fn test_fetch_delta_without_changes() {
        let transport = Arc::new(Scripted::default().api(Ok(r#"{"historyId": "200"}"#)));
        let store = store_with(Some("a1"), None);

        let delta = client(&transport, &store)
            .fetch_delta("me", &Cursor::new("200"))
            .unwrap();

        assert!(delta.added.is_empty());
        assert_eq!(delta.end_cursor, Cursor::new("200"));
    }

    #[test]
    fn test_fetch_delta_expired_cursor() {
        let transport = Arc::new(Scripted::default().api(Err(TransportError::Status(404))));
        let store = store_with(Some("a1"), None);

        let err = client(&transport, &store)
            .fetch_delta("me", &Cursor::new("1"))
            .unwrap_err();

        assert!(matches!(err, DeltaFetchError::HistoryExpired(ref c) if c.as_str() == "1"));
    }

    #[test]
    fn test_fetch_delta_requires_history_id() {
        let transport = Arc::new(Scripted::default().api(Ok(r#"{"history": []}"#)));
        let store = store_with(Some("a1"), None);

        let err = client(&transport, &store)
            .fetch_delta("me", &Cursor::new("1"))
            .unwrap_err();

        assert!(matches!(err, DeltaFetchError::MissingHistoryId));
    }

    #[test]
    fn test_get_message_restricts_fields() {
        let transport = Arc::new(Scripted::default().api(Ok(r#"{
            "id": "m1",
            "labelIds": ["SPAM"],
            "snippet": "hi",
            "payload": {"mimeType": "text/plain", "headers": [{"name": "Subject", "value": "check"}], "body": {"size": 2, "data": "aGk"}}
        }"#)));
        let store = store_with(Some("a1"), None);

        let message = client(&transport, &store)
            .get_message("me", &MessageId::new("m1"))
            .unwrap();

        assert_eq!(message.subject, "check");
        assert_eq!(message.label_ids, vec!["SPAM".to_string()]);

        let (request, _) = &transport.sent()[0];
        assert_eq!(request.url, "https://gmail.test/v1/users/me/messages/m1");
        assert!(request.query_value("fields").unwrap().contains("labelIds"));
    }

    #[test]
    fn test_get_message_error_carries_id() {
        let transport = Arc::new(Scripted::default().api(Err(TransportError::Status(404))));
        let store = store_with(Some("a1"), None);

        let err = client(&transport, &store)
            .get_message("me", &MessageId::new("gone"))
            .unwrap_err();

        assert_eq!(err.id.as_str(), "gone");
        assert_eq!(err.source.status(), Some(404));
    }

    #[test]
    fn test_watch_posts_topic() {
        let transport = Arc::new(
            Scripted::default().api(Ok(r#"{"historyId": "777", "expiration": "1700000000000"}"#)),
        );
        let store = store_with(Some("a1"), None);

        let response = client(&transport, &store)
            .watch("me", "projects/p/topics/t", &["INBOX".to_string()])
            .unwrap();

        assert_eq!(response.history_id, "777");
        let (request, _) = &transport.sent()[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(
            request.json_body,
            Some(serde_json::json!({"topicName": "projects/p/topics/t", "labelIds": ["INBOX"]}))
        );
    }
}
