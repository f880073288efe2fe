//! Gmail OAuth2 access token refresh
//!
//! The authorization code flow happens elsewhere; this side only holds the
//! resulting refresh token and exchanges it for access tokens on demand.

use log::{debug, info, warn};
use std::sync::{Arc, Mutex, PoisonError};

use super::api::TokenResponse;
use super::transport::Transport;
use crate::storage::CredentialStore;

/// Error refreshing an access token
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// No refresh token is held; nothing was sent
    #[error("no refresh token available, re-authorization required")]
    NoRefreshCredential,

    /// The exchange failed and stored credentials were cleared
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
}

/// Exchanges the stored refresh token for new access tokens
pub struct TokenRefresher {
    client_id: String,
    client_secret: String,
    token_url: String,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    /// Serializes exchanges so a rotated refresh token is never raced
    exchange_lock: Mutex<()>,
}

impl TokenRefresher {
    /// Google OAuth2 token endpoint
    pub const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    const GRANT_TYPE: &'static str = "refresh_token";

    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: Self::TOKEN_URL.to_string(),
            transport,
            credentials,
            exchange_lock: Mutex::new(()),
        }
    }

    /// Use a different token endpoint
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// The credential store this refresher updates
    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Refresh the access token
    ///
    /// On success the new access token is stored, and the refresh token is
    /// replaced if the provider rotated it. On any failure both tokens are
    /// cleared so the account must be re-authorized.
    pub fn refresh(&self) -> Result<String, RefreshError> {
        let _guard = self
            .exchange_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(refresh_token) = self.credentials.refresh_token() else {
            warn!("Cannot refresh access token: no refresh token held");
            return Err(RefreshError::NoRefreshCredential);
        };

        match self.exchange(&refresh_token) {
            Ok(token) => {
                self.credentials.set_access_token(token.access_token.clone());
                if let Some(rotated) = token.refresh_token {
                    debug!("Identity provider rotated the refresh token");
                    self.credentials.set_refresh_token(rotated);
                }
                info!(
                    "Refreshed access token (expires in {}s)",
                    token.expires_in.map_or_else(|| "?".to_string(), |s| s.to_string())
                );
                Ok(token.access_token)
            }
            Err(reason) => {
                warn!("Access token refresh failed, clearing credentials: {}", reason);
                self.credentials.clear();
                Err(RefreshError::RefreshFailed(reason))
            }
        }
    }

    fn exchange(&self, refresh_token: &str) -> Result<TokenResponse, String> {
        let body = self
            .transport
            .post_form(
                &self.token_url,
                &[
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("refresh_token", refresh_token),
                    ("grant_type", Self::GRANT_TYPE),
                ],
            )
            .map_err(|e| e.to_string())?;

        serde_json::from_str(&body).map_err(|e| format!("invalid token response: {}", e))
    }
}
