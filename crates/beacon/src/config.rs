//! Configuration loading for the beacon service
//!
//! Credentials are loaded from (in order of priority):
//! 1. JSON file (Google Cloud Console format plus a `refresh_token` field)
//! 2. Runtime environment variables (fallback)
//!
//! Service settings come from `beacon.json` when present, then each field
//! may be overridden by a `BEACON_*` environment variable.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::gmail::{GmailClient, TokenRefresher, UreqTransport};
use crate::marker::DEFAULT_PREFIX;
use crate::models::DEFAULT_FLAGGED_LABELS;

/// Credentials filename in the beacon config directory
const CREDENTIALS_FILE: &str = "google-credentials.json";

/// Service settings filename in the beacon config directory
pub const CONFIG_FILE: &str = "beacon.json";

/// OAuth credentials for Gmail API access
///
/// The refresh token is the product of the initial authorization handshake,
/// which happens outside this service.
#[derive(Debug, Clone)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub access_token: Option<String>,
}

/// Google Cloud Console credential file format, extended with tokens
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<InstalledCredentials>,
    web: Option<InstalledCredentials>,
    refresh_token: Option<String>,
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,
}

impl GmailCredentials {
    /// Load credentials using the following priority:
    /// 1. JSON file (~/.config/beacon/google-credentials.json)
    /// 2. Runtime environment variables
    pub fn load() -> Result<Self> {
        if config::config_exists(CREDENTIALS_FILE) {
            let creds: GoogleCredentialFile = config::load_json(CREDENTIALS_FILE)?;
            return Self::from_credential_file(creds);
        }

        Self::from_env()
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let creds: GoogleCredentialFile = config::load_json_file(path)?;
        Self::from_credential_file(creds)
    }

    fn from_credential_file(creds: GoogleCredentialFile) -> Result<Self> {
        // Support both "installed" (desktop) and "web" credential types
        let installed = creds
            .installed
            .or(creds.web)
            .context("Credentials file missing 'installed' or 'web' section")?;

        // A refresh token kept out of the file may still come from the environment
        let refresh_token = creds
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| config::env_var("GMAIL_REFRESH_TOKEN"))
            .context("Credentials file has no 'refresh_token' and GMAIL_REFRESH_TOKEN is not set")?;

        Ok(Self {
            client_id: installed.client_id,
            client_secret: installed.client_secret,
            refresh_token,
            access_token: creds
                .access_token
                .filter(|t| !t.is_empty())
                .or_else(|| config::env_var("GMAIL_ACCESS_TOKEN")),
        })
    }

    /// Parse credentials from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: GoogleCredentialFile =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        Self::from_credential_file(creds)
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        let client_id = config::env_var("GMAIL_CLIENT_ID")
            .context("GMAIL_CLIENT_ID environment variable not set")?;
        let client_secret = config::env_var("GMAIL_CLIENT_SECRET")
            .context("GMAIL_CLIENT_SECRET environment variable not set")?;
        let refresh_token = config::env_var("GMAIL_REFRESH_TOKEN")
            .context("GMAIL_REFRESH_TOKEN environment variable not set")?;

        Ok(Self {
            client_id,
            client_secret,
            refresh_token,
            access_token: config::env_var("GMAIL_ACCESS_TOKEN"),
        })
    }

    /// Get the default credentials file path (~/.config/beacon/google-credentials.json)
    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }
}

/// Service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    /// Address the webhook server listens on
    pub bind: String,
    /// Path Pub/Sub pushes to
    pub webhook_path: String,
    /// Literal that introduces a marker token in a message body
    pub marker_prefix: String,
    /// Labels reported on a match when present on the message
    pub flagged_labels: Vec<String>,
    pub api_base_url: String,
    pub token_url: String,
    /// Global timeout for each outbound HTTP call
    pub http_timeout_secs: u64,
    /// Pub/Sub topic to register with `users.watch` at startup
    pub pubsub_topic: Option<String>,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            webhook_path: "/webhook".to_string(),
            marker_prefix: DEFAULT_PREFIX.to_string(),
            flagged_labels: DEFAULT_FLAGGED_LABELS.iter().map(|s| s.to_string()).collect(),
            api_base_url: GmailClient::BASE_URL.to_string(),
            token_url: TokenRefresher::TOKEN_URL.to_string(),
            http_timeout_secs: UreqTransport::DEFAULT_TIMEOUT.as_secs(),
            pubsub_topic: None,
        }
    }
}

impl BeaconConfig {
    /// Load settings from `path`, else from `beacon.json` in the config
    /// directory if it exists, else defaults; then apply environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config: Self = match path {
            Some(path) => config::load_json_file(path)?,
            None if config::config_exists(CONFIG_FILE) => config::load_json(CONFIG_FILE)?,
            None => Self::default(),
        };

        config.apply_overrides(config::env_var)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `BEACON_*` variables resolved through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(bind) = lookup("BEACON_BIND") {
            self.bind = bind;
        }
        if let Some(path) = lookup("BEACON_WEBHOOK_PATH") {
            self.webhook_path = path;
        }
        if let Some(prefix) = lookup("BEACON_MARKER_PREFIX") {
            self.marker_prefix = prefix;
        }
        if let Some(labels) = lookup("BEACON_FLAGGED_LABELS") {
            self.flagged_labels = labels
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(url) = lookup("BEACON_API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(url) = lookup("BEACON_TOKEN_URL") {
            self.token_url = url;
        }
        if let Some(secs) = lookup("BEACON_HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = secs
                .parse()
                .with_context(|| format!("BEACON_HTTP_TIMEOUT_SECS is not a number: {secs:?}"))?;
        }
        if let Some(topic) = lookup("BEACON_PUBSUB_TOPIC") {
            self.pubsub_topic = Some(topic);
        }
        Ok(())
    }

    /// Check settings that would otherwise fail late
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;

        if !self.webhook_path.starts_with('/') {
            bail!("webhook_path must start with '/': {:?}", self.webhook_path);
        }
        if self.marker_prefix.is_empty() {
            bail!("marker_prefix must not be empty");
        }
        if self.http_timeout_secs == 0 {
            bail!("http_timeout_secs must be positive");
        }

        for (name, value) in [("api_base_url", &self.api_base_url), ("token_url", &self.token_url)] {
            let url = Url::parse(value).with_context(|| format!("Invalid {name}: {value:?}"))?;
            if !matches!(url.scheme(), "http" | "https") {
                bail!("{name} must be an http(s) URL: {value:?}");
            }
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .with_context(|| format!("Invalid bind address: {:?}", self.bind))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
