//! HTTP transport for Gmail and the identity provider
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic. The [`Transport`]
//! trait is the seam the client is written against, so the refresh and
//! retry logic can be driven without a network.

use std::time::Duration;

/// HTTP method of an API request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A fully described Gmail API request
///
/// The bearer token is not part of the request; it is attached per attempt
/// so a retry after refresh reissues exactly the same request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub json_body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            json_body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            query: Vec::new(),
            json_body: Some(body),
        }
    }

    /// Append a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Look up the first value of a query parameter
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Transport-level failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The server answered with a non-success status
    #[error("HTTP status {0}")]
    Status(u16),

    /// Connection, TLS, timeout or body read failure
    #[error("network error: {0}")]
    Network(String),
}

impl TransportError {
    /// True for the authorization failure that triggers a token refresh
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TransportError::Status(401))
    }
}

/// Blocking HTTP transport
pub trait Transport: Send + Sync {
    /// Send an API request with a bearer token, returning the response body
    fn send(&self, request: &ApiRequest, access_token: &str) -> Result<String, TransportError>;

    /// POST an urlencoded form without authorization, returning the response body
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String, TransportError>;
}

/// Production transport backed by a ureq agent
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// Default timeout applied to every request
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();

        Self {
            agent: config.into(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

fn map_error(error: ureq::Error) -> TransportError {
    match error {
        ureq::Error::StatusCode(code) => TransportError::Status(code),
        other => TransportError::Network(other.to_string()),
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &ApiRequest, access_token: &str) -> Result<String, TransportError> {
        let authorization = format!("Bearer {}", access_token);

        let result = match request.method {
            Method::Get => {
                let mut builder = self
                    .agent
                    .get(&request.url)
                    .header("Authorization", &authorization);
                for (key, value) in &request.query {
                    builder = builder.query(key, value);
                }
                builder.call()
            }
            Method::Post => {
                let mut builder = self
                    .agent
                    .post(&request.url)
                    .header("Authorization", &authorization);
                for (key, value) in &request.query {
                    builder = builder.query(key, value);
                }
                match &request.json_body {
                    Some(body) => builder.send_json(body),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(map_error)?;
        response.body_mut().read_to_string().map_err(map_error)
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String, TransportError> {
        let mut response = self
            .agent
            .post(url)
            .send_form(form.iter().copied())
            .map_err(map_error)?;

        response.body_mut().read_to_string().map_err(map_error)
    }
}
