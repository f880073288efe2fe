//! Deliverability marker extraction
//!
//! A marker is a fixed prefix immediately followed by a UUID-shaped token,
//! e.g. `spam-test-1a2b3c4d-1a2b-1a2b-1a2b-1a2b3c4d5e6f`.

use log::info;
use regex::Regex;
use std::sync::LazyLock;

/// Prefix used unless configured otherwise
pub const DEFAULT_PREFIX: &str = "spam-test-";

/// Canonical 8-4-4-4-12 hex identifier, case-insensitive
static TOKEN_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("token pattern is valid")
});

/// A validated marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    /// Prefix and token together, as found in the text
    pub text: String,
    /// The identifier after the prefix
    pub token: String,
}

/// Finds the first marker in a message body
#[derive(Debug, Clone)]
pub struct MarkerExtractor {
    prefix: String,
}

impl Default for MarkerExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl MarkerExtractor {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Extract the marker following the first occurrence of the prefix
    ///
    /// The candidate token runs up to the first whitespace, `,` or `.`.
    /// Later occurrences of the prefix are never considered, even when the
    /// first one carries a malformed token.
    pub fn extract(&self, text: &str) -> Option<Marker> {
        let start = text.find(&self.prefix)? + self.prefix.len();
        let rest = &text[start..];

        let end = rest
            .find(|c: char| c.is_whitespace() || c == ',' || c == '.')
            .unwrap_or(rest.len());
        let candidate = &rest[..end];

        if !TOKEN_SHAPE.is_match(candidate) {
            info!(
                "Prefix {:?} found, malformed token {:?}",
                self.prefix,
                truncate(candidate, 64)
            );
            return None;
        }

        Some(Marker {
            text: format!("{}{}", self.prefix, candidate),
            token: candidate.to_string(),
        })
    }
}

/// Shorten a string for logging without splitting a character
fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
