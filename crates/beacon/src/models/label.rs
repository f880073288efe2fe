//! Gmail label identifiers and delivery placement

use serde::{Deserialize, Serialize};

/// Unique identifier for a label (Gmail label ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelId(pub String);

impl LabelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Well-known Gmail system labels
    pub const INBOX: &'static str = "INBOX";
    pub const SPAM: &'static str = "SPAM";
    pub const TRASH: &'static str = "TRASH";
    pub const UNREAD: &'static str = "UNREAD";

    /// Prefix shared by the inbox category tabs (CATEGORY_PROMOTIONS, ...)
    pub const CATEGORY_PREFIX: &'static str = "CATEGORY_";
}

impl From<String> for LabelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LabelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Labels flagged on a match unless configured otherwise
pub const DEFAULT_FLAGGED_LABELS: &[&str] = &[
    "SPAM",
    "INBOX",
    "CATEGORY_PROMOTIONS",
    "CATEGORY_SOCIAL",
    "CATEGORY_UPDATES",
    "CATEGORY_FORUMS",
];

/// Where Gmail filed a message, derived from its label set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "category", rename_all = "snake_case")]
pub enum Placement {
    /// Filed as spam
    Spam,
    /// In the primary inbox
    Inbox,
    /// In an inbox category tab, e.g. "PROMOTIONS"
    Category(String),
    /// None of the above (archived, trashed, filtered away)
    Other,
}

impl Placement {
    /// Classify a label set.
    ///
    /// SPAM takes precedence over everything. A category label only counts
    /// as a tab placement for inbox messages other than CATEGORY_PERSONAL,
    /// which Gmail shows as the primary inbox.
    pub fn from_labels(labels: &[String]) -> Self {
        let has = |id: &str| labels.iter().any(|l| l == id);

        if has(LabelId::SPAM) {
            return Placement::Spam;
        }
        if !has(LabelId::INBOX) {
            return Placement::Other;
        }

        labels
            .iter()
            .filter_map(|l| l.strip_prefix(LabelId::CATEGORY_PREFIX))
            .find(|category| *category != "PERSONAL")
            .map(|category| Placement::Category(category.to_string()))
            .unwrap_or(Placement::Inbox)
    }

    pub fn is_spam(&self) -> bool {
        matches!(self, Placement::Spam)
    }
}

/// Return the configured flagged labels present on a message, in configured order
pub fn flagged_labels(labels: &[String], flagged: &[String]) -> Vec<String> {
    flagged
        .iter()
        .filter(|f| labels.iter().any(|l| l == *f))
        .cloned()
        .collect()
}
