//! Domain models for notification processing

mod label;
mod message;
mod notification;
mod sync_state;

pub use label::{DEFAULT_FLAGGED_LABELS, LabelId, Placement, flagged_labels};
pub use message::{FullMessage, MatchRecord, MessageId, MessageSummary};
pub use notification::{DecodeError, Notification};
pub use sync_state::{Cursor, SyncState};
