//! Notification-driven incremental sync
//!
//! Replaying a notification is safe: the second run starts from the cursor
//! the first one committed.

mod locks;
mod notification;
mod report;

pub use locks::MailboxLocks;
pub use notification::{NotificationError, NotificationHandler};
pub use report::NotificationReport;
