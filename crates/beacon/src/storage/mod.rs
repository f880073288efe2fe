//! Storage traits and implementations
//!
//! Credentials and cursors are injected into the client and handler through
//! these traits instead of living in process globals.

mod memory;
mod traits;

pub use memory::{InMemoryCredentialStore, InMemoryCursorStore};
pub use traits::{CredentialStore, CursorStore};
