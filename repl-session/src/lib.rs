#![doc = include_str!("../README.md")]

pub mod entry;
pub mod layout;
pub mod store;

pub use entry::{EntryDraft, EntryMessage, EntryMetadata, EntryType, SessionEntry};
pub use layout::Layout;
pub use store::{SessionStore, SessionSummary, SessionTarget};
