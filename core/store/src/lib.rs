//! GateCheck on-device storage.
//!
//! Everything a device persists — the attendee roster, the check-in log,
//! remote check-in knowledge and the sync cursor — goes through the
//! [`KeyValueStore`] interface. Two backends are provided: an in-memory store
//! for tests and a SQLite store for real devices.

pub mod kv;
pub mod log;
pub mod roster;
pub mod sqlite;

pub use kv::{KeyValueStore, MemoryStore};
pub use log::CheckinLog;
pub use roster::{AttendeeCache, DEFAULT_SEARCH_LIMIT};
pub use sqlite::SqliteStore;
