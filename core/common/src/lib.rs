//! Common types shared across GateCheck modules.
//!
//! This module provides foundational types that are used throughout the codebase,
//! ensuring consistency and type safety.

pub mod error;
pub mod records;
pub mod types;

pub use error::{Error, Result};
pub use records::{
    AttendeeRecord, CheckinRecord, EventStats, RejectReason, RemoteCheckin, SyncState,
};
pub use types::{AttendeeId, CheckinMethod, DeviceId, EventId};
