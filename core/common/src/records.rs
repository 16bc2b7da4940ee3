//! Record types for the attendee roster and the check-in log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AttendeeId, CheckinMethod, DeviceId};

/// A registered attendee, cached locally at roster load time.
///
/// Immutable for the duration of the event; refreshed only by a full reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeeRecord {
    /// Stable unique identity.
    pub id: AttendeeId,
    /// Display name shown to door staff.
    pub display_name: String,
    /// Ticket or registration category.
    pub category: String,
}

/// Synchronization state of a locally recorded check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Recorded locally, not yet acknowledged by the server.
    Pending,
    /// Accepted by the server.
    Synced,
    /// Rejected by the server; terminal.
    Rejected,
}

/// Why the server rejected a check-in submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RejectReason {
    /// Another device admitted this attendee first.
    AlreadyCheckedIn {
        /// Device that holds the accepted check-in.
        device: DeviceId,
        /// Timestamp that device reported for its check-in.
        recorded_at: DateTime<Utc>,
    },
    /// The server does not know this attendee for this event.
    UnknownAttendee,
}

impl RejectReason {
    /// Human-readable summary for the door staff UI.
    pub fn describe(&self) -> String {
        match self {
            Self::AlreadyCheckedIn { device, recorded_at } => {
                format!("already checked in by {} at {}", device, recorded_at)
            }
            Self::UnknownAttendee => "attendee unknown to server".to_string(),
        }
    }
}

/// One check-in attempt recorded on this device.
///
/// Append-only: records are never overwritten in place. Only the sync engine
/// transitions `state`, and only `clear_event_data` deletes records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinRecord {
    /// Attendee this check-in admits (foreign reference, not owning).
    pub attendee: AttendeeId,
    /// Device-local wall-clock time of the attempt.
    pub recorded_at: DateTime<Utc>,
    /// How the check-in was performed.
    pub method: CheckinMethod,
    /// Device that recorded the attempt.
    pub device: DeviceId,
    /// Monotonically increasing device-local sequence number.
    pub sequence: u64,
    /// Current synchronization state.
    pub state: SyncState,
    /// Populated when `state` is `Rejected`.
    pub reject_reason: Option<RejectReason>,
    /// Mandatory justification for `Override` check-ins, kept for audit.
    pub override_reason: Option<String>,
}

impl CheckinRecord {
    /// Whether this record blocks another check-in for the same attendee.
    pub fn is_active(&self) -> bool {
        matches!(self.state, SyncState::Pending | SyncState::Synced)
    }
}

/// A check-in recorded by another device, learned through the pull phase.
///
/// Merged into local knowledge for statistics and duplicate prevention only;
/// never re-submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCheckin {
    /// Attendee the other device admitted.
    pub attendee: AttendeeId,
    /// Device that performed the check-in.
    pub device: DeviceId,
    /// How the check-in was performed.
    pub method: CheckinMethod,
    /// Timestamp that device reported.
    pub recorded_at: DateTime<Utc>,
    /// Server-assigned position in the event's change feed.
    pub cursor: u64,
}

/// Derived summary counts; never persisted as a source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventStats {
    /// Total attendees on the cached roster.
    pub total: usize,
    /// Distinct attendees with an active local record or known remote check-in.
    pub checked_in: usize,
    /// Attendees with no known check-in.
    pub no_shows: usize,
    /// Check-in rate as a percentage of the roster.
    pub rate: f64,
}

impl EventStats {
    /// Build stats from a roster size and a distinct checked-in count.
    pub fn from_counts(total: usize, checked_in: usize) -> Self {
        let no_shows = total.saturating_sub(checked_in);
        let rate = if total == 0 {
            0.0
        } else {
            (checked_in as f64 / total as f64) * 100.0
        };
        Self {
            total,
            checked_in,
            no_shows,
            rate,
        }
    }
}
