//! Conflict interpretation.
//!
//! The server is the arbiter of who admitted an attendee first: the earliest
//! submission it received wins, and every other device's attempt for the same
//! attendee is terminally rejected. Device timestamps ride along for audit
//! but never decide the winner, since device clocks are not synchronized.

use gatecheck_api::ConflictReason;
use gatecheck_common::RejectReason;

/// Translate a server conflict verdict into the local rejection reason
/// persisted on the record.
pub fn reject_reason(conflict: ConflictReason) -> RejectReason {
    match conflict {
        ConflictReason::AlreadyCheckedIn {
            device,
            recorded_at,
        } => RejectReason::AlreadyCheckedIn {
            device,
            recorded_at,
        },
        ConflictReason::UnknownAttendee => RejectReason::UnknownAttendee,
    }
}
