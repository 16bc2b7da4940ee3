//! Server endpoint trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatecheck_common::{
    AttendeeId, AttendeeRecord, CheckinMethod, DeviceId, EventId, RemoteCheckin, Result,
};

/// One check-in submitted to the server.
///
/// `(device, sequence)` identifies the submission: resubmitting the same pair
/// is a no-op server-side, so retries after a lost response are safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinSubmission {
    /// Attendee being admitted.
    pub attendee: AttendeeId,
    /// How the check-in was performed.
    pub method: CheckinMethod,
    /// Device-reported timestamp of the attempt (audit data, not an
    /// ordering key — device clocks are not trusted).
    pub recorded_at: DateTime<Utc>,
    /// Submitting device.
    pub device: DeviceId,
    /// Device-local sequence number.
    pub sequence: u64,
    /// Operator justification for override check-ins.
    pub override_reason: Option<String>,
}

/// Why the server refused a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ConflictReason {
    /// Another device's check-in for this attendee was accepted first.
    AlreadyCheckedIn {
        /// Device holding the accepted check-in.
        device: DeviceId,
        /// Timestamp that device reported.
        recorded_at: DateTime<Utc>,
    },
    /// The attendee is not on the server's roster for this event.
    UnknownAttendee,
}

/// Server verdict on a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SubmitOutcome {
    /// Check-in accepted and recorded.
    Accepted,
    /// Check-in refused; terminal for this record.
    Conflict {
        /// Why the submission cannot stand.
        reason: ConflictReason,
    },
}

/// One page of the event's change feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePage {
    /// Check-ins recorded since the requested cursor, any device.
    pub checkins: Vec<RemoteCheckin>,
    /// New high-water mark to store after merging this page.
    pub cursor: u64,
}

/// Check-in server endpoint.
///
/// Implementations must answer deterministically: the server is the arbiter
/// of which device admitted an attendee first.
#[async_trait]
pub trait ServerApi: Send + Sync {
    /// Implementation name (e.g. "http", "memory").
    fn name(&self) -> &str;

    /// Submit one check-in.
    ///
    /// # Postconditions
    /// - Resubmission of an already-processed `(device, sequence)` pair
    ///   returns the original outcome without recording a second admission
    ///
    /// # Errors
    /// - `Transient` when the server cannot be reached; safe to retry
    async fn submit_checkin(
        &self,
        event: &EventId,
        submission: &CheckinSubmission,
    ) -> Result<SubmitOutcome>;

    /// Check-ins recorded by any device since the given cursor.
    ///
    /// # Errors
    /// - `Transient` when the server cannot be reached
    async fn checkins_since(&self, event: &EventId, cursor: u64) -> Result<RemotePage>;

    /// Full attendee roster for an event.
    ///
    /// # Errors
    /// - `NotFound` for an unknown event
    /// - `Transient` when the server cannot be reached
    async fn fetch_roster(&self, event: &EventId) -> Result<Vec<AttendeeRecord>>;
}
