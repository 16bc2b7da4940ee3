//! Door-side check-in operations.
//!
//! All operations run synchronously against local storage; the network is
//! never on the happy path. Server submission happens later, in the sync
//! engine.

use std::sync::Arc;
use tracing::{debug, info, warn};

use gatecheck_common::{
    AttendeeId, AttendeeRecord, CheckinMethod, CheckinRecord, Error, Result,
};
use gatecheck_store::{AttendeeCache, CheckinLog};

/// URI scheme accepted in QR payloads.
const QR_SCHEME: &str = "gatecheck:";

/// Outcome of a scan or manual check-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckinOutcome {
    /// Attendee admitted; a pending record was created.
    Admitted(CheckinRecord),
    /// Attendee already has an active check-in; nothing was created.
    ///
    /// `existing` is the local record when this device holds one; a
    /// duplicate learned from another device carries no local record.
    Duplicate { existing: Option<CheckinRecord> },
    /// Attendee id is not on the cached roster (bad or foreign code).
    Unknown { attendee: AttendeeId },
}

/// Decode the attendee id embedded in a QR payload.
///
/// Accepts a bare id or a `gatecheck:` URI.
///
/// # Errors
/// - `Validation` for empty or malformed payloads
pub fn parse_qr_payload(payload: &str) -> Result<AttendeeId> {
    let trimmed = payload.trim();
    let id = trimmed.strip_prefix(QR_SCHEME).unwrap_or(trimmed);

    if id.is_empty() || id.chars().any(char::is_whitespace) {
        return Err(Error::Validation(format!(
            "malformed QR payload: {:?}",
            payload
        )));
    }

    AttendeeId::new(id)
}

/// Request-handling surface for door staff.
pub struct CheckinOperations {
    cache: Arc<AttendeeCache>,
    log: Arc<CheckinLog>,
    search_limit: usize,
}

impl CheckinOperations {
    /// Create the operations handler.
    pub fn new(cache: Arc<AttendeeCache>, log: Arc<CheckinLog>, search_limit: usize) -> Self {
        Self {
            cache,
            log,
            search_limit,
        }
    }

    /// Admit an attendee from a scanned QR payload.
    ///
    /// Idempotent at the operation layer: scanning an already-admitted
    /// attendee reports a duplicate and creates no record.
    ///
    /// # Errors
    /// - `Validation` for a malformed payload
    /// - Storage failure
    pub fn scan(&self, qr_payload: &str) -> Result<CheckinOutcome> {
        let attendee = parse_qr_payload(qr_payload)?;
        self.admit(&attendee, CheckinMethod::Scan)
    }

    /// Admit an attendee found by manual lookup.
    ///
    /// # Errors
    /// - Storage failure
    pub fn manual_checkin(&self, attendee: &AttendeeId) -> Result<CheckinOutcome> {
        self.admit(attendee, CheckinMethod::Manual)
    }

    /// Re-admit an attendee past the duplicate check.
    ///
    /// The escape hatch for real-world discrepancies (lost wristband, a
    /// conflicting record from another device). Always recorded with the
    /// operator's justification.
    ///
    /// # Errors
    /// - `Validation` if the reason is empty
    /// - `NotFound` if the attendee is not on the cached roster
    /// - Storage failure
    pub fn emergency_override(
        &self,
        attendee: &AttendeeId,
        reason: &str,
    ) -> Result<CheckinRecord> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::Validation(
                "override reason must not be empty".to_string(),
            ));
        }

        if self.cache.lookup(attendee).is_none() {
            return Err(Error::NotFound(attendee.to_string()));
        }

        let record =
            self.log
                .record(attendee, CheckinMethod::Override, Some(reason.to_string()))?;

        warn!(
            attendee = %attendee,
            device = %self.log.device(),
            reason,
            "Emergency override admitted"
        );
        Ok(record)
    }

    /// Search the cached roster.
    pub fn search(&self, query: &str) -> Vec<AttendeeRecord> {
        self.cache.search(query, self.search_limit)
    }

    fn admit(&self, attendee: &AttendeeId, method: CheckinMethod) -> Result<CheckinOutcome> {
        let Some(_record) = self.cache.lookup(attendee) else {
            debug!(attendee = %attendee, "Attendee not on cached roster");
            return Ok(CheckinOutcome::Unknown {
                attendee: attendee.clone(),
            });
        };

        if self.log.is_checked_in(attendee)? {
            debug!(attendee = %attendee, "Duplicate check-in refused");
            return Ok(CheckinOutcome::Duplicate {
                existing: self.log.active_checkin(attendee)?,
            });
        }

        let record = self.log.record(attendee, method, None)?;
        info!(
            attendee = %attendee,
            method = %method,
            sequence = record.sequence,
            "Attendee admitted"
        );
        Ok(CheckinOutcome::Admitted(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatecheck_common::{DeviceId, EventId};
    use gatecheck_store::{KeyValueStore, MemoryStore, DEFAULT_SEARCH_LIMIT};

    fn aid(s: &str) -> AttendeeId {
        AttendeeId::new(s).unwrap()
    }

    fn attendee(id: &str, name: &str) -> AttendeeRecord {
        AttendeeRecord {
            id: aid(id),
            display_name: name.to_string(),
            category: "general".to_string(),
        }
    }

    fn ops() -> CheckinOperations {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let event = EventId::new("e1").unwrap();
        let cache = Arc::new(AttendeeCache::open(store.clone(), event.clone()).unwrap());
        cache
            .load(vec![
                attendee("a-1", "Ada Lovelace"),
                attendee("a-2", "Alan Turing"),
            ])
            .unwrap();
        let log = Arc::new(CheckinLog::new(
            store,
            event,
            DeviceId::new("d1").unwrap(),
        ));
        CheckinOperations::new(cache, log, DEFAULT_SEARCH_LIMIT)
    }

    #[test]
    fn test_parse_qr_payload() {
        assert_eq!(parse_qr_payload("a-1").unwrap(), aid("a-1"));
        assert_eq!(parse_qr_payload("gatecheck:a-1").unwrap(), aid("a-1"));
        assert_eq!(parse_qr_payload("  a-1 \n").unwrap(), aid("a-1"));

        assert!(parse_qr_payload("").is_err());
        assert!(parse_qr_payload("gatecheck:").is_err());
        assert!(parse_qr_payload("two words").is_err());
    }

    #[test]
    fn test_scan_then_duplicate() {
        let ops = ops();

        let first = ops.scan("gatecheck:a-1").unwrap();
        let record = match first {
            CheckinOutcome::Admitted(record) => record,
            other => panic!("expected admission, got {:?}", other),
        };
        assert_eq!(record.method, CheckinMethod::Scan);

        // Second scan and a manual attempt both report the duplicate
        match ops.scan("a-1").unwrap() {
            CheckinOutcome::Duplicate { existing } => {
                assert_eq!(existing.unwrap().sequence, record.sequence);
            }
            other => panic!("expected duplicate, got {:?}", other),
        }
        assert!(matches!(
            ops.manual_checkin(&aid("a-1")).unwrap(),
            CheckinOutcome::Duplicate { .. }
        ));
    }

    #[test]
    fn test_scan_unknown_attendee() {
        let ops = ops();
        match ops.scan("ghost").unwrap() {
            CheckinOutcome::Unknown { attendee } => assert_eq!(attendee.as_str(), "ghost"),
            other => panic!("expected unknown, got {:?}", other),
        }
    }

    #[test]
    fn test_override_requires_reason() {
        let ops = ops();
        ops.scan("a-1").unwrap();

        let err = ops.emergency_override(&aid("a-1"), "   ").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let record = ops.emergency_override(&aid("a-1"), "lost wristband").unwrap();
        assert_eq!(record.method, CheckinMethod::Override);
        assert_eq!(record.override_reason.as_deref(), Some("lost wristband"));
    }

    #[test]
    fn test_override_unknown_attendee() {
        let ops = ops();
        let err = ops.emergency_override(&aid("ghost"), "vip walk-in").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_search_delegates_to_cache() {
        let ops = ops();
        let hits = ops.search("turing");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "a-2");
    }
}
