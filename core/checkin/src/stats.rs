//! Derived event statistics.

use std::sync::Arc;

use gatecheck_common::{EventStats, Result};
use gatecheck_store::{AttendeeCache, CheckinLog};

/// Computes summary counts from the attendee cache and the check-in log.
///
/// Purely derived: nothing here is a source of truth, so the numbers can be
/// recomputed from the two stores at any time.
pub struct StatsAggregator {
    cache: Arc<AttendeeCache>,
    log: Arc<CheckinLog>,
}

impl StatsAggregator {
    /// Create the aggregator over a cache/log pair.
    pub fn new(cache: Arc<AttendeeCache>, log: Arc<CheckinLog>) -> Self {
        Self { cache, log }
    }

    /// Current stats.
    ///
    /// Checked-in counts distinct attendees with an active local record or a
    /// check-in learned from another device. No-show counts are only
    /// meaningful once the event has closed.
    pub fn compute(&self) -> Result<EventStats> {
        let total = self.cache.len();
        let checked_in = self.log.checked_in_attendees()?.len();
        Ok(EventStats::from_counts(total, checked_in))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gatecheck_common::{
        AttendeeId, AttendeeRecord, CheckinMethod, DeviceId, EventId, RejectReason, RemoteCheckin,
    };
    use gatecheck_store::{KeyValueStore, MemoryStore};

    fn aid(s: &str) -> AttendeeId {
        AttendeeId::new(s).unwrap()
    }

    fn attendee(id: &str) -> AttendeeRecord {
        AttendeeRecord {
            id: aid(id),
            display_name: id.to_string(),
            category: "general".to_string(),
        }
    }

    fn setup() -> (Arc<AttendeeCache>, Arc<CheckinLog>, StatsAggregator) {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let event = EventId::new("e1").unwrap();
        let cache = Arc::new(AttendeeCache::open(store.clone(), event.clone()).unwrap());
        cache
            .load(vec![attendee("a-1"), attendee("a-2"), attendee("a-3"), attendee("a-4")])
            .unwrap();
        let log = Arc::new(CheckinLog::new(
            store,
            event,
            DeviceId::new("d1").unwrap(),
        ));
        let stats = StatsAggregator::new(cache.clone(), log.clone());
        (cache, log, stats)
    }

    #[test]
    fn test_counts_local_and_remote() {
        let (_cache, log, stats) = setup();

        log.record(&aid("a-1"), CheckinMethod::Scan, None).unwrap();
        log.merge_remote(&RemoteCheckin {
            attendee: aid("a-2"),
            device: DeviceId::new("d2").unwrap(),
            method: CheckinMethod::Manual,
            recorded_at: Utc::now(),
            cursor: 1,
        })
        .unwrap();

        let computed = stats.compute().unwrap();
        assert_eq!(computed.total, 4);
        assert_eq!(computed.checked_in, 2);
        assert_eq!(computed.no_shows, 2);
        assert!((computed.rate - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rejected_records_do_not_count() {
        let (_cache, log, stats) = setup();

        let record = log.record(&aid("a-1"), CheckinMethod::Scan, None).unwrap();
        log.mark_rejected(record.sequence, RejectReason::UnknownAttendee)
            .unwrap();

        let computed = stats.compute().unwrap();
        assert_eq!(computed.checked_in, 0);
        assert_eq!(computed.no_shows, 4);
    }

    #[test]
    fn test_override_counts_once() {
        let (_cache, log, stats) = setup();

        log.record(&aid("a-1"), CheckinMethod::Scan, None).unwrap();
        log.record(&aid("a-1"), CheckinMethod::Override, Some("lost badge".to_string()))
            .unwrap();

        // Two records, one distinct attendee
        let computed = stats.compute().unwrap();
        assert_eq!(computed.checked_in, 1);
    }
}
