//! Durable log of check-in attempts performed on this device.
//!
//! Records are append-only: they are created in `Pending` state, transitioned
//! by the sync engine, and deleted only when the event's data is cleared.

use std::collections::BTreeSet;
use std::sync::Arc;
use chrono::Utc;
use tracing::{debug, info, warn};

use gatecheck_common::{
    AttendeeId, CheckinMethod, CheckinRecord, DeviceId, Error, EventId, RejectReason,
    RemoteCheckin, Result, SyncState,
};

use crate::kv::KeyValueStore;

fn checkin_key(event: &EventId, sequence: u64) -> String {
    // Zero-padded so key order equals sequence order.
    format!("checkin/{}/{:010}", event, sequence)
}

fn checkin_prefix(event: &EventId) -> String {
    format!("checkin/{}/", event)
}

fn remote_key(event: &EventId, attendee: &AttendeeId) -> String {
    format!("remote/{}/{}", event, attendee)
}

fn remote_prefix(event: &EventId) -> String {
    format!("remote/{}/", event)
}

fn sequence_key(event: &EventId) -> String {
    format!("seq/{}", event)
}

fn cursor_key(event: &EventId) -> String {
    format!("cursor/{}", event)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
}

/// Append-only check-in store for one `(event, device)` pair.
pub struct CheckinLog {
    store: Arc<dyn KeyValueStore>,
    event: EventId,
    device: DeviceId,
}

impl CheckinLog {
    /// Open the log for an event on this device.
    pub fn new(store: Arc<dyn KeyValueStore>, event: EventId, device: DeviceId) -> Self {
        Self {
            store,
            event,
            device,
        }
    }

    /// The event this log serves.
    pub fn event(&self) -> &EventId {
        &self.event
    }

    /// The device that owns this log.
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Record a new check-in attempt.
    ///
    /// Enforces the duplicate-prevention invariant: at most one record per
    /// attendee in `Pending` or `Synced` state, unless the method is
    /// `Override` (authorized re-admission, reason kept for audit).
    ///
    /// # Errors
    /// - `Duplicate` if the attendee already has an active check-in
    /// - Storage failure
    pub fn record(
        &self,
        attendee: &AttendeeId,
        method: CheckinMethod,
        override_reason: Option<String>,
    ) -> Result<CheckinRecord> {
        if method != CheckinMethod::Override && self.is_checked_in(attendee)? {
            return Err(Error::Duplicate(attendee.to_string()));
        }

        let sequence = self.next_sequence()?;
        let record = CheckinRecord {
            attendee: attendee.clone(),
            recorded_at: Utc::now(),
            method,
            device: self.device.clone(),
            sequence,
            state: SyncState::Pending,
            reject_reason: None,
            override_reason,
        };

        self.store
            .put(&checkin_key(&self.event, sequence), &encode(&record)?)?;

        debug!(attendee = %attendee, sequence, method = %method, "Check-in recorded");
        Ok(record)
    }

    /// Whether the attendee has an active check-in known to this device,
    /// locally recorded or learned from another device.
    pub fn is_checked_in(&self, attendee: &AttendeeId) -> Result<bool> {
        if self.active_checkin(attendee)?.is_some() {
            return Ok(true);
        }
        Ok(self
            .store
            .get(&remote_key(&self.event, attendee))?
            .is_some())
    }

    /// The attendee's active (`Pending` or `Synced`) local record, if any.
    pub fn active_checkin(&self, attendee: &AttendeeId) -> Result<Option<CheckinRecord>> {
        let records = self.all_records()?;
        Ok(records
            .into_iter()
            .filter(|r| &r.attendee == attendee && r.is_active())
            .min_by_key(|r| r.sequence))
    }

    /// All local records, ordered by sequence number.
    pub fn all_records(&self) -> Result<Vec<CheckinRecord>> {
        let entries = self.store.scan_prefix(&checkin_prefix(&self.event))?;
        let mut records = Vec::with_capacity(entries.len());
        for (_, bytes) in entries {
            records.push(decode(&bytes)?);
        }
        Ok(records)
    }

    /// Pending records, oldest first — the device's causal order.
    pub fn pending(&self) -> Result<Vec<CheckinRecord>> {
        Ok(self
            .all_records()?
            .into_iter()
            .filter(|r| r.state == SyncState::Pending)
            .collect())
    }

    /// Transition a record `Pending → Synced` after server acceptance.
    ///
    /// Idempotent: marking an already synced record is a no-op.
    ///
    /// # Errors
    /// - `Storage` if the record is missing or already rejected
    pub fn mark_synced(&self, sequence: u64) -> Result<()> {
        let mut record = self.record_at(sequence)?;
        match record.state {
            SyncState::Synced => return Ok(()),
            SyncState::Rejected => {
                return Err(Error::Storage(format!(
                    "record {} is rejected and cannot become synced",
                    sequence
                )));
            }
            SyncState::Pending => {}
        }

        record.state = SyncState::Synced;
        self.store
            .put(&checkin_key(&self.event, sequence), &encode(&record)?)?;
        debug!(sequence, "Check-in synced");
        Ok(())
    }

    /// Transition a record `Pending → Rejected` after a server conflict.
    ///
    /// Idempotent: re-rejecting keeps the original reason.
    ///
    /// # Errors
    /// - `Storage` if the record is missing or already synced
    pub fn mark_rejected(&self, sequence: u64, reason: RejectReason) -> Result<()> {
        let mut record = self.record_at(sequence)?;
        match record.state {
            SyncState::Rejected => return Ok(()),
            SyncState::Synced => {
                return Err(Error::Storage(format!(
                    "record {} is synced and cannot become rejected",
                    sequence
                )));
            }
            SyncState::Pending => {}
        }

        warn!(sequence, reason = %reason.describe(), "Check-in rejected by server");
        record.state = SyncState::Rejected;
        record.reject_reason = Some(reason);
        self.store
            .put(&checkin_key(&self.event, sequence), &encode(&record)?)?;
        Ok(())
    }

    /// Merge a check-in learned from another device.
    ///
    /// Own records coming back through the pull feed are skipped. Returns
    /// whether the entry added new knowledge.
    pub fn merge_remote(&self, remote: &RemoteCheckin) -> Result<bool> {
        if remote.device == self.device {
            return Ok(false);
        }

        let key = remote_key(&self.event, &remote.attendee);
        let known = self.store.get(&key)?.is_some();
        self.store.put(&key, &encode(remote)?)?;
        Ok(!known)
    }

    /// Check-ins learned from other devices.
    pub fn remote_checkins(&self) -> Result<Vec<RemoteCheckin>> {
        let entries = self.store.scan_prefix(&remote_prefix(&self.event))?;
        let mut remotes = Vec::with_capacity(entries.len());
        for (_, bytes) in entries {
            remotes.push(decode(&bytes)?);
        }
        Ok(remotes)
    }

    /// Distinct attendees with an active local record or known remote check-in.
    pub fn checked_in_attendees(&self) -> Result<BTreeSet<AttendeeId>> {
        let mut attendees: BTreeSet<AttendeeId> = self
            .all_records()?
            .into_iter()
            .filter(CheckinRecord::is_active)
            .map(|r| r.attendee)
            .collect();
        for remote in self.remote_checkins()? {
            attendees.insert(remote.attendee);
        }
        Ok(attendees)
    }

    /// High-water mark of the pull feed, 0 before the first pull.
    pub fn cursor(&self) -> Result<u64> {
        match self.store.get(&cursor_key(&self.event))? {
            Some(bytes) => decode(&bytes),
            None => Ok(0),
        }
    }

    /// Advance the pull cursor after a successful merge.
    pub fn set_cursor(&self, cursor: u64) -> Result<()> {
        self.store.put(&cursor_key(&self.event), &encode(&cursor)?)
    }

    /// Destroy all records, remote knowledge, the sequence counter and the
    /// cursor for this event. Other events in the same store are untouched.
    pub fn clear_event(&self) -> Result<()> {
        let removed = self.store.delete_prefix(&checkin_prefix(&self.event))?;
        self.store.delete_prefix(&remote_prefix(&self.event))?;
        self.store.delete(&sequence_key(&self.event))?;
        self.store.delete(&cursor_key(&self.event))?;
        info!(event = %self.event, records = removed, "Event data cleared");
        Ok(())
    }

    fn record_at(&self, sequence: u64) -> Result<CheckinRecord> {
        let bytes = self
            .store
            .get(&checkin_key(&self.event, sequence))?
            .ok_or_else(|| Error::NotFound(format!("check-in record {}", sequence)))?;
        decode(&bytes)
    }

    fn next_sequence(&self) -> Result<u64> {
        let key = sequence_key(&self.event);
        let current: u64 = match self.store.get(&key)? {
            Some(bytes) => decode(&bytes)?,
            None => 0,
        };
        let next = current + 1;
        self.store.put(&key, &encode(&next)?)?;
        Ok(next)
    }
}
