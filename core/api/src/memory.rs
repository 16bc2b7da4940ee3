//! In-memory server for testing.
//!
//! Implements the authoritative conflict contract in-process: the first
//! submission received for an attendee wins, every later one from another
//! device gets a conflict. An online/offline toggle injects transient
//! failures for partition tests.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use gatecheck_common::{
    AttendeeId, AttendeeRecord, CheckinMethod, DeviceId, Error, EventId, RemoteCheckin, Result,
};

use crate::server::{CheckinSubmission, ConflictReason, RemotePage, ServerApi, SubmitOutcome};

/// The accepted check-in for an attendee.
#[derive(Debug, Clone)]
struct Admission {
    device: DeviceId,
    recorded_at: DateTime<Utc>,
}

#[derive(Default)]
struct EventState {
    roster: HashMap<AttendeeId, AttendeeRecord>,
    /// First accepted check-in per attendee; final once recorded.
    winners: HashMap<AttendeeId, Admission>,
    /// Outcome per `(device, sequence)`, replayed on resubmission.
    ledger: HashMap<(DeviceId, u64), SubmitOutcome>,
    /// Change feed in acceptance order.
    feed: Vec<RemoteCheckin>,
    next_cursor: u64,
}

/// In-memory server endpoint.
///
/// All state is lost on drop.
pub struct MemoryServer {
    events: RwLock<HashMap<EventId, EventState>>,
    online: AtomicBool,
}

impl MemoryServer {
    /// Create a new server with no events, reachable.
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            online: AtomicBool::new(true),
        }
    }

    /// Register an event's roster.
    pub fn seed_roster(&self, event: &EventId, roster: Vec<AttendeeRecord>) {
        let mut events = self.events.write().unwrap();
        let state = events.entry(event.clone()).or_default();
        state.roster = roster.into_iter().map(|r| (r.id.clone(), r)).collect();
    }

    /// Toggle reachability; while offline every call fails transiently.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of admissions recorded for an event.
    pub fn admission_count(&self, event: &EventId) -> usize {
        self.events
            .read()
            .unwrap()
            .get(event)
            .map_or(0, |s| s.winners.len())
    }

    /// Total change-feed entries for an event.
    pub fn feed_len(&self, event: &EventId) -> usize {
        self.events
            .read()
            .unwrap()
            .get(event)
            .map_or(0, |s| s.feed.len())
    }

    fn check_online(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Transient("server unreachable".to_string()))
        }
    }
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServerApi for MemoryServer {
    fn name(&self) -> &str {
        "memory"
    }

    async fn submit_checkin(
        &self,
        event: &EventId,
        submission: &CheckinSubmission,
    ) -> Result<SubmitOutcome> {
        self.check_online()?;

        let mut events = self.events.write().unwrap();
        let state = events.entry(event.clone()).or_default();

        let ledger_key = (submission.device.clone(), submission.sequence);
        if let Some(outcome) = state.ledger.get(&ledger_key) {
            // Idempotent replay: same verdict, no second admission.
            return Ok(outcome.clone());
        }

        let outcome = if !state.roster.contains_key(&submission.attendee) {
            SubmitOutcome::Conflict {
                reason: ConflictReason::UnknownAttendee,
            }
        } else if submission.method != CheckinMethod::Override {
            match state.winners.get(&submission.attendee) {
                Some(winner) => SubmitOutcome::Conflict {
                    reason: ConflictReason::AlreadyCheckedIn {
                        device: winner.device.clone(),
                        recorded_at: winner.recorded_at,
                    },
                },
                None => {
                    admit(state, submission);
                    SubmitOutcome::Accepted
                }
            }
        } else {
            // Overrides are authorized re-admissions: always accepted and
            // fed to other devices, but they never displace the winner.
            if !state.winners.contains_key(&submission.attendee) {
                state.winners.insert(
                    submission.attendee.clone(),
                    Admission {
                        device: submission.device.clone(),
                        recorded_at: submission.recorded_at,
                    },
                );
            }
            push_feed(state, submission);
            SubmitOutcome::Accepted
        };

        state.ledger.insert(ledger_key, outcome.clone());
        Ok(outcome)
    }

    async fn checkins_since(&self, event: &EventId, cursor: u64) -> Result<RemotePage> {
        self.check_online()?;

        let events = self.events.read().unwrap();
        let Some(state) = events.get(event) else {
            return Ok(RemotePage {
                checkins: Vec::new(),
                cursor,
            });
        };

        let checkins: Vec<RemoteCheckin> = state
            .feed
            .iter()
            .filter(|c| c.cursor > cursor)
            .cloned()
            .collect();
        let cursor = checkins.last().map_or(cursor, |c| c.cursor);

        Ok(RemotePage { checkins, cursor })
    }

    async fn fetch_roster(&self, event: &EventId) -> Result<Vec<AttendeeRecord>> {
        self.check_online()?;

        let events = self.events.read().unwrap();
        let state = events
            .get(event)
            .ok_or_else(|| Error::NotFound(format!("event {}", event)))?;

        let mut roster: Vec<AttendeeRecord> = state.roster.values().cloned().collect();
        roster.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(roster)
    }
}

fn admit(state: &mut EventState, submission: &CheckinSubmission) {
    state.winners.insert(
        submission.attendee.clone(),
        Admission {
            device: submission.device.clone(),
            recorded_at: submission.recorded_at,
        },
    );
    push_feed(state, submission);
}

fn push_feed(state: &mut EventState, submission: &CheckinSubmission) {
    state.next_cursor += 1;
    state.feed.push(RemoteCheckin {
        attendee: submission.attendee.clone(),
        device: submission.device.clone(),
        method: submission.method,
        recorded_at: submission.recorded_at,
        cursor: state.next_cursor,
    });
}
