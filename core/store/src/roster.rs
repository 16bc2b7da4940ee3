//! Local attendee cache, loaded in bulk before the event starts.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use gatecheck_common::{AttendeeId, AttendeeRecord, Error, EventId, Result};

use crate::kv::KeyValueStore;

/// Default bound on search results.
pub const DEFAULT_SEARCH_LIMIT: usize = 25;

fn roster_key(event: &EventId) -> String {
    format!("roster/{}", event)
}

/// Local mapping of attendee identity to registration metadata.
///
/// The persisted roster is a single value per event, so a load replaces it
/// atomically: a failed load leaves the previous roster untouched and the
/// cache is never half-populated across event identities.
pub struct AttendeeCache {
    store: Arc<dyn KeyValueStore>,
    event: EventId,
    index: RwLock<HashMap<AttendeeId, AttendeeRecord>>,
}

impl AttendeeCache {
    /// Open the cache for an event, restoring any previously loaded roster.
    ///
    /// # Errors
    /// - Storage or deserialization failure
    pub fn open(store: Arc<dyn KeyValueStore>, event: EventId) -> Result<Self> {
        let index = match store.get(&roster_key(&event))? {
            Some(bytes) => {
                let roster: Vec<AttendeeRecord> = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                roster.into_iter().map(|r| (r.id.clone(), r)).collect()
            }
            None => HashMap::new(),
        };

        debug!(event = %event, attendees = index.len(), "Attendee cache opened");
        Ok(Self {
            store,
            event,
            index: RwLock::new(index),
        })
    }

    /// Replace the cached roster with a freshly fetched one.
    ///
    /// All-or-nothing: the roster is persisted first, and the in-memory index
    /// is rebuilt only after the write succeeds.
    ///
    /// # Errors
    /// - Storage or serialization failure; the previous roster stays intact
    pub fn load(&self, roster: Vec<AttendeeRecord>) -> Result<usize> {
        let bytes =
            serde_json::to_vec(&roster).map_err(|e| Error::Serialization(e.to_string()))?;
        self.store.put(&roster_key(&self.event), &bytes)?;

        let count = roster.len();
        let mut index = self.index.write().unwrap();
        *index = roster.into_iter().map(|r| (r.id.clone(), r)).collect();

        info!(event = %self.event, attendees = count, "Roster loaded");
        Ok(count)
    }

    /// Look up an attendee by id.
    pub fn lookup(&self, id: &AttendeeId) -> Option<AttendeeRecord> {
        self.index.read().unwrap().get(id).cloned()
    }

    /// Case-insensitive substring search over name and identifier.
    ///
    /// Results are sorted by display name for stable output and bounded to
    /// `limit` entries.
    pub fn search(&self, query: &str, limit: usize) -> Vec<AttendeeRecord> {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let index = self.index.read().unwrap();
        let mut matches: Vec<AttendeeRecord> = index
            .values()
            .filter(|r| {
                r.display_name.to_lowercase().contains(&needle)
                    || r.id.as_str().to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();

        matches.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(limit);
        matches
    }

    /// Number of attendees on the cached roster.
    pub fn len(&self) -> usize {
        self.index.read().unwrap().len()
    }

    /// Whether the cache is empty (no roster loaded yet).
    pub fn is_empty(&self) -> bool {
        self.index.read().unwrap().is_empty()
    }

    /// The event this cache serves.
    pub fn event(&self) -> &EventId {
        &self.event
    }

    /// Destroy the cached roster for this event.
    pub fn clear(&self) -> Result<()> {
        self.store.delete(&roster_key(&self.event))?;
        self.index.write().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    fn attendee(id: &str, name: &str) -> AttendeeRecord {
        AttendeeRecord {
            id: AttendeeId::new(id).unwrap(),
            display_name: name.to_string(),
            category: "general".to_string(),
        }
    }

    fn cache() -> AttendeeCache {
        AttendeeCache::open(
            Arc::new(MemoryStore::new()),
            EventId::new("e1").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_load_and_lookup() {
        let cache = cache();
        let count = cache
            .load(vec![attendee("a-1", "Ada Lovelace"), attendee("a-2", "Alan Turing")])
            .unwrap();

        assert_eq!(count, 2);
        let rec = cache.lookup(&AttendeeId::new("a-1").unwrap()).unwrap();
        assert_eq!(rec.display_name, "Ada Lovelace");
        assert!(cache.lookup(&AttendeeId::new("nope").unwrap()).is_none());
    }

    #[test]
    fn test_reload_replaces_roster() {
        let cache = cache();
        cache.load(vec![attendee("a-1", "Ada Lovelace")]).unwrap();
        cache.load(vec![attendee("a-2", "Alan Turing")]).unwrap();

        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(&AttendeeId::new("a-1").unwrap()).is_none());
    }

    #[test]
    fn test_search_case_insensitive_and_bounded() {
        let cache = cache();
        cache
            .load(vec![
                attendee("a-1", "Ada Lovelace"),
                attendee("a-2", "Alan Turing"),
                attendee("b-1", "Grace Hopper"),
            ])
            .unwrap();

        let hits = cache.search("ADA", DEFAULT_SEARCH_LIMIT);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].display_name, "Ada Lovelace");

        // Matches on identifier too
        let hits = cache.search("b-1", DEFAULT_SEARCH_LIMIT);
        assert_eq!(hits.len(), 1);

        let bounded = cache.search("a", 2);
        assert_eq!(bounded.len(), 2);

        assert!(cache.search("", DEFAULT_SEARCH_LIMIT).is_empty());
    }

    #[test]
    fn test_roster_survives_reopen() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let event = EventId::new("e1").unwrap();

        {
            let cache = AttendeeCache::open(store.clone(), event.clone()).unwrap();
            cache.load(vec![attendee("a-1", "Ada Lovelace")]).unwrap();
        }

        let cache = AttendeeCache::open(store, event).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear() {
        let cache = cache();
        cache.load(vec![attendee("a-1", "Ada Lovelace")]).unwrap();
        cache.clear().unwrap();
        assert!(cache.is_empty());
    }
}
