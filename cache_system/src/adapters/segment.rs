//! In-process shared memory segment
//!
//! A segment is a concurrent map living for the whole process. Handles are
//! cheap to clone and every clone sees the same entries, so several adapters
//! with different namespaces can share one segment the way separate pools
//! share one shared-memory region.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use config::DEFAULT_SEGMENT;

static SEGMENTS: LazyLock<DashMap<String, SharedSegment>> = LazyLock::new(DashMap::new);

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: Value, ttl: u64) -> Self {
        let expires_at = match ttl {
            0 => None,
            // Far-future deadlines that overflow Instant simply never expire
            seconds => Instant::now().checked_add(Duration::from_secs(seconds)),
        };
        Self { value, expires_at }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

struct SegmentInner {
    name: String,
    slots: DashMap<String, Slot>,
    max_entries: Option<usize>,
}

/// Handle to a process-wide key/value segment with per-entry expiry
#[derive(Clone)]
pub struct SharedSegment {
    inner: Arc<SegmentInner>,
}

impl Debug for SharedSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSegment")
            .field("name", &self.inner.name)
            .field("entries", &self.inner.slots.len())
            .field("max_entries", &self.inner.max_entries)
            .finish()
    }
}

impl SharedSegment {
    /// Create a private segment not registered under any name
    pub fn new(max_entries: Option<usize>) -> Self {
        Self::build("anonymous", max_entries)
    }

    fn build(name: &str, max_entries: Option<usize>) -> Self {
        Self {
            inner: Arc::new(SegmentInner {
                name: name.to_string(),
                slots: DashMap::new(),
                max_entries,
            }),
        }
    }

    /// The process-wide default segment, at whatever capacity it was created with
    pub fn global() -> Self {
        SEGMENTS
            .entry(DEFAULT_SEGMENT.to_string())
            .or_insert_with(|| Self::build(DEFAULT_SEGMENT, None))
            .clone()
    }

    /// Look up a named segment, creating it on first use.
    /// The capacity of a segment is fixed by whoever creates it; asking for
    /// a different one later keeps the original and logs a warning.
    pub fn named(name: &str, max_entries: Option<usize>) -> Self {
        let segment = SEGMENTS
            .entry(name.to_string())
            .or_insert_with(|| Self::build(name, max_entries))
            .clone();

        if segment.max_entries() != max_entries {
            tracing::warn!(
                segment = name,
                requested = ?max_entries,
                kept = ?segment.max_entries(),
                "shared memory segment already exists with a different capacity"
            );
        }
        segment
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.inner.max_entries
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Entries currently held, expired ones included until they are purged
    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }

    /// Value stored under `key`; `None` means not found
    pub fn fetch(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        // The read guard must be released before an expired slot is removed
        let found = self.inner.slots.get(key).map(|slot| {
            if slot.is_expired(now) {
                None
            } else {
                Some(slot.value.clone())
            }
        });

        match found {
            Some(Some(value)) => Some(value),
            Some(None) => {
                self.inner.slots.remove_if(key, |_, slot| slot.is_expired(now));
                None
            }
            None => None,
        }
    }

    /// Values of the keys that were found; missing keys are simply absent
    pub fn fetch_many(&self, keys: &[String]) -> HashMap<String, Value> {
        keys.iter()
            .filter_map(|key| self.fetch(key).map(|value| (key.clone(), value)))
            .collect()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.fetch(key).is_some()
    }

    /// Store a value; fails only when the segment is full
    pub fn store(&self, key: String, value: Value, ttl: u64) -> bool {
        if !self.has_room_for(&key) {
            return false;
        }
        self.inner.slots.insert(key, Slot::new(value, ttl));
        true
    }

    /// Store every entry, returning the keys that could not be stored
    pub fn store_many(&self, entries: Vec<(String, Value)>, ttl: u64) -> Vec<String> {
        let mut failed = Vec::new();
        for (key, value) in entries {
            if !self.has_room_for(&key) {
                failed.push(key);
                continue;
            }
            self.inner.slots.insert(key, Slot::new(value, ttl));
        }
        failed
    }

    /// Remove a live entry; false when there was none
    pub fn remove(&self, key: &str) -> bool {
        let now = Instant::now();
        self.inner
            .slots
            .remove(key)
            .is_some_and(|(_, slot)| !slot.is_expired(now))
    }

    /// Remove every listed key, returning how many live entries went away
    pub fn remove_many(&self, keys: &[String]) -> usize {
        keys.iter().filter(|key| self.remove(key)).count()
    }

    /// Drop every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.slots.len();
        self.inner.slots.retain(|_, slot| !slot.is_expired(now));
        before.saturating_sub(self.inner.slots.len())
    }

    fn has_room_for(&self, key: &str) -> bool {
        let Some(max) = self.inner.max_entries else {
            return true;
        };
        if self.inner.slots.contains_key(key) || self.inner.slots.len() < max {
            return true;
        }
        self.purge_expired();
        self.inner.slots.len() < max
    }
}
