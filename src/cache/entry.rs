//! Cache Entry Module
//!
//! Entry metadata as seen through the store, plus the recency clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

use crate::cache::key::CacheKey;

/// Minimum spacing between two stamps handed out by one clock.
///
/// A microsecond survives filesystems that drop nanosecond precision.
const STAMP_STEP_NANOS: u64 = 1_000;

// == Entry Metadata ==
/// One persisted entry as listed from the storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    /// Key the entry is addressed by
    pub key: CacheKey,
    /// Last successful read or write
    pub last_access: SystemTime,
    /// Size of the entry file in bytes
    pub size: u64,
}

impl EntryMeta {
    /// Eviction order: oldest access first, ties broken by key.
    pub fn recency_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.last_access
            .cmp(&other.last_access)
            .then_with(|| self.key.cmp(&other.key))
    }

    pub fn last_access_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.last_access)
    }
}

// == Recency Clock ==
/// Hands out wall-clock stamps that strictly increase within a process.
#[derive(Debug, Default)]
pub struct RecencyClock {
    last_nanos: AtomicU64,
}

impl RecencyClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next stamp, never equal to or earlier than a previous one.
    pub fn next(&self) -> SystemTime {
        let now = current_timestamp_nanos();
        let mut prev = self.last_nanos.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev.saturating_add(STAMP_STEP_NANOS));
            match self.last_nanos.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return UNIX_EPOCH + Duration::from_nanos(candidate),
                Err(actual) => prev = actual,
            }
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in nanoseconds.
pub fn current_timestamp_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
