//! LRU Eviction Module
//!
//! Keeps a store at or below its capacity by deleting the least recently
//! used entries.
//!
//! The scan is advisory: concurrent writers may push the store past capacity
//! between two passes, and the next `enforce` corrects it.

use tracing::{debug, warn};

use crate::cache::entry::EntryMeta;
use crate::cache::key::CacheKey;
use crate::cache::store::CacheStore;

// == Eviction Report ==
/// Outcome of one `enforce` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Keys this call deleted, oldest first
    pub evicted: Vec<CacheKey>,
    /// Entries left after the last scan
    pub remaining: usize,
}

// == Victim Selection ==
/// Orders `entries` oldest-first and returns the ones past `capacity`.
pub fn select_victims(mut entries: Vec<EntryMeta>, capacity: usize) -> Vec<EntryMeta> {
    let excess = entries.len().saturating_sub(capacity);
    if excess == 0 {
        return Vec::new();
    }
    entries.sort_by(EntryMeta::recency_cmp);
    entries.truncate(excess);
    entries
}

// == Enforce ==
/// Evicts least recently used entries until at most `capacity` remain.
///
/// A failed removal is logged and the next-oldest candidate is tried. The
/// pass stops early only when the store cannot be listed or when a whole
/// round makes no progress.
pub fn enforce(store: &CacheStore, capacity: usize) -> EvictionReport {
    let mut report = EvictionReport::default();

    loop {
        let entries = match store.list_entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to list cache entries. Ignoring.");
                return report;
            }
        };
        report.remaining = entries.len();
        if entries.len() <= capacity {
            return report;
        }

        let needed = entries.len() - capacity;
        let mut candidates = entries;
        candidates.sort_by(EntryMeta::recency_cmp);

        let mut gone = 0;
        for victim in &candidates {
            if gone == needed {
                break;
            }
            match store.remove(&victim.key) {
                Ok(true) => {
                    debug!(key = %victim.key, "Cache full. Removed least recently used entry");
                    store.stats().record_eviction();
                    report.evicted.push(victim.key.clone());
                    gone += 1;
                }
                // someone else got there first; it still left the store
                Ok(false) => gone += 1,
                Err(e) => {
                    warn!(key = %victim.key, error = %e, "Failed to evict entry, trying next-oldest");
                }
            }
        }

        if gone == 0 {
            warn!(
                over_by = needed,
                "No entry could be evicted; leaving store over capacity"
            );
            report.remaining = candidates.len();
            return report;
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::{fingerprint, Args};
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    fn key(name: &str) -> CacheKey {
        fingerprint(&Args::new().arg(name)).unwrap()
    }

    fn new_store() -> (TempDir, CacheStore) {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        (dir, store)
    }

    /// Puts `name` and pins its access time to `secs` past the epoch.
    fn put_at(store: &CacheStore, name: &str, secs: u64) {
        store.put(&key(name), name.as_bytes()).unwrap();
        store
            .touch_at(&key(name), UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    fn meta(name: &str, secs: u64) -> EntryMeta {
        EntryMeta {
            key: key(name),
            last_access: UNIX_EPOCH + Duration::from_secs(secs),
            size: 0,
        }
    }

    #[test]
    fn test_select_victims_under_capacity() {
        let entries = vec![meta("a", 1), meta("b", 2)];
        assert!(select_victims(entries, 2).is_empty());
    }

    #[test]
    fn test_select_victims_oldest_first() {
        let entries = vec![meta("c", 30), meta("a", 10), meta("b", 20)];
        let victims = select_victims(entries, 1);
        let keys: Vec<_> = victims.into_iter().map(|m| m.key).collect();
        assert_eq!(keys, vec![key("a"), key("b")]);
    }

    #[test]
    fn test_select_victims_ties_broken_by_key() {
        let entries = vec![meta("x", 5), meta("y", 5), meta("z", 5)];
        let mut sorted_keys = vec![key("x"), key("y"), key("z")];
        sorted_keys.sort();

        let victims = select_victims(entries, 2);
        assert_eq!(victims.len(), 1);
        assert_eq!(victims[0].key, sorted_keys[0]);
    }

    #[test]
    fn test_enforce_noop_under_capacity() {
        let (_dir, store) = new_store();
        put_at(&store, "a", 1);

        let report = enforce(&store, 5);
        assert_eq!(
            report,
            EvictionReport {
                evicted: Vec::new(),
                remaining: 1
            }
        );
    }

    #[test]
    fn test_enforce_removes_exactly_the_oldest() {
        let (_dir, store) = new_store();
        put_at(&store, "a", 20);
        put_at(&store, "b", 10);
        put_at(&store, "c", 30);

        let report = enforce(&store, 2);

        assert_eq!(
            report,
            EvictionReport {
                evicted: vec![key("b")],
                remaining: 2
            }
        );
        assert!(store.get(&key("b")).is_none());
        assert!(store.get(&key("a")).is_some());
        assert!(store.get(&key("c")).is_some());
        assert_eq!(store.stats().snapshot(0).evictions, 1);
    }

    #[test]
    fn test_enforce_catches_up_when_far_over() {
        let (_dir, store) = new_store();
        for (i, name) in ["a", "b", "c", "d", "e", "f"].iter().enumerate() {
            put_at(&store, name, i as u64 + 1);
        }

        let report = enforce(&store, 2);

        assert_eq!(
            report.evicted,
            vec![key("a"), key("b"), key("c"), key("d")]
        );
        assert_eq!(store.len(), 2);
        assert!(store.get(&key("e")).is_some());
        assert!(store.get(&key("f")).is_some());
    }

    #[test]
    fn test_enforce_on_missing_root() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path().join("never-created"));
        assert_eq!(enforce(&store, 1), EvictionReport::default());
    }

    #[test]
    fn test_get_refresh_changes_victim() {
        let (_dir, store) = new_store();
        put_at(&store, "a", 10);
        put_at(&store, "b", 20);

        // reading "a" makes it the most recent
        store.get(&key("a")).unwrap();
        put_at(&store, "c", u64::from(u32::MAX));

        enforce(&store, 2);

        assert!(store.get(&key("a")).is_some());
        assert!(store.get(&key("b")).is_none());
    }
}
