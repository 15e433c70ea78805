//! Report DTOs for the maintenance CLI
//!
//! Defines the JSON shape of each command's output.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{CacheStats, EntryMeta, EvictionReport};

/// One entry as shown by `list`.
#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    /// Hex cache key
    pub key: String,
    /// Entry file size in bytes
    pub size: u64,
    /// Last access as RFC 3339
    pub last_access: DateTime<Utc>,
}

impl From<&EntryMeta> for EntryReport {
    fn from(meta: &EntryMeta) -> Self {
        Self {
            key: meta.key.to_string(),
            size: meta.size,
            last_access: meta.last_access_utc(),
        }
    }
}

/// Output of `stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Storage root
    pub storage_root: String,
    /// Configured capacity
    pub capacity: usize,
    /// Number of entries on disk
    pub total_entries: usize,
    /// Sum of entry sizes in bytes
    pub total_bytes: u64,
    /// Least recent access among entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_access: Option<DateTime<Utc>>,
    /// Most recent access among entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_access: Option<DateTime<Utc>>,
    /// Counters for this process
    pub session: CacheStats,
}

impl StatsReport {
    /// Summarizes `entries` for a store at `storage_root`.
    pub fn new(
        storage_root: impl Into<String>,
        capacity: usize,
        entries: &[EntryMeta],
        session: CacheStats,
    ) -> Self {
        Self {
            storage_root: storage_root.into(),
            capacity,
            total_entries: entries.len(),
            total_bytes: entries.iter().map(|e| e.size).sum(),
            oldest_access: entries.iter().map(|e| e.last_access).min().map(DateTime::from),
            newest_access: entries.iter().map(|e| e.last_access).max().map(DateTime::from),
            session,
        }
    }
}

/// Output of `evict`.
#[derive(Debug, Clone, Serialize)]
pub struct EvictReport {
    /// Capacity enforced
    pub capacity: usize,
    /// Entries deleted (or that would be, on a dry run)
    pub evicted: Vec<String>,
    /// Entries left afterwards
    pub remaining: usize,
    pub dry_run: bool,
}

impl EvictReport {
    /// Report for a dry run that only selected victims.
    pub fn planned(capacity: usize, total: usize, victims: &[EntryMeta]) -> Self {
        Self {
            capacity,
            evicted: victims.iter().map(|v| v.key.to_string()).collect(),
            remaining: total - victims.len(),
            dry_run: true,
        }
    }

    /// Report for a pass that deleted entries.
    pub fn applied(capacity: usize, report: EvictionReport) -> Self {
        Self {
            capacity,
            evicted: report.evicted.iter().map(|k| k.to_string()).collect(),
            remaining: report.remaining,
            dry_run: false,
        }
    }
}

/// Output of `clear`.
#[derive(Debug, Clone, Serialize)]
pub struct ClearReport {
    pub removed: usize,
}

/// Output of `sweep`.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    /// Stale temp files deleted
    pub removed: usize,
    /// Minimum age in seconds a temp file needed to be removed
    pub max_age_secs: u64,
}
