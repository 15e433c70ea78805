//! Cache Store Module
//!
//! Durable key -> entry mapping over a storage root, one file per entry.
//!
//! Writes go to a temp file in the same directory and are installed with a
//! single rename, so readers only ever see complete entries. Recency lives in
//! the entry file's modification time and is updated without rewriting the
//! payload.

use std::fs::{self, FileTimes, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, error, warn};

use crate::cache::codec;
use crate::cache::entry::{EntryMeta, RecencyClock};
use crate::cache::key::CacheKey;
use crate::cache::stats::StatsRecorder;
use crate::cache::{ENTRY_EXTENSION, TEMP_PREFIX};
use crate::error::{CacheError, Result};

// == Cache Store ==
/// File-per-entry store rooted at a directory.
#[derive(Debug)]
pub struct CacheStore {
    /// Directory holding entry files, created on first write
    root: PathBuf,
    /// Source of access stamps
    clock: RecencyClock,
    /// Performance statistics
    stats: StatsRecorder,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a store over `root`. Nothing is touched on disk yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            clock: RecencyClock::new(),
            stats: StatsRecorder::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> &StatsRecorder {
        &self.stats
    }

    /// Path of the file holding `key`.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.{}", key, ENTRY_EXTENSION))
    }

    fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| CacheError::store(&self.root, e))
    }

    // == Get ==
    /// Returns the payload stored under `key` and refreshes its recency.
    ///
    /// Missing, unreadable and corrupt entries all read as `None`; corrupt
    /// ones are purged on the way out.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cache entry");
                return None;
            }
        };

        match codec::unframe(key, &bytes) {
            Ok(payload) => {
                if let Err(e) = self.touch(key) {
                    warn!(key = %key, error = %e, "Failed to refresh entry recency");
                }
                Some(payload)
            }
            Err(err) => {
                self.purge(key, &err);
                None
            }
        }
    }

    // == Put ==
    /// Atomically installs `payload` under `key`.
    ///
    /// On failure any prior entry for `key` is left as it was.
    pub fn put(&self, key: &CacheKey, payload: &[u8]) -> Result<()> {
        self.ensure_root()?;
        let final_path = self.entry_path(key);

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".tmp")
            .tempfile_in(&self.root)
            .map_err(|e| CacheError::store(&self.root, e))?;

        tmp.write_all(&codec::frame(key, payload))
            .map_err(|e| CacheError::store(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| CacheError::store(tmp.path(), e))?;

        // rename keeps mtime, so the entry arrives already stamped
        let stamp = self.clock.next();
        tmp.as_file()
            .set_times(access_times(stamp))
            .map_err(|e| CacheError::store(tmp.path(), e))?;

        tmp.persist(&final_path)
            .map_err(|e| CacheError::store(&final_path, e.error))?;
        // the rename itself is only durable once the directory is
        self.sync_root()?;

        debug!(path = %final_path.display(), bytes = payload.len(), "Result stored in cache");
        Ok(())
    }

    /// Flushes the root directory so renames into it survive a crash.
    #[cfg(unix)]
    fn sync_root(&self) -> Result<()> {
        fs::File::open(&self.root)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| CacheError::store(&self.root, e))
    }

    #[cfg(not(unix))]
    fn sync_root(&self) -> Result<()> {
        Ok(())
    }

    // == Touch ==
    /// Marks `key` as just used. Returns `false` if there is no such entry.
    pub fn touch(&self, key: &CacheKey) -> Result<bool> {
        self.touch_at(key, self.clock.next())
    }

    /// Sets an explicit access time on `key`.
    pub fn touch_at(&self, key: &CacheKey, at: SystemTime) -> Result<bool> {
        let path = self.entry_path(key);
        let file = match OpenOptions::new().write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(CacheError::store(&path, e)),
        };
        file.set_times(access_times(at))
            .map_err(|e| CacheError::store(&path, e))?;
        Ok(true)
    }

    // == Remove ==
    /// Deletes `key`. Returns `false` if it was already gone.
    pub fn remove(&self, key: &CacheKey) -> Result<bool> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::store(&path, e)),
        }
    }

    /// Drops a corrupt entry. Failure to delete is logged and ignored.
    pub fn purge(&self, key: &CacheKey, cause: &CacheError) {
        error!(key = %key, error = %cause, "Corrupt cache entry, removing it");
        self.stats.record_corrupt_purge();
        if let Err(e) = self.remove(key) {
            warn!(key = %key, error = %e, "Failed to remove corrupt entry. Ignoring.");
        }
    }

    // == List Entries ==
    /// Enumerates current entries.
    ///
    /// Entries that vanish mid-scan are skipped; temp files and foreign files
    /// are never reported.
    pub fn list_entries(&self) -> Result<Vec<EntryMeta>> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::store(&self.root, e)),
        };

        let mut entries = Vec::new();
        for item in dir {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    warn!(root = %self.root.display(), error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            let Some(key) = item.file_name().to_str().and_then(parse_entry_name) else {
                continue;
            };
            let meta = match item.metadata() {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to stat cache entry");
                    continue;
                }
            };
            entries.push(EntryMeta {
                key,
                last_access: meta.modified().unwrap_or(UNIX_EPOCH),
                size: meta.len(),
            });
        }
        Ok(entries)
    }

    // == Length ==
    /// Number of entries currently on disk, 0 if the root is unreadable.
    pub fn len(&self) -> usize {
        self.list_entries().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Clear ==
    /// Removes every entry and returns how many were deleted.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in self.list_entries()? {
            if self.remove(&entry.key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // == Sweep Temp Files ==
    /// Deletes temp files older than `max_age`, left behind by crashed writers.
    ///
    /// Younger temp files may belong to an in-flight `put` and are kept.
    pub fn sweep_temp_files(&self, max_age: Duration) -> Result<usize> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CacheError::store(&self.root, e)),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for item in dir.flatten() {
            let is_temp = item
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(TEMP_PREFIX));
            if !is_temp {
                continue;
            }
            let Ok(modified) = item.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age < max_age {
                continue;
            }
            match fs::remove_file(item.path()) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %item.path().display(), error = %e, "Failed to remove stale temp file")
                }
            }
        }
        Ok(removed)
    }
}

fn access_times(at: SystemTime) -> FileTimes {
    FileTimes::new().set_accessed(at).set_modified(at)
}

/// Maps `<key>.cache` back to its key.
fn parse_entry_name(name: &str) -> Option<CacheKey> {
    name.strip_suffix(ENTRY_EXTENSION)
        .and_then(|stem| stem.strip_suffix('.'))
        .and_then(CacheKey::parse)
}
