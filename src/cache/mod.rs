//! Cache Module
//!
//! Disk-backed memoization with content-derived keys and LRU eviction.

mod codec;
mod entry;
mod key;
mod lru;
mod memo;
mod serializer;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use codec::{decode_value, encode_value};
pub use entry::{EntryMeta, RecencyClock};
pub use key::{fingerprint, fingerprint_namespaced, Args, CacheKey, Value, KEY_HEX_LEN};
pub use lru::{enforce, select_victims, EvictionReport};
pub use memo::{open_store, MemoCache, Memoized};
pub use stats::{CacheStats, StatsRecorder};
pub use store::CacheStore;

// == Public Constants ==
/// File extension of installed entries
pub const ENTRY_EXTENSION: &str = "cache";

/// Name prefix of in-flight writes; never reported as entries
pub const TEMP_PREFIX: &str = ".tmp-";

/// Default maximum number of entries
pub const DEFAULT_CAPACITY: usize = 4096;
