//! Disk Memo - A disk-backed memoization cache
//!
//! Stores results of expensive deterministic operations on local disk, keyed
//! by a hash of their arguments, with LRU eviction past a configured capacity.

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use cache::{open_store, Args, CacheKey, CacheStore, MemoCache, Memoized, Value};
pub use config::CacheConfig;
pub use error::CacheError;
pub use tasks::spawn_maintenance_task;
