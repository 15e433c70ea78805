//! Background Tasks Module
//!
//! Contains background tasks that keep a shared store in shape.
//!
//! # Tasks
//! - Maintenance: sweeps stale temp files and re-runs LRU eviction

mod maintenance;

pub use maintenance::{run_maintenance_pass, spawn_maintenance_task, MaintenanceReport};
