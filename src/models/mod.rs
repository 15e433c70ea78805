//! Report models for the maintenance CLI
//!
//! Serializable views of store state, printed as JSON.

pub mod reports;

// Re-export commonly used types
pub use reports::{ClearReport, EntryReport, EvictReport, StatsReport, SweepReport};
