//! Domain models - pilgrim records, failure taxonomy, session counters
//!
//! This module contains the canonical data types used throughout the system:
//! - `Pilgrim` - record owned by the remote store
//! - `ScanMode` / `PilgrimStatus` - target and current boarding status
//! - `FailureKind` - closed taxonomy of check-in failures
//! - `SessionStats` - single-writer counters for one scanning run

pub mod errors;
pub mod stats;
pub mod types;

// Re-export commonly used types at module level
pub use errors::{FailureKind, Locale, ScanError, StoreError};
pub use stats::{SessionStats, SessionSummary};
pub use types::{CardId, Pilgrim, PilgrimId, PilgrimStatus, RosterStats, ScanMode};
