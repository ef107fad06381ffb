//! Card reader contract
//!
//! A reader answers capability/availability checks without side effects and
//! performs exactly one read per `scan` call. Implementations must release
//! the physical reader on every exit path, including the scan future being
//! dropped, so the next `scan` can always proceed.

use crate::domain::types::CardId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub use crate::domain::errors::ScanError;

/// Outcome of one scan attempt. Exactly one of card or error exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Card(CardId),
    Failed(ScanError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub outcome: ScanOutcome,
    pub scanned_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn card(card_id: CardId) -> Self {
        Self { outcome: ScanOutcome::Card(card_id), scanned_at: Utc::now() }
    }

    pub fn failed(error: ScanError) -> Self {
        Self { outcome: ScanOutcome::Failed(error), scanned_at: Utc::now() }
    }

    pub fn success(&self) -> bool {
        matches!(self.outcome, ScanOutcome::Card(_))
    }

    pub fn card_id(&self) -> Option<&CardId> {
        match &self.outcome {
            ScanOutcome::Card(id) => Some(id),
            ScanOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<ScanError> {
        match self.outcome {
            ScanOutcome::Card(_) => None,
            ScanOutcome::Failed(e) => Some(e),
        }
    }
}

#[async_trait]
pub trait CardReader: Send + Sync {
    /// Whether scanning hardware exists on this device
    async fn capability(&self) -> bool;

    /// Whether scanning is enabled right now. Callers re-check per start.
    async fn availability(&self) -> bool;

    /// One read attempt, never blocking past `timeout`
    async fn scan(&self, timeout: Duration) -> ScanResult;

    /// Abort an in-flight scan. Idempotent.
    async fn cancel(&self);
}
