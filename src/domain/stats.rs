//! Per-session check-in counters
//!
//! A `SessionStats` is owned by exactly one coordinator. `total` is derived
//! from `successful + failed` so the two can never drift apart.

use crate::domain::errors::FailureKind;
use crate::domain::types::{PilgrimStatus, ScanMode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SessionStats {
    session_id: String,
    mode: ScanMode,
    successful: u64,
    failed: u64,
    onboard_count: u64,
    offboard_count: u64,
    failures_by_kind: BTreeMap<FailureKind, u64>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl SessionStats {
    pub fn new(mode: ScanMode) -> Self {
        Self {
            session_id: Uuid::now_v7().to_string(),
            mode,
            successful: 0,
            failed: 0,
            onboard_count: 0,
            offboard_count: 0,
            failures_by_kind: BTreeMap::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Count one persisted status change
    pub fn record_success(&mut self, status: PilgrimStatus) {
        self.successful += 1;
        match status {
            PilgrimStatus::Onboard => self.onboard_count += 1,
            PilgrimStatus::Offboard => self.offboard_count += 1,
        }
    }

    /// Count one failed attempt
    pub fn record_failure(&mut self, kind: FailureKind) {
        self.failed += 1;
        *self.failures_by_kind.entry(kind).or_insert(0) += 1;
    }

    /// Stamp the end time. Only the first call has an effect.
    pub fn finish(&mut self) {
        if self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn total(&self) -> u64 {
        self.successful + self.failed
    }

    pub fn successful(&self) -> u64 {
        self.successful
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn onboard_count(&self) -> u64 {
        self.onboard_count
    }

    pub fn offboard_count(&self) -> u64 {
        self.offboard_count
    }

    pub fn failures_of(&self, kind: FailureKind) -> u64 {
        self.failures_by_kind.get(&kind).copied().unwrap_or(0)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            mode: self.mode,
            total: self.total(),
            successful: self.successful,
            failed: self.failed,
            onboard_count: self.onboard_count,
            offboard_count: self.offboard_count,
            failures: self.failures_by_kind.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}

/// Frozen copy of a session's counters, suitable for history egress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub mode: ScanMode,
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub onboard_count: u64,
    pub offboard_count: u64,
    pub failures: BTreeMap<FailureKind, u64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionSummary {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn duration_secs(&self) -> Option<i64> {
        self.ended_at.map(|end| (end - self.started_at).num_seconds())
    }

    pub fn log(&self) {
        info!(
            session_id = %self.session_id,
            mode = %self.mode.as_str(),
            total = %self.total,
            successful = %self.successful,
            failed = %self.failed,
            onboard = %self.onboard_count,
            offboard = %self.offboard_count,
            duration_secs = ?self.duration_secs(),
            "session_summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stats_are_zero() {
        let stats = SessionStats::new(ScanMode::Onboard);
        assert_eq!(stats.total(), 0);
        assert_eq!(stats.successful(), 0);
        assert_eq!(stats.failed(), 0);
        assert!(stats.ended_at().is_none());
        assert_eq!(stats.session_id().len(), 36);
    }

    #[test]
    fn test_record_success_counts_mode() {
        let mut stats = SessionStats::new(ScanMode::Onboard);
        stats.record_success(PilgrimStatus::Onboard);
        assert_eq!(stats.successful(), 1);
        assert_eq!(stats.total(), 1);
        assert_eq!(stats.onboard_count(), 1);
        assert_eq!(stats.offboard_count(), 0);
    }

    #[test]
    fn test_record_failure_breakdown() {
        let mut stats = SessionStats::new(ScanMode::Offboard);
        stats.record_failure(FailureKind::ScanTimeout);
        stats.record_failure(FailureKind::ScanTimeout);
        stats.record_failure(FailureKind::PilgrimNotFound);
        assert_eq!(stats.failed(), 3);
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.failures_of(FailureKind::ScanTimeout), 2);
        assert_eq!(stats.failures_of(FailureKind::PilgrimNotFound), 1);
        assert_eq!(stats.failures_of(FailureKind::InvalidCard), 0);
    }

    #[test]
    fn test_finish_stamps_once() {
        let mut stats = SessionStats::new(ScanMode::Onboard);
        stats.finish();
        let first = stats.ended_at();
        assert!(first.is_some());
        stats.finish();
        assert_eq!(stats.ended_at(), first);
    }

    #[test]
    fn test_summary_json() {
        let mut stats = SessionStats::new(ScanMode::Onboard);
        stats.record_success(PilgrimStatus::Onboard);
        stats.record_failure(FailureKind::AlreadyOnboard);
        stats.finish();

        let summary = stats.summary();
        let parsed: serde_json::Value = serde_json::from_str(&summary.to_json()).unwrap();
        assert_eq!(parsed["mode"], "onboard");
        assert_eq!(parsed["total"], 2);
        assert_eq!(parsed["failures"]["ALREADY_ONBOARD"], 1);
        assert_eq!(summary.duration_secs(), Some(0));
    }
}
