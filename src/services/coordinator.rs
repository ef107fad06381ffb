//! Check-in coordinator
//!
//! Drives one cycle per scan: scan -> lookup -> validate -> persist, and
//! keeps the session counters. Every failure is recovered here: it becomes a
//! `Failure` with a fixed localized message and one count in `failed`. The
//! session never ends itself; the caller decides after each cycle.

use crate::domain::errors::{FailureKind, Locale, StoreError};
use crate::domain::stats::{SessionStats, SessionSummary};
use crate::domain::types::{Pilgrim, PilgrimStatus, ScanMode};
use crate::infra::config::Config;
use crate::io::store::RecordStore;
use crate::services::session::{CancelHandle, ScanAttempt, ScanSession};
use crate::services::validator::{validate, Verdict};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

/// Pause between cycles while the reader reports itself unavailable
const UNAVAILABLE_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("an idle scan mode has no target status")]
    IdleMode,
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub scan_timeout: Duration,
    pub locale: Locale,
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self { scan_timeout: config.scan_timeout(), locale: config.locale() }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Where the current cycle is; `Persisting` means a status update is pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Scanning,
    LookingUp,
    Persisting,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: &'static str,
    /// Underlying error text for network and server failures
    pub detail: Option<String>,
    /// Record as last read from the store, when the lookup got that far
    pub pilgrim: Option<Pilgrim>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Status persisted; `pilgrim` is the record the store returned
    CheckedIn { pilgrim: Pilgrim, previous: PilgrimStatus },
    Failed(Failure),
    /// Scan cancelled by the user; nothing counted
    Cancelled,
    /// Reader missing or disabled; no attempt was made
    Unavailable(Failure),
}

impl CycleOutcome {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            CycleOutcome::Failed(f) | CycleOutcome::Unavailable(f) => Some(f.kind),
            CycleOutcome::CheckedIn { .. } | CycleOutcome::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    ScanAnother,
    End,
}

pub struct CheckinCoordinator {
    target: PilgrimStatus,
    session: ScanSession,
    store: Arc<dyn RecordStore>,
    settings: CoordinatorSettings,
    stats: SessionStats,
    phase_tx: watch::Sender<CyclePhase>,
}

impl CheckinCoordinator {
    pub fn new(
        mode: ScanMode,
        session: ScanSession,
        store: Arc<dyn RecordStore>,
        settings: CoordinatorSettings,
    ) -> Result<Self, CoordinatorError> {
        let target = mode.target_status().ok_or(CoordinatorError::IdleMode)?;
        let stats = SessionStats::new(mode);
        let (phase_tx, _) = watch::channel(CyclePhase::Idle);

        info!(
            session_id = %stats.session_id(),
            mode = %mode.as_str(),
            scan_timeout_ms = %settings.scan_timeout.as_millis(),
            "checkin_session_started"
        );

        Ok(Self { target, session, store, settings, stats, phase_tx })
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn mode(&self) -> ScanMode {
        ScanMode::from(self.target)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.session.cancel_handle()
    }

    /// Watch the cycle phase, e.g. to show a pending state while persisting
    pub fn subscribe_phase(&self) -> watch::Receiver<CyclePhase> {
        self.phase_tx.subscribe()
    }

    fn set_phase(&self, phase: CyclePhase) {
        self.phase_tx.send_replace(phase);
    }

    fn failure(
        &self,
        kind: FailureKind,
        detail: Option<String>,
        pilgrim: Option<Pilgrim>,
    ) -> Failure {
        Failure { kind, message: kind.message(self.settings.locale), detail, pilgrim }
    }

    /// Count a failed attempt and build its outcome
    fn fail(
        &mut self,
        kind: FailureKind,
        detail: Option<String>,
        pilgrim: Option<Pilgrim>,
    ) -> CycleOutcome {
        self.stats.record_failure(kind);
        CycleOutcome::Failed(self.failure(kind, detail, pilgrim))
    }

    fn fail_store(&mut self, err: StoreError, pilgrim: Option<Pilgrim>) -> CycleOutcome {
        let detail = match err {
            StoreError::NotFound => None,
            ref other => Some(other.to_string()),
        };
        self.fail(err.failure_kind(), detail, pilgrim)
    }

    /// Run one scan -> lookup -> validate -> persist cycle
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let (_, never_stop) = watch::channel(false);
        self.cycle(never_stop).await
    }

    async fn cycle(&mut self, stop: watch::Receiver<bool>) -> CycleOutcome {
        let started = Instant::now();
        self.session.recover().await;
        self.set_phase(CyclePhase::Scanning);

        let outcome = self.process(stop).await;

        self.session.acknowledge();
        self.set_phase(CyclePhase::Done);
        self.log_outcome(&outcome, started);
        outcome
    }

    async fn process(&mut self, stop: watch::Receiver<bool>) -> CycleOutcome {
        let card_id = match self.session.scan_until(self.settings.scan_timeout, stop).await {
            ScanAttempt::Card(card_id) => card_id,
            ScanAttempt::Failed(error) => return self.fail(error.into(), None, None),
            ScanAttempt::Cancelled => return CycleOutcome::Cancelled,
            ScanAttempt::Unavailable(error) => {
                return CycleOutcome::Unavailable(self.failure(error.into(), None, None))
            }
            ScanAttempt::Busy => {
                warn!("checkin_scan_busy");
                return CycleOutcome::Cancelled;
            }
        };

        self.set_phase(CyclePhase::LookingUp);
        let pilgrim = match self.store.find_by_card_id(&card_id).await {
            Ok(pilgrim) => pilgrim,
            Err(err) => {
                if err == StoreError::NotFound {
                    info!(card_id = %card_id, "checkin_unknown_card");
                }
                return self.fail_store(err, None);
            }
        };

        let verdict = validate(pilgrim.status, self.target);
        if let Some(kind) = verdict.failure_for(self.target) {
            return self.fail(kind, None, Some(pilgrim));
        }

        self.set_phase(CyclePhase::Persisting);
        match self.store.update_status(&pilgrim.id, self.target).await {
            Ok(updated) => {
                self.stats.record_success(self.target);
                CycleOutcome::CheckedIn { pilgrim: updated, previous: pilgrim.status }
            }
            // The record keeps its last known-good status
            Err(err) => self.fail_store(err, Some(pilgrim)),
        }
    }

    fn log_outcome(&self, outcome: &CycleOutcome, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis();
        match outcome {
            CycleOutcome::CheckedIn { pilgrim, previous } => info!(
                pilgrim_id = %pilgrim.id,
                name = %pilgrim.name,
                from = %previous,
                to = %self.target,
                successful = %self.stats.successful(),
                total = %self.stats.total(),
                elapsed_ms = %elapsed_ms,
                "checkin_succeeded"
            ),
            CycleOutcome::Failed(failure) => warn!(
                kind = %failure.kind,
                pilgrim_id = ?failure.pilgrim.as_ref().map(|p| p.id.0.as_str()),
                detail = ?failure.detail,
                failed = %self.stats.failed(),
                total = %self.stats.total(),
                elapsed_ms = %elapsed_ms,
                "checkin_failed"
            ),
            CycleOutcome::Cancelled => info!(elapsed_ms = %elapsed_ms, "checkin_cancelled"),
            CycleOutcome::Unavailable(failure) => {
                warn!(kind = %failure.kind, "checkin_reader_unavailable")
            }
        }
    }

    /// Run cycles until `decide` says to end or `shutdown` turns true.
    /// Shutdown cancels an in-flight scan; a pending persist is allowed to
    /// finish so its result is counted.
    pub async fn run<F>(&mut self, mut decide: F, shutdown: watch::Receiver<bool>)
    where
        F: FnMut(&CycleOutcome) -> NextAction,
    {
        let mut shutdown_rx = shutdown.clone();

        loop {
            if *shutdown.borrow() {
                break;
            }
            let outcome = self.cycle(shutdown.clone()).await;
            if *shutdown.borrow() || decide(&outcome) == NextAction::End {
                break;
            }

            // An unavailable reader answers instantly; pace the retries
            if matches!(outcome, CycleOutcome::Unavailable(_)) {
                tokio::select! {
                    _ = tokio::time::sleep(UNAVAILABLE_BACKOFF) => {}
                    Ok(()) = shutdown_rx.changed() => {}
                }
            } else {
                tokio::task::yield_now().await;
            }
        }
    }

    /// End the session: release the reader if needed, stamp the end time,
    /// and hand back the frozen counters
    pub async fn end(mut self) -> SessionSummary {
        self.session.recover().await;
        self.stats.finish();
        self.set_phase(CyclePhase::Idle);

        let summary = self.stats.summary();
        summary.log();
        summary
    }
}
