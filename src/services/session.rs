//! Scan session state machine
//!
//! ```text
//!   Idle --start--> Scanning --hardware success--> Resolved --ack--> Idle
//!                      |     --hardware failure--> Failed   --ack--> Idle
//!                      +-----cancel-----------------------------> Idle
//! ```
//!
//! `SessionState::on` is the whole transition table. `ScanSession::scan`
//! takes `&mut self`, so its owner cannot start a second scan while one is
//! outstanding. Cancellation comes from other tasks through `CancelHandle`.

use crate::domain::types::CardId;
use crate::io::reader::{CardReader, ScanError, ScanOutcome, ScanResult};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Extra time granted to a reader past its own timeout before the session
/// gives up on it
const SCAN_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Resolved(CardId),
    Failed(ScanError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Start,
    Cancel,
    HardwareSuccess(CardId),
    HardwareFailure(ScanError),
    Acknowledge,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transition from {from} on {event}")]
pub struct IllegalTransition {
    pub from: &'static str,
    pub event: &'static str,
}

impl SessionState {
    pub fn on(&self, event: SessionEvent) -> Result<SessionState, IllegalTransition> {
        use SessionEvent as E;
        use SessionState as S;

        match (self, event) {
            (S::Idle, E::Start) => Ok(S::Scanning),
            (S::Scanning, E::Cancel) => Ok(S::Idle),
            (S::Scanning, E::HardwareSuccess(card_id)) => Ok(S::Resolved(card_id)),
            (S::Scanning, E::HardwareFailure(error)) => Ok(S::Failed(error)),
            (S::Resolved(_) | S::Failed(_), E::Acknowledge) => Ok(S::Idle),
            (from, event) => {
                Err(IllegalTransition { from: from.as_str(), event: event.as_str() })
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Scanning => "scanning",
            SessionState::Resolved(_) => "resolved",
            SessionState::Failed(_) => "failed",
        }
    }
}

impl SessionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEvent::Start => "start",
            SessionEvent::Cancel => "cancel",
            SessionEvent::HardwareSuccess(_) => "hardware_success",
            SessionEvent::HardwareFailure(_) => "hardware_failure",
            SessionEvent::Acknowledge => "acknowledge",
        }
    }
}

/// Result of asking the session for one scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanAttempt {
    Card(CardId),
    Failed(ScanError),
    /// Cancelled by the user; not a failed attempt
    Cancelled,
    /// Start rejected, reader missing or disabled right now
    Unavailable(ScanError),
    /// A scan is already in flight
    Busy,
}

/// Cloneable handle that cancels whatever scan the session has in flight
#[derive(Clone)]
pub struct CancelHandle {
    signal: Arc<watch::Sender<u64>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.signal.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
    }
}

pub struct ScanSession {
    reader: Arc<dyn CardReader>,
    state: SessionState,
    cancel_signal: Arc<watch::Sender<u64>>,
}

impl ScanSession {
    pub fn new(reader: Arc<dyn CardReader>) -> Self {
        let (cancel_signal, _) = watch::channel(0);
        Self { reader, state: SessionState::Idle, cancel_signal: Arc::new(cancel_signal) }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle { signal: self.cancel_signal.clone() }
    }

    fn apply(&mut self, event: SessionEvent) {
        match self.state.on(event) {
            Ok(next) => {
                trace!(from = %self.state.as_str(), to = %next.as_str(), "scan_session_transition");
                self.state = next;
            }
            Err(e) => warn!(error = %e, "scan_session_illegal_transition"),
        }
    }

    /// Return a resolved or failed session to idle
    pub fn acknowledge(&mut self) {
        if matches!(self.state, SessionState::Resolved(_) | SessionState::Failed(_)) {
            self.apply(SessionEvent::Acknowledge);
        }
    }

    /// Bring the session back to idle from any state, releasing the reader
    /// if a scan was left in flight (e.g., its future was dropped)
    pub async fn recover(&mut self) {
        match self.state {
            SessionState::Idle => {}
            SessionState::Scanning => {
                warn!("scan_session_recovering_stale_scan");
                self.reader.cancel().await;
                self.apply(SessionEvent::Cancel);
            }
            SessionState::Resolved(_) | SessionState::Failed(_) => self.acknowledge(),
        }
    }

    /// Run one scan attempt. Capability and availability are checked on
    /// every call.
    pub async fn scan(&mut self, timeout: Duration) -> ScanAttempt {
        let (_, never_stop) = watch::channel(false);
        self.scan_until(timeout, never_stop).await
    }

    /// Like `scan`, but also gives up as soon as `stop` reads true, including
    /// when it was already true before the scan started
    pub async fn scan_until(
        &mut self,
        timeout: Duration,
        mut stop: watch::Receiver<bool>,
    ) -> ScanAttempt {
        self.acknowledge();

        if self.state == SessionState::Scanning {
            debug!("scan_already_in_flight");
            return ScanAttempt::Busy;
        }

        if !self.reader.capability().await {
            info!("scan_rejected_not_supported");
            return ScanAttempt::Unavailable(ScanError::NotSupported);
        }
        if !self.reader.availability().await {
            info!("scan_rejected_disabled");
            return ScanAttempt::Unavailable(ScanError::Disabled);
        }

        // Only cancels issued after this point apply to this scan
        let mut cancel_rx = self.cancel_signal.subscribe();
        self.apply(SessionEvent::Start);

        let reader = self.reader.clone();
        let completed = tokio::select! {
            biased;
            _ = cancel_rx.changed() => None,
            _ = stopped(&mut stop) => None,
            result = tokio::time::timeout(timeout + SCAN_GRACE, reader.scan(timeout)) => {
                Some(result.unwrap_or_else(|_| {
                    warn!(timeout_ms = %timeout.as_millis(), "scan_reader_overran_timeout");
                    ScanResult::failed(ScanError::Timeout)
                }))
            }
        };

        // A cancel that lands together with a hardware result still wins
        let cancelled = cancel_rx.has_changed().unwrap_or(false) || *stop.borrow();

        match completed {
            Some(result) if !cancelled => match result.outcome {
                ScanOutcome::Card(card_id) => {
                    debug!(card_id = %card_id, "scan_resolved");
                    self.apply(SessionEvent::HardwareSuccess(card_id.clone()));
                    ScanAttempt::Card(card_id)
                }
                // The reader went away between the availability check and
                // the read; no attempt was made
                ScanOutcome::Failed(error @ (ScanError::Disabled | ScanError::NotSupported)) => {
                    warn!(error = %error, "scan_reader_lost");
                    self.apply(SessionEvent::Cancel);
                    ScanAttempt::Unavailable(error)
                }
                ScanOutcome::Failed(error) => {
                    debug!(error = %error, "scan_failed");
                    self.apply(SessionEvent::HardwareFailure(error));
                    ScanAttempt::Failed(error)
                }
            },
            _ => {
                self.reader.cancel().await;
                self.apply(SessionEvent::Cancel);
                info!("scan_cancelled");
                ScanAttempt::Cancelled
            }
        }
    }
}

/// Resolves once `stop` reads true; never resolves if its sender is gone
async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
