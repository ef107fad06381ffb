//! Scripted card reader for simulation runs and tests
//!
//! Plays back a queue of steps, one per scan. An exhausted script behaves
//! like no card being presented: the scan waits out its timeout.

use crate::domain::types::CardId;
use crate::io::reader::{CardReader, ScanError, ScanResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// One scripted scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// A tag is presented and read cleanly
    Card(CardId),
    /// The reader reports a failure immediately
    Fail(ScanError),
    /// Nothing is presented; the scan runs until timeout or cancel
    Hang,
}

impl ScriptStep {
    pub fn card(id: &str) -> Self {
        ScriptStep::Card(CardId::from(id))
    }
}

pub struct ScriptedCardReader {
    steps: Mutex<VecDeque<ScriptStep>>,
    capable: AtomicBool,
    enabled: AtomicBool,
    scans: AtomicU64,
    cancels: AtomicU64,
    cancel_epoch: watch::Sender<u64>,
}

impl ScriptedCardReader {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        let (cancel_epoch, _) = watch::channel(0);
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            capable: AtomicBool::new(true),
            enabled: AtomicBool::new(true),
            scans: AtomicU64::new(0),
            cancels: AtomicU64::new(0),
            cancel_epoch,
        }
    }

    /// Reader presenting the given cards in order
    pub fn with_cards<'a>(cards: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(cards.into_iter().map(ScriptStep::card))
    }

    pub fn push(&self, step: ScriptStep) {
        self.steps.lock().push_back(step);
    }

    pub fn set_capable(&self, capable: bool) {
        self.capable.store(capable, Ordering::Relaxed);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().len()
    }

    /// Scans that actually engaged the reader
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    pub fn cancel_count(&self) -> u64 {
        self.cancels.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CardReader for ScriptedCardReader {
    async fn capability(&self) -> bool {
        self.capable.load(Ordering::Relaxed)
    }

    async fn availability(&self) -> bool {
        self.capable.load(Ordering::Relaxed) && self.enabled.load(Ordering::Relaxed)
    }

    async fn scan(&self, timeout: Duration) -> ScanResult {
        let mut cancel_rx = self.cancel_epoch.subscribe();
        self.scans.fetch_add(1, Ordering::Relaxed);

        let step = self.steps.lock().pop_front().unwrap_or(ScriptStep::Hang);
        debug!(step = ?step, "scripted_reader_scan");

        match step {
            ScriptStep::Card(card_id) => ScanResult::card(card_id),
            ScriptStep::Fail(error) => ScanResult::failed(error),
            ScriptStep::Hang => {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => ScanResult::failed(ScanError::Timeout),
                    _ = cancel_rx.changed() => ScanResult::failed(ScanError::Unknown),
                }
            }
        }
    }

    async fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::Relaxed);
        self.cancel_epoch.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
    }
}
