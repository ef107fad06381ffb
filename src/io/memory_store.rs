//! In-memory record store
//!
//! Backs simulation runs and tests. Keeps the card identifier unique across
//! records, counts calls per operation, and can be told to fail the next
//! lookups or persists with a given error.

use crate::domain::types::{CardId, Pilgrim, PilgrimId, PilgrimStatus, RosterStats};
use crate::io::store::{RecordStore, StoreError};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeedError {
    #[error("duplicate record id {0}")]
    DuplicateId(PilgrimId),
    #[error("card {0} already assigned to another record")]
    DuplicateCard(CardId),
}

#[derive(Default)]
struct Records {
    by_id: HashMap<PilgrimId, Pilgrim>,
    by_card: HashMap<CardId, PilgrimId>,
}

/// Per-operation call counters
#[derive(Debug, Default)]
struct CallCounts {
    find_by_card_id: AtomicU64,
    find_by_id: AtomicU64,
    update_status: AtomicU64,
    list_all: AtomicU64,
}

#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<Records>,
    calls: CallCounts,
    lookup_faults: Mutex<VecDeque<StoreError>>,
    update_faults: Mutex<VecDeque<StoreError>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pilgrims(pilgrims: impl IntoIterator<Item = Pilgrim>) -> Result<Self, SeedError> {
        let store = Self::new();
        for pilgrim in pilgrims {
            store.insert(pilgrim)?;
        }
        Ok(store)
    }

    /// Load a JSON array of pilgrim records
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read roster file {}", path.display()))?;
        let pilgrims: Vec<Pilgrim> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse roster file {}", path.display()))?;
        let count = pilgrims.len();
        let store = Self::with_pilgrims(pilgrims)?;
        info!(file = %path.display(), pilgrims = %count, "roster_loaded");
        Ok(store)
    }

    pub fn insert(&self, pilgrim: Pilgrim) -> Result<(), SeedError> {
        let mut records = self.records.write();
        if records.by_id.contains_key(&pilgrim.id) {
            return Err(SeedError::DuplicateId(pilgrim.id));
        }
        if records.by_card.contains_key(&pilgrim.card_id) {
            return Err(SeedError::DuplicateCard(pilgrim.card_id));
        }
        records.by_card.insert(pilgrim.card_id.clone(), pilgrim.id.clone());
        records.by_id.insert(pilgrim.id.clone(), pilgrim);
        Ok(())
    }

    /// Fail the next lookup (by card or by id) with `error`
    pub fn fail_next_lookup(&self, error: StoreError) {
        self.lookup_faults.lock().push_back(error);
    }

    /// Fail the next status update with `error`
    pub fn fail_next_update(&self, error: StoreError) {
        self.update_faults.lock().push_back(error);
    }

    pub fn update_calls(&self) -> u64 {
        self.calls.update_status.load(Ordering::Relaxed)
    }

    pub fn lookup_calls(&self) -> u64 {
        self.calls.find_by_card_id.load(Ordering::Relaxed)
            + self.calls.find_by_id.load(Ordering::Relaxed)
    }

    /// Status as currently stored, bypassing call counting and faults
    pub fn status_of(&self, id: &PilgrimId) -> Option<PilgrimStatus> {
        self.records.read().by_id.get(id).map(|p| p.status)
    }

    fn take_lookup_fault(&self) -> Option<StoreError> {
        self.lookup_faults.lock().pop_front()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_by_card_id(&self, card_id: &CardId) -> Result<Pilgrim, StoreError> {
        self.calls.find_by_card_id.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = self.take_lookup_fault() {
            return Err(err);
        }
        let records = self.records.read();
        records
            .by_card
            .get(card_id)
            .and_then(|id| records.by_id.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_by_id(&self, id: &PilgrimId) -> Result<Pilgrim, StoreError> {
        self.calls.find_by_id.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = self.take_lookup_fault() {
            return Err(err);
        }
        self.records.read().by_id.get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn update_status(
        &self,
        id: &PilgrimId,
        status: PilgrimStatus,
    ) -> Result<Pilgrim, StoreError> {
        self.calls.update_status.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = self.update_faults.lock().pop_front() {
            return Err(err);
        }
        let mut records = self.records.write();
        let pilgrim = records.by_id.get_mut(id).ok_or(StoreError::NotFound)?;
        pilgrim.status = status;
        pilgrim.updated = Some(Utc::now());
        debug!(pilgrim_id = %id, status = %status, "memory_store_status_updated");
        Ok(pilgrim.clone())
    }

    async fn list_all(&self) -> Result<Vec<Pilgrim>, StoreError> {
        self.calls.list_all.fetch_add(1, Ordering::Relaxed);
        let mut pilgrims: Vec<Pilgrim> = self.records.read().by_id.values().cloned().collect();
        pilgrims.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(pilgrims)
    }

    async fn stats(&self) -> Result<RosterStats, StoreError> {
        Ok(RosterStats::from_pilgrims(self.records.read().by_id.values()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn seeded() -> InMemoryRecordStore {
        InMemoryRecordStore::with_pilgrims([
            Pilgrim::new("p1", "Aminah", "A1", PilgrimStatus::Offboard),
            Pilgrim::new("p2", "Bilal", "B2", PilgrimStatus::Onboard),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_find_by_card_and_id() {
        let store = seeded();
        let by_card = store.find_by_card_id(&CardId::from("A1")).await.unwrap();
        assert_eq!(by_card.id, PilgrimId::from("p1"));

        let by_id = store.find_by_id(&PilgrimId::from("p2")).await.unwrap();
        assert_eq!(by_id.card_id, CardId::from("B2"));

        let missing = store.find_by_card_id(&CardId::from("ZZ")).await;
        assert_eq!(missing, Err(StoreError::NotFound));
        assert_eq!(store.lookup_calls(), 3);
    }

    #[test]
    fn test_rejects_duplicate_card() {
        let store = seeded();
        let result = store.insert(Pilgrim::new("p3", "Dawud", "A1", PilgrimStatus::Offboard));
        assert_eq!(result, Err(SeedError::DuplicateCard(CardId::from("A1"))));
    }

    #[tokio::test]
    async fn test_update_status_and_stats() {
        let store = seeded();
        let updated =
            store.update_status(&PilgrimId::from("p1"), PilgrimStatus::Onboard).await.unwrap();
        assert_eq!(updated.status, PilgrimStatus::Onboard);
        assert!(updated.updated.is_some());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats, RosterStats { total: 2, onboard: 2, offboard: 0 });
    }

    #[tokio::test]
    async fn test_injected_update_fault() {
        let store = seeded();
        store.fail_next_update(StoreError::Network("connection reset".to_string()));

        let result = store.update_status(&PilgrimId::from("p1"), PilgrimStatus::Onboard).await;
        assert!(matches!(result, Err(StoreError::Network(_))));
        assert_eq!(store.status_of(&PilgrimId::from("p1")), Some(PilgrimStatus::Offboard));

        // Fault is consumed
        let retry = store.update_status(&PilgrimId::from("p1"), PilgrimStatus::Onboard).await;
        assert!(retry.is_ok());
        assert_eq!(store.update_calls(), 2);
    }

    #[test]
    fn test_load_roster_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let json = r#"[
            {"id": "p1", "name": "Aminah", "card_id": "A1", "status": "offboard"},
            {"id": "p2", "name": "Bilal", "card_id": "B2", "status": "onboard", "seat_number": "4"}
        ]"#;
        file.write_all(json.as_bytes()).unwrap();
        file.flush().unwrap();

        let store = InMemoryRecordStore::from_json_file(file.path()).unwrap();
        assert_eq!(store.status_of(&PilgrimId::from("p2")), Some(PilgrimStatus::Onboard));
    }

    #[test]
    fn test_load_roster_rejects_duplicate_cards() {
        let mut file = NamedTempFile::new().unwrap();
        let json = r#"[
            {"id": "p1", "name": "Aminah", "card_id": "A1", "status": "offboard"},
            {"id": "p2", "name": "Bilal", "card_id": "A1", "status": "onboard"}
        ]"#;
        file.write_all(json.as_bytes()).unwrap();
        file.flush().unwrap();

        assert!(InMemoryRecordStore::from_json_file(file.path()).is_err());
    }
}
