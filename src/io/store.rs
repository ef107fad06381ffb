//! Record store contract
//!
//! The store owns pilgrim records; the check-in core only reads them and
//! requests status updates. Every call can fail with a network or server
//! error that is distinct from `StoreError::NotFound`.

use crate::domain::types::{CardId, Pilgrim, PilgrimId, PilgrimStatus, RosterStats};
use async_trait::async_trait;

pub use crate::domain::errors::StoreError;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_by_card_id(&self, card_id: &CardId) -> Result<Pilgrim, StoreError>;

    async fn find_by_id(&self, id: &PilgrimId) -> Result<Pilgrim, StoreError>;

    /// Persist a new status and return the stored record
    async fn update_status(
        &self,
        id: &PilgrimId,
        status: PilgrimStatus,
    ) -> Result<Pilgrim, StoreError>;

    async fn list_all(&self) -> Result<Vec<Pilgrim>, StoreError>;

    async fn stats(&self) -> Result<RosterStats, StoreError> {
        let pilgrims = self.list_all().await?;
        Ok(RosterStats::from_pilgrims(&pilgrims))
    }
}
