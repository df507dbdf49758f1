//! In-memory ledger store.

use super::{check_revision, LedgerStore};
use crate::error::RsvpError;
use crate::ledger::{WorkshopId, WorkshopLedger};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Ledger store kept in process memory. Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    ledgers: RwLock<HashMap<WorkshopId, WorkshopLedger>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of workshops with at least one saved ledger.
    pub async fn workshop_count(&self) -> usize {
        self.ledgers.read().await.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load_ledger(&self, workshop_id: &WorkshopId) -> Result<WorkshopLedger, RsvpError> {
        let ledgers = self.ledgers.read().await;
        Ok(ledgers.get(workshop_id).cloned().unwrap_or_default())
    }

    async fn save_ledger(
        &self,
        workshop_id: &WorkshopId,
        ledger: &WorkshopLedger,
    ) -> Result<(), RsvpError> {
        let mut ledgers = self.ledgers.write().await;
        let stored_revision = ledgers.get(workshop_id).map_or(0, WorkshopLedger::revision);
        check_revision(workshop_id, stored_revision, ledger)?;

        ledgers.insert(workshop_id.clone(), ledger.clone());
        debug!(
            workshop_id = %workshop_id,
            revision = ledger.revision(),
            "Memory store: saved ledger"
        );
        Ok(())
    }
}
