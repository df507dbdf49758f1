//! Persistence boundary for workshop ledgers.
//!
//! Stores use optimistic concurrency: a ledger may only be saved on top of
//! the revision it was loaded at. A lost race surfaces as
//! [`RsvpError::StorageConflict`] and the caller re-runs its unit of work.

mod encrypted;
mod memory;

pub use encrypted::EncryptedFileStore;
pub use memory::MemoryLedgerStore;

use crate::error::RsvpError;
use crate::ledger::{WorkshopId, WorkshopLedger};
use async_trait::async_trait;

/// Load/save access to per-workshop ledgers.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load a workshop's ledger. Unknown workshops yield an empty ledger at
    /// revision 0.
    async fn load_ledger(&self, workshop_id: &WorkshopId) -> Result<WorkshopLedger, RsvpError>;

    /// Persist a ledger whose revision is exactly one past the stored one.
    async fn save_ledger(
        &self,
        workshop_id: &WorkshopId,
        ledger: &WorkshopLedger,
    ) -> Result<(), RsvpError>;
}

/// Reject a save that does not directly follow the stored revision.
fn check_revision(
    workshop_id: &WorkshopId,
    stored_revision: u64,
    ledger: &WorkshopLedger,
) -> Result<(), RsvpError> {
    if ledger.revision() == stored_revision + 1 {
        Ok(())
    } else {
        Err(RsvpError::StorageConflict {
            workshop_id: workshop_id.to_string(),
        })
    }
}

/// Storage backend selected by configuration.
pub enum Store {
    /// Encrypted files on disk
    Encrypted(EncryptedFileStore),
    /// In-memory only (no persistence)
    Memory(MemoryLedgerStore),
}

impl Store {
    /// Force memory store.
    pub fn memory() -> Self {
        Store::Memory(MemoryLedgerStore::new())
    }

    pub fn encrypted(store: EncryptedFileStore) -> Self {
        Store::Encrypted(store)
    }
}

#[async_trait]
impl LedgerStore for Store {
    async fn load_ledger(&self, workshop_id: &WorkshopId) -> Result<WorkshopLedger, RsvpError> {
        match self {
            Store::Encrypted(s) => s.load_ledger(workshop_id).await,
            Store::Memory(s) => s.load_ledger(workshop_id).await,
        }
    }

    async fn save_ledger(
        &self,
        workshop_id: &WorkshopId,
        ledger: &WorkshopLedger,
    ) -> Result<(), RsvpError> {
        match self {
            Store::Encrypted(s) => s.save_ledger(workshop_id, ledger).await,
            Store::Memory(s) => s.save_ledger(workshop_id, ledger).await,
        }
    }
}
