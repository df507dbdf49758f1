//! Per-workshop exclusive access.
//!
//! Every ledger mutation for a workshop runs while holding that workshop's
//! guard, so the dedup check and the append form a single unit. Guards for
//! different workshops never contend.

use super::WorkshopId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

/// Table of per-workshop async mutexes.
///
/// Slots are created on first use and dropped once no task holds or waits on
/// them, so the table only contains workshops with registrations in flight.
#[derive(Default)]
pub struct WorkshopLocks {
    slots: Mutex<HashMap<WorkshopId, Slot>>,
}

impl WorkshopLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a workshop. Waiters are served in FIFO
    /// order.
    pub async fn acquire(&self, workshop_id: &WorkshopId) -> WorkshopGuard<'_> {
        let slot = self
            .lock_slots()
            .entry(workshop_id.clone())
            .or_default()
            .clone();

        let permit = slot.clone().lock_owned().await;

        WorkshopGuard {
            locks: self,
            workshop_id: workshop_id.clone(),
            slot,
            permit: Some(permit),
        }
    }

    /// Number of workshops currently held or awaited.
    pub fn active(&self) -> usize {
        self.lock_slots().len()
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<WorkshopId, Slot>> {
        // The table holds no invariants a panicking holder could break.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to one workshop's ledger, released on drop.
pub struct WorkshopGuard<'a> {
    locks: &'a WorkshopLocks,
    workshop_id: WorkshopId,
    slot: Slot,
    permit: Option<OwnedMutexGuard<()>>,
}

impl WorkshopGuard<'_> {
    pub fn workshop_id(&self) -> &WorkshopId {
        &self.workshop_id
    }
}

impl Drop for WorkshopGuard<'_> {
    fn drop(&mut self) {
        self.permit.take();

        // Only the table and this guard still reference the slot: nobody is
        // waiting, and new waiters need the table lock to find it.
        let mut slots = self.locks.lock_slots();
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.workshop_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn id(s: &str) -> WorkshopId {
        WorkshopId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_slot_released_after_drop() {
        let locks = WorkshopLocks::new();
        {
            let guard = locks.acquire(&id("ws-1")).await;
            assert_eq!(guard.workshop_id().as_str(), "ws-1");
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_different_workshops_do_not_block() {
        let locks = WorkshopLocks::new();
        let _a = locks.acquire(&id("ws-1")).await;

        let b = tokio::time::timeout(Duration::from_secs(1), locks.acquire(&id("ws-2"))).await;
        assert!(b.is_ok());
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn test_same_workshop_is_blocked_while_held() {
        let locks = WorkshopLocks::new();
        let guard = locks.acquire(&id("ws-1")).await;

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), locks.acquire(&id("ws-1"))).await;
        assert!(blocked.is_err());

        drop(guard);
        let retry =
            tokio::time::timeout(Duration::from_secs(1), locks.acquire(&id("ws-1"))).await;
        assert!(retry.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_holders_are_mutually_exclusive() {
        let locks = Arc::new(WorkshopLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(&id("ws-1")).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active(), 0);
    }
}
