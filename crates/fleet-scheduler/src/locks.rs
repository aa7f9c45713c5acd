//! Per-job mutual exclusion
//!
//! Every read-modify-write of a job record happens under that job's lock, so
//! two placements of the same id can never both dispatch and the slower one
//! can never overwrite the other's result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

/// Lock table keyed by job id; entries are dropped once nobody holds or waits on them
#[derive(Default)]
pub struct JobLocks {
    slots: Mutex<HashMap<String, Slot>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for exclusive access to `id`
    pub async fn lock(&self, id: &str) -> JobGuard<'_> {
        let slot = self.slots().entry(id.to_string()).or_default().clone();
        let guard = slot.clone().lock_owned().await;

        JobGuard {
            locks: self,
            id: id.to_string(),
            slot,
            guard: Some(guard),
        }
    }

    /// Number of ids currently locked or waited on
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }
}

/// Exclusive access to one job id, released on drop
pub struct JobGuard<'a> {
    locks: &'a JobLocks,
    id: String,
    slot: Slot,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        let mut slots = self.locks.slots();
        // Only the table and this guard still reference the slot.
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_id_is_serialized() {
        let locks = Arc::new(JobLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let (locks, inside, peak) = (locks.clone(), inside.clone(), peak.clone());
                tokio::spawn(async move {
                    let _guard = locks.lock("1").await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_ids_do_not_block() {
        let locks = JobLocks::new();
        let _a = locks.lock("a").await;

        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("b")).await;
        assert!(b.is_ok());
        drop(b);
        assert_eq!(locks.len(), 1);
    }
}
