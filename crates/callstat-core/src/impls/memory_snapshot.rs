//! InMemorySnapshotStore - snapshot storage for tests, with failure injection.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::ports::{Snapshot, SnapshotStore, StoreError};

#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshot: Mutex<Snapshot>,
    failing: AtomicBool,
    saves: AtomicUsize,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent load/save fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Last persisted snapshot.
    pub fn stored(&self) -> Snapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is failing".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        self.check()?;
        Ok(self.stored())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.check()?;
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
