//! Snapshot Store
//!
//! Holds the most recently published [`Snapshot`]. Publishing swaps an
//! `Arc` under a short write lock; readers clone the `Arc` and never see a
//! snapshot that mixes two cycles.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::domain::ports::Snapshot;

/// Shared holder of the current snapshot
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    /// A store holding the empty startup snapshot.
    pub fn new() -> Self {
        Self::with_snapshot(Snapshot::empty())
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Replace the visible snapshot. Returns the published reference.
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        let previous = std::mem::replace(&mut *self.current.write(), Arc::clone(&snapshot));

        debug!(
            cycle = snapshot.cycle,
            previous_cycle = previous.cycle,
            projects = snapshot.len(),
            "Published snapshot"
        );
        snapshot
    }

    /// The currently visible snapshot.
    pub fn read(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }
}
