//! In-memory table of in-flight jobs.

use std::collections::HashMap;
use std::sync::RwLock;

use keeper_core::{BackupId, BackupProgress};

/// Live progress snapshots keyed by job id.
///
/// Writers hold the lock only while mutating the map, so concurrent readers
/// observe either the pre- or post-update snapshot, never a torn one. With
/// the single-job invariant the map holds at most one entry in practice, but
/// nothing here depends on that.
#[derive(Debug, Default)]
pub struct ProgressRegistry {
    jobs: RwLock<HashMap<BackupId, BackupProgress>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job at the start of its pipeline.
    pub fn insert(&self, progress: BackupProgress) {
        self.jobs
            .write()
            .expect("progress registry lock poisoned")
            .insert(progress.id, progress);
    }

    /// Mutate a job's snapshot in place; returns the updated snapshot so the
    /// caller can publish it without re-reading.
    pub fn update(
        &self,
        id: BackupId,
        f: impl FnOnce(&mut BackupProgress),
    ) -> Option<BackupProgress> {
        let mut jobs = self.jobs.write().expect("progress registry lock poisoned");
        let progress = jobs.get_mut(&id)?;
        f(progress);
        Some(progress.clone())
    }

    pub fn get(&self, id: BackupId) -> Option<BackupProgress> {
        self.jobs
            .read()
            .expect("progress registry lock poisoned")
            .get(&id)
            .cloned()
    }

    /// All in-flight jobs, oldest first.
    pub fn active(&self) -> Vec<BackupProgress> {
        let mut jobs: Vec<_> = self
            .jobs
            .read()
            .expect("progress registry lock poisoned")
            .values()
            .cloned()
            .collect();
        jobs.sort_by_key(|p| p.started_at);
        jobs
    }

    /// Drop a terminated job. Returns the final snapshot, if any.
    pub fn remove(&self, id: BackupId) -> Option<BackupProgress> {
        self.jobs
            .write()
            .expect("progress registry lock poisoned")
            .remove(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.jobs
            .read()
            .expect("progress registry lock poisoned")
            .is_empty()
    }
}
