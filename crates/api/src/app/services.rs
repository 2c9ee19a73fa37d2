//! Engine wiring shared by all request handlers.

use std::sync::Arc;

use keeper_core::{BackupConfig, BackupResult};
use keeper_engine::{
    BackupOrchestrator, BackupStats, LogNotifier, RestoreEngine, ScheduledRun, Scheduler, stats,
};

/// Explicitly constructed service graph: one orchestrator, one scheduler,
/// one restore engine. Tests build isolated instances instead of sharing
/// process-global state.
pub struct AppServices {
    orchestrator: Arc<BackupOrchestrator>,
    scheduler: Scheduler,
    restore: RestoreEngine,
}

impl AppServices {
    pub fn new(config: BackupConfig) -> BackupResult<Self> {
        let restore_root = config.storage_root.join("restore");
        let orchestrator = Arc::new(BackupOrchestrator::new(config, Arc::new(LogNotifier))?);
        let scheduler = Scheduler::new(Arc::clone(&orchestrator))?;
        let restore = RestoreEngine::new(Arc::clone(orchestrator.history()), restore_root);
        Ok(Self {
            orchestrator,
            scheduler,
            restore,
        })
    }

    /// Register the recurring backup triggers.
    pub fn start(&self) {
        self.scheduler.start();
    }

    /// Cancel all pending triggers. Idempotent.
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    pub fn orchestrator(&self) -> &Arc<BackupOrchestrator> {
        &self.orchestrator
    }

    pub fn restore_engine(&self) -> &RestoreEngine {
        &self.restore
    }

    /// Read-only statistics over the catalog plus upcoming schedule.
    pub fn stats(&self) -> BackupStats {
        let next_scheduled = self
            .scheduler
            .next_fire_times()
            .into_iter()
            .map(|(backup_type, at)| ScheduledRun { backup_type, at })
            .collect();
        stats::compute(self.orchestrator.history(), next_scheduled)
    }
}
