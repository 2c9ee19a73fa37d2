//! Recurring backup triggers.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use keeper_core::{BackupResult, BackupType, CronExpr};

use crate::orchestrator::BackupOrchestrator;

/// Time source, injectable so next-fire computation is testable.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Holds the daily/weekly/monthly triggers and fires the orchestrator when
/// they come due.
///
/// Trigger errors are logged, never propagated: one failed (or skipped)
/// scheduled run must not prevent the next. `start` cancels any existing
/// triggers first, so re-registration after a config reload cannot double
/// -fire; `stop` is idempotent.
pub struct Scheduler {
    orchestrator: Arc<BackupOrchestrator>,
    clock: Arc<dyn Clock>,
    triggers: Vec<(BackupType, CronExpr)>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<BackupOrchestrator>) -> BackupResult<Self> {
        Self::with_clock(orchestrator, Arc::new(SystemClock))
    }

    /// Build the trigger table from the orchestrator's config. A disabled
    /// config yields a scheduler with no triggers (manual backups only).
    pub fn with_clock(
        orchestrator: Arc<BackupOrchestrator>,
        clock: Arc<dyn Clock>,
    ) -> BackupResult<Self> {
        let config = orchestrator.config();
        let mut triggers = Vec::new();
        if config.enabled {
            for backup_type in BackupType::SCHEDULED {
                if let Some(raw) = config.schedules.for_type(backup_type) {
                    triggers.push((backup_type, CronExpr::parse(raw)?));
                }
            }
        }
        Ok(Self {
            orchestrator,
            clock,
            triggers,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn one trigger task per schedule, cancelling any previous set.
    pub fn start(&self) {
        self.stop();
        let mut tasks = self.tasks.lock().expect("scheduler lock poisoned");
        for (backup_type, expr) in &self.triggers {
            let orchestrator = Arc::clone(&self.orchestrator);
            let clock = Arc::clone(&self.clock);
            let backup_type = *backup_type;
            let expr = expr.clone();
            info!(backup_type = %backup_type, schedule = expr.raw(), "trigger registered");
            tasks.push(tokio::spawn(trigger_loop(
                orchestrator,
                clock,
                backup_type,
                expr,
            )));
        }
    }

    /// Cancel all pending triggers. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut tasks = self.tasks.lock().expect("scheduler lock poisoned");
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    /// Upcoming fire time per trigger, for the statistics surface.
    pub fn next_fire_times(&self) -> Vec<(BackupType, DateTime<Utc>)> {
        let now = self.clock.now();
        self.triggers
            .iter()
            .filter_map(|(backup_type, expr)| {
                expr.next_after(now).map(|at| (*backup_type, at))
            })
            .collect()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn trigger_loop(
    orchestrator: Arc<BackupOrchestrator>,
    clock: Arc<dyn Clock>,
    backup_type: BackupType,
    expr: CronExpr,
) {
    loop {
        let now = clock.now();
        let Some(next) = expr.next_after(now) else {
            warn!(backup_type = %backup_type, schedule = expr.raw(), "schedule never fires");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        // Fire-and-forget: errors are logged so one failed run cannot take
        // down the trigger.
        match orchestrator.create(backup_type).await {
            Ok(meta) => {
                info!(backup_id = %meta.id, backup_type = %backup_type, "scheduled backup completed");
            }
            Err(e) if e.is_conflict() => {
                warn!(backup_type = %backup_type, "scheduled backup skipped, engine busy");
            }
            Err(e) => {
                error!(backup_type = %backup_type, error = %e, "scheduled backup failed");
            }
        }
    }
}
