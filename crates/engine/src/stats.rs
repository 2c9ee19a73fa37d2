//! Derived, read-only statistics over the catalog.

use chrono::{DateTime, Utc};
use serde::Serialize;

use keeper_core::{BackupStatus, BackupType};

use crate::history::HistoryStore;

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledRun {
    pub backup_type: BackupType,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupStats {
    pub total_backups: usize,
    /// Percentage of jobs that completed, 0-100.
    pub success_rate: f64,
    /// Bytes held by completed backups.
    pub total_size_bytes: u64,
    /// Mean pipeline duration over completed backups.
    pub average_duration_ms: u64,
    pub last_backup: Option<DateTime<Utc>>,
    pub next_scheduled: Vec<ScheduledRun>,
}

/// Aggregate the catalog into the statistics surface.
pub fn compute(history: &HistoryStore, next_scheduled: Vec<ScheduledRun>) -> BackupStats {
    let all = history.all();
    let completed: Vec<_> = all
        .iter()
        .filter(|m| m.status == BackupStatus::Completed)
        .collect();

    let success_rate = if all.is_empty() {
        0.0
    } else {
        (completed.len() as f64 / all.len() as f64) * 100.0
    };
    let average_duration_ms = if completed.is_empty() {
        0
    } else {
        completed.iter().map(|m| m.duration_ms).sum::<u64>() / completed.len() as u64
    };

    BackupStats {
        total_backups: all.len(),
        success_rate,
        total_size_bytes: completed.iter().map(|m| m.size_bytes).sum(),
        average_duration_ms,
        last_backup: all.first().map(|m| m.created_at),
        next_scheduled,
    }
}
