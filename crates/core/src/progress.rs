//! Ephemeral per-job progress snapshot.
//!
//! One `BackupProgress` exists per in-flight job, held by the progress
//! registry and broadcast on the event bus after every stage step. It is
//! discarded at termination; only the metadata record survives.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::BackupId;

/// Pipeline stage reflected in progress snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    Preparing,
    Copying,
    Compressing,
    Verifying,
    Completed,
    Failed,
}

impl ProgressStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Live snapshot of an in-flight backup job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupProgress {
    pub id: BackupId,
    pub stage: ProgressStage,
    /// Overall percentage, 0–100, monotonically non-decreasing per job.
    pub percent: u8,
    /// File currently being processed, if any.
    pub current_file: Option<PathBuf>,
    pub files_processed: u64,
    pub files_total: u64,
    pub bytes_processed: u64,
    pub bytes_total: u64,
    pub started_at: DateTime<Utc>,
    /// Naive linear estimate; absent until enough bytes have moved.
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl BackupProgress {
    pub fn new(id: BackupId) -> Self {
        Self {
            id,
            stage: ProgressStage::Preparing,
            percent: 0,
            current_file: None,
            files_processed: 0,
            files_total: 0,
            bytes_processed: 0,
            bytes_total: 0,
            started_at: Utc::now(),
            estimated_completion: None,
        }
    }

    /// Move to `stage` at `percent`.
    ///
    /// The percentage is clamped so it never regresses: a stage that reports
    /// a lower value than a previous snapshot keeps the previous value.
    pub fn advance(&mut self, stage: ProgressStage, percent: u8) {
        self.stage = stage;
        self.percent = self.percent.max(percent.min(100));
    }

    /// Update byte/file counters during the copy stage and refresh the
    /// completion estimate.
    pub fn record_copied(&mut self, file: PathBuf, files_processed: u64, bytes_processed: u64) {
        self.current_file = Some(file);
        self.files_processed = files_processed;
        self.bytes_processed = bytes_processed;
        self.estimated_completion = self.estimate();
    }

    /// Terminal snapshot for a finished job.
    pub fn finish(&mut self, stage: ProgressStage) {
        debug_assert!(stage.is_terminal());
        self.stage = stage;
        if stage == ProgressStage::Completed {
            self.percent = 100;
        }
        self.current_file = None;
        self.estimated_completion = None;
    }

    fn estimate(&self) -> Option<DateTime<Utc>> {
        if self.bytes_processed == 0 || self.bytes_total == 0 {
            return None;
        }
        let elapsed = (Utc::now() - self.started_at).num_milliseconds().max(1);
        let total_ms =
            (elapsed as f64) * (self.bytes_total as f64) / (self.bytes_processed as f64);
        Some(self.started_at + chrono::Duration::milliseconds(total_ms as i64))
    }
}
