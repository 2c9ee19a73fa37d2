//! Durable per-job metadata: the record that survives in the history catalog.

use core::str::FromStr;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackupError;
use crate::id::BackupId;

/// Kind of backup, each with its own schedule and retention count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Daily,
    Weekly,
    Monthly,
    Manual,
}

impl BackupType {
    /// The three scheduled kinds (everything except `Manual`).
    pub const SCHEDULED: [Self; 3] = [Self::Daily, Self::Weekly, Self::Monthly];

    /// All kinds, in retention-scan order.
    pub const ALL: [Self; 4] = [Self::Daily, Self::Weekly, Self::Monthly, Self::Manual];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Manual => "manual",
        }
    }
}

impl core::fmt::Display for BackupType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupType {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "manual" => Ok(Self::Manual),
            other => Err(BackupError::invalid_argument(format!(
                "backup type must be one of daily, weekly, monthly, manual (got '{other}')"
            ))),
        }
    }
}

/// Job lifecycle status recorded in metadata.
///
/// `Completed` and `Failed` are terminal; the intermediate states track how
/// far the pipeline got before the record was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Created,
    Compressed,
    Verified,
    Completed,
    Failed,
}

impl BackupStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One backup job's durable record.
///
/// Owned and mutated exclusively by the orchestrator while the job runs;
/// immutable once appended to the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// Unique job id (also names the artifact on disk).
    pub id: BackupId,
    /// Human-readable name, e.g. `daily-2026-08-24-0300`.
    pub name: String,
    /// Kind of backup.
    pub backup_type: BackupType,
    /// When the job started.
    pub created_at: DateTime<Utc>,
    /// Total artifact size in bytes.
    pub size_bytes: u64,
    /// Whether the artifact is a compressed archive rather than a plain tree.
    pub compressed: bool,
    /// Hex sha-256 over the artifact, when verification ran.
    pub checksum: Option<String>,
    /// Files captured.
    pub file_count: u64,
    /// Directories captured.
    pub dir_count: u64,
    /// Wall-clock pipeline duration in milliseconds.
    pub duration_ms: u64,
    /// Lifecycle status.
    pub status: BackupStatus,
    /// Failure message, for `status = failed`.
    pub error: Option<String>,
    /// Artifact path under the storage root.
    pub location: PathBuf,
}

impl BackupMetadata {
    /// Create the initial record at job start.
    pub fn new(id: BackupId, backup_type: BackupType, location: PathBuf) -> Self {
        let created_at = Utc::now();
        Self {
            id,
            name: format!("{}-{}", backup_type, created_at.format("%Y-%m-%d-%H%M%S")),
            backup_type,
            created_at,
            size_bytes: 0,
            compressed: false,
            checksum: None,
            file_count: 0,
            dir_count: 0,
            duration_ms: 0,
            status: BackupStatus::Created,
            error: None,
            location,
        }
    }

    pub fn mark_compressed(&mut self) {
        self.compressed = true;
        self.status = BackupStatus::Compressed;
    }

    pub fn mark_verified(&mut self, checksum: String) {
        self.checksum = Some(checksum);
        self.status = BackupStatus::Verified;
    }

    /// Finalize a successful job.
    pub fn mark_completed(&mut self, duration: Duration) {
        self.duration_ms = duration.as_millis().min(u128::from(u64::MAX)) as u64;
        self.status = BackupStatus::Completed;
    }

    /// Finalize a failed job with the partial duration up to the failure.
    pub fn mark_failed(&mut self, error: impl Into<String>, duration: Duration) {
        self.duration_ms = duration.as_millis().min(u128::from(u64::MAX)) as u64;
        self.status = BackupStatus::Failed;
        self.error = Some(error.into());
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Artifact size formatted for humans, e.g. `1.2 MiB`.
    pub fn human_size(&self) -> String {
        human_bytes(self.size_bytes)
    }
}

/// Format a byte count for notification/UI text.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
