//! Static backup policy, loaded once at startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cron::CronExpr;
use crate::error::{BackupError, BackupResult};
use crate::metadata::BackupType;

/// Cron-style schedule expressions for the recurring backup kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// 5-field cron expression for daily backups.
    pub daily: String,
    /// 5-field cron expression for weekly backups.
    pub weekly: String,
    /// 5-field cron expression for monthly backups.
    pub monthly: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily: "0 3 * * *".to_string(),
            weekly: "0 4 * * 0".to_string(),
            monthly: "0 5 1 * *".to_string(),
        }
    }
}

impl ScheduleConfig {
    pub fn for_type(&self, backup_type: BackupType) -> Option<&str> {
        match backup_type {
            BackupType::Daily => Some(&self.daily),
            BackupType::Weekly => Some(&self.weekly),
            BackupType::Monthly => Some(&self.monthly),
            BackupType::Manual => None,
        }
    }
}

/// Completed-backup counts kept per type before the oldest are purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub daily: u32,
    pub weekly: u32,
    pub monthly: u32,
    pub manual: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            daily: 7,
            weekly: 4,
            monthly: 12,
            manual: 10,
        }
    }
}

impl RetentionConfig {
    pub fn for_type(&self, backup_type: BackupType) -> u32 {
        match backup_type {
            BackupType::Daily => self.daily,
            BackupType::Weekly => self.weekly,
            BackupType::Monthly => self.monthly,
            BackupType::Manual => self.manual,
        }
    }
}

/// Gzip compression policy for the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// Gzip level, 0–9.
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: 6,
        }
    }
}

/// Checksum verification policy (sha-256 over the finished artifact).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub enabled: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Which job outcomes trigger a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub on_success: bool,
    pub on_failure: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            on_success: true,
            on_failure: true,
        }
    }
}

/// Immutable backup policy. The engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Master switch for the scheduler; manual backups work regardless.
    pub enabled: bool,
    /// Directories captured by every backup.
    pub sources: Vec<PathBuf>,
    /// Root under which artifacts and the history catalog live.
    pub storage_root: PathBuf,
    pub schedules: ScheduleConfig,
    pub retention: RetentionConfig,
    pub compression: CompressionConfig,
    pub verification: VerificationConfig,
    pub notifications: NotificationConfig,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sources: Vec::new(),
            storage_root: PathBuf::from("backups"),
            schedules: ScheduleConfig::default(),
            retention: RetentionConfig::default(),
            compression: CompressionConfig::default(),
            verification: VerificationConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl BackupConfig {
    /// Load and validate a JSON config file.
    pub fn from_file(path: &Path) -> BackupResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BackupError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| BackupError::config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Enforce the static invariants the engine relies on.
    pub fn validate(&self) -> BackupResult<()> {
        if self.compression.level > 9 {
            return Err(BackupError::config(format!(
                "compression level must be 0-9 (got {})",
                self.compression.level
            )));
        }
        if self.sources.is_empty() {
            return Err(BackupError::config("at least one source path is required"));
        }
        for expr in [
            &self.schedules.daily,
            &self.schedules.weekly,
            &self.schedules.monthly,
        ] {
            CronExpr::parse(expr)?;
        }
        Ok(())
    }
}
