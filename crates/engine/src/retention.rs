//! Retention policy enforcement.

use std::fs;
use std::io;
use std::sync::Arc;

use tracing::{info, warn};

use keeper_core::{BackupMetadata, BackupType, config::RetentionConfig};

use crate::history::HistoryStore;

/// Purges the oldest completed backups of a type beyond its retention count.
///
/// An artifact and its catalog record are deleted together; if the artifact
/// cannot be removed (other than already being gone) the record is kept so
/// the pair never splits.
#[derive(Debug, Clone)]
pub struct RetentionManager {
    history: Arc<HistoryStore>,
    retention: RetentionConfig,
}

impl RetentionManager {
    pub fn new(history: Arc<HistoryStore>, retention: RetentionConfig) -> Self {
        Self { history, retention }
    }

    /// Delete expired backups of `backup_type`. Returns how many were purged.
    ///
    /// A single failed deletion is logged and skipped; it never aborts
    /// cleanup of the remaining candidates. Running twice with no new
    /// backups is a no-op.
    pub fn cleanup(&self, backup_type: BackupType) -> usize {
        let keep = self.retention.for_type(backup_type) as usize;
        let completed = self.history.completed_ascending(backup_type);
        if completed.len() <= keep {
            return 0;
        }

        let expired = completed.len() - keep;
        let mut purged = 0;
        for meta in completed.into_iter().take(expired) {
            if let Err(e) = self.delete_artifact(&meta) {
                warn!(
                    backup_id = %meta.id,
                    location = %meta.location.display(),
                    error = %e,
                    "cannot delete expired artifact, keeping its record"
                );
                continue;
            }
            match self.history.remove(meta.id) {
                Ok(_) => {
                    purged += 1;
                    info!(
                        backup_id = %meta.id,
                        backup_type = %backup_type,
                        "purged expired backup"
                    );
                }
                Err(e) => {
                    warn!(backup_id = %meta.id, error = %e, "cannot remove history record");
                }
            }
        }
        purged
    }

    /// Remove the artifact from storage. An already-missing artifact counts
    /// as deleted.
    fn delete_artifact(&self, meta: &BackupMetadata) -> io::Result<()> {
        let result = if meta.location.is_dir() {
            fs::remove_dir_all(&meta.location)
        } else {
            fs::remove_file(&meta.location)
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
