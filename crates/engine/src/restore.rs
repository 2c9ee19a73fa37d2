//! Reconstructing a cataloged backup at a target location.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use keeper_core::{BackupError, BackupId, BackupResult};

use crate::history::HistoryStore;
use crate::stages;

/// Outcome of a successful restore.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub id: BackupId,
    pub target: PathBuf,
    pub files_restored: u64,
    pub duration_ms: u64,
}

/// Rebuilds the original file tree from a cataloged artifact.
pub struct RestoreEngine {
    history: Arc<HistoryStore>,
    /// Default parent for restores when the caller names no target.
    restore_root: PathBuf,
}

impl RestoreEngine {
    pub fn new(history: Arc<HistoryStore>, restore_root: PathBuf) -> Self {
        Self {
            history,
            restore_root,
        }
    }

    /// Restore backup `id` into `target` (default: `<restore_root>/<id>`).
    ///
    /// - `NotFound` for an unknown id or a missing artifact.
    /// - `Conflict` when the target exists and is not an empty directory;
    ///   an existing tree is never silently overwritten.
    /// - `VerificationFailure` when the artifact no longer matches its
    ///   recorded checksum; corrupt data is never restored.
    pub async fn restore(
        &self,
        id: BackupId,
        target: Option<PathBuf>,
    ) -> BackupResult<RestoreReport> {
        let meta = self.history.get(id).ok_or(BackupError::NotFound)?;
        let target = target.unwrap_or_else(|| self.restore_root.join(id.to_string()));
        let started = Instant::now();

        let location = meta.location.clone();
        let compressed = meta.compressed;
        let checksum = meta.checksum.clone();
        let target_path = target.clone();

        let files_restored = tokio::task::spawn_blocking(move || {
            if !location.exists() {
                return Err(BackupError::NotFound);
            }
            if !stages::is_available_target(&target_path)? {
                return Err(BackupError::conflict(format!(
                    "restore target {} is not empty",
                    target_path.display()
                )));
            }

            // Re-validate integrity before touching the target.
            if let Some(expected) = checksum {
                let actual = stages::checksum_artifact(&location, compressed)?;
                if actual != expected {
                    return Err(BackupError::verification(format!(
                        "artifact checksum mismatch for backup {id}"
                    )));
                }
            }

            if compressed {
                stages::extract_archive(&location, &target_path)?;
            } else {
                stages::copy_tree(&location, &target_path)?;
            }

            let mut files = 0u64;
            for entry in walkdir::WalkDir::new(&target_path)
                .into_iter()
                .filter_map(Result::ok)
            {
                if entry.file_type().is_file() {
                    files += 1;
                }
            }
            Ok(files)
        })
        .await
        .map_err(|e| BackupError::io("restore", std::io::Error::other(e)))??;

        let report = RestoreReport {
            id,
            target,
            files_restored,
            duration_ms: started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64,
        };
        info!(
            backup_id = %id,
            target = %report.target.display(),
            files = report.files_restored,
            "restore completed"
        );
        Ok(report)
    }
}
