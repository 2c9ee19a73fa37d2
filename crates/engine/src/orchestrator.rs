//! The backup orchestrator: one job at a time through the staged pipeline.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{error, info, warn};

use keeper_core::{
    BackupConfig, BackupError, BackupId, BackupMetadata, BackupProgress, BackupResult, BackupType,
    ProgressStage,
};
use keeper_events::{EventBus, ProgressBus};

use crate::history::HistoryStore;
use crate::notify::{Notification, NotificationPort};
use crate::registry::ProgressRegistry;
use crate::retention::RetentionManager;
use crate::stages;

/// The single-job lock.
///
/// At most one backup pipeline runs system-wide; a second `create` fails
/// fast with `Conflict` instead of queueing. Release happens in
/// [`SlotGuard::drop`], so a panicking pipeline can never wedge the engine
/// in an always-busy state.
#[derive(Debug, Default)]
pub struct JobSlot {
    active: Mutex<Option<BackupId>>,
}

impl JobSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `id`, or fail with `Conflict` if a job holds it.
    pub fn acquire(self: &Arc<Self>, id: BackupId) -> BackupResult<SlotGuard> {
        let mut active = self.active.lock().expect("job slot lock poisoned");
        if active.is_some() {
            return Err(BackupError::busy());
        }
        *active = Some(id);
        Ok(SlotGuard {
            slot: Arc::clone(self),
        })
    }

    /// Id of the currently running job, if any.
    pub fn active(&self) -> Option<BackupId> {
        *self.active.lock().expect("job slot lock poisoned")
    }
}

/// Releases the slot on drop, on every exit path including panic.
#[derive(Debug)]
pub struct SlotGuard {
    slot: Arc<JobSlot>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.slot.active.lock() {
            *active = None;
        }
    }
}

/// Drives a backup job through analyze → prepare → copy → compress → verify
/// → finalize, publishing a progress snapshot after every step.
pub struct BackupOrchestrator {
    config: BackupConfig,
    registry: Arc<ProgressRegistry>,
    history: Arc<HistoryStore>,
    retention: RetentionManager,
    bus: Arc<ProgressBus>,
    notifier: Arc<dyn NotificationPort>,
    slot: Arc<JobSlot>,
}

impl BackupOrchestrator {
    /// Build an orchestrator over a validated config, opening (or creating)
    /// the history catalog under the storage root.
    pub fn new(config: BackupConfig, notifier: Arc<dyn NotificationPort>) -> BackupResult<Self> {
        config.validate()?;
        let history = Arc::new(HistoryStore::open(&config.storage_root)?);
        let retention = RetentionManager::new(Arc::clone(&history), config.retention);
        Ok(Self {
            config,
            registry: Arc::new(ProgressRegistry::new()),
            history,
            retention,
            bus: Arc::new(ProgressBus::new()),
            notifier,
            slot: Arc::new(JobSlot::new()),
        })
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProgressRegistry> {
        &self.registry
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn bus(&self) -> &Arc<ProgressBus> {
        &self.bus
    }

    pub fn slot(&self) -> &Arc<JobSlot> {
        &self.slot
    }

    /// Run one backup job to completion or failure.
    ///
    /// Fails immediately with `Conflict` while another job is active. On any
    /// stage failure the job is finalized as `failed` (history record, terminal
    /// progress event, failure notification) and the error is returned so a
    /// manual caller sees it; scheduled triggers log it instead.
    pub async fn create(&self, backup_type: BackupType) -> BackupResult<BackupMetadata> {
        let id = BackupId::new();
        let _guard = self.slot.acquire(id)?;
        let started = Instant::now();
        let staging = self.config.storage_root.join(id.to_string());
        let mut meta = BackupMetadata::new(id, backup_type, staging);

        info!(backup_id = %id, backup_type = %backup_type, name = %meta.name, "backup started");

        let mut progress = BackupProgress::new(id);
        progress.started_at = meta.created_at;
        self.registry.insert(progress);
        self.publish(id, |p| p.advance(ProgressStage::Preparing, 0));

        match self.run_pipeline(&mut meta).await {
            Ok(()) => {
                meta.mark_completed(started.elapsed());
                // Terminate the job before surfacing a catalog failure, so the
                // registry and bus always see the terminal snapshot.
                let appended = self.history.append(&meta);
                self.finish_job(id, ProgressStage::Completed);
                if let Err(e) = appended {
                    error!(backup_id = %id, error = %e, "cannot record completed backup");
                    return Err(e);
                }

                let purged = self.retention.cleanup(backup_type);
                if purged > 0 {
                    info!(backup_type = %backup_type, purged, "retention cleanup");
                }
                self.send_notification(
                    Notification::success(&meta),
                    self.config.notifications.on_success,
                );
                info!(
                    backup_id = %id,
                    size = %meta.human_size(),
                    duration_ms = meta.duration_ms,
                    "backup completed"
                );
                Ok(meta)
            }
            Err(e) => {
                meta.mark_failed(e.to_string(), started.elapsed());
                if let Err(append_err) = self.history.append(&meta) {
                    error!(backup_id = %id, error = %append_err, "cannot record failed backup");
                }
                self.finish_job(id, ProgressStage::Failed);
                self.discard_partial_artifact(id);
                self.send_notification(
                    Notification::failure(&meta),
                    self.config.notifications.on_failure,
                );
                error!(backup_id = %id, error = %e, "backup failed");
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, meta: &mut BackupMetadata) -> BackupResult<()> {
        let id = meta.id;
        let sources = self.config.sources.clone();
        let staging = meta.location.clone();

        // Analyze: totals drive the percentage math of later stages. Failure
        // here aborts before any data is touched.
        let totals = blocking("analyze", {
            let sources = sources.clone();
            move || stages::analyze_sources(&sources)
        })
        .await?;
        meta.file_count = totals.files;
        meta.dir_count = totals.dirs;
        self.publish(id, |p| {
            p.files_total = totals.files;
            p.bytes_total = totals.bytes;
        });

        // Prepare the staging directory.
        blocking("prepare", {
            let staging = staging.clone();
            move || stages::prepare_destination(&staging)
        })
        .await?;

        // Copy: 0-50% of overall progress.
        let registry = Arc::clone(&self.registry);
        let bus = Arc::clone(&self.bus);
        let bytes_total = totals.bytes;
        blocking("copy", {
            let sources = sources.clone();
            let staging = staging.clone();
            move || {
                stages::copy_sources(&sources, &staging, |path, files_done, bytes_done| {
                    let percent = if bytes_total == 0 {
                        50
                    } else {
                        ((bytes_done.min(bytes_total) * 50) / bytes_total) as u8
                    };
                    if let Some(snapshot) = registry.update(id, |p| {
                        p.advance(ProgressStage::Copying, percent);
                        p.record_copied(path.to_path_buf(), files_done, bytes_done);
                    }) {
                        let _ = bus.publish(snapshot);
                    }
                })
            }
        })
        .await?;

        // Compress: 50-80%, bypassed (not entered) when disabled.
        if self.config.compression.enabled {
            self.publish(id, |p| p.advance(ProgressStage::Compressing, 50));
            let archive = self
                .config
                .storage_root
                .join(format!("{id}.tar.gz"));
            let registry = Arc::clone(&self.registry);
            let bus = Arc::clone(&self.bus);
            let level = self.config.compression.level;
            blocking("compress", {
                let staging = staging.clone();
                let archive = archive.clone();
                move || {
                    stages::compress_staging(&staging, &archive, level, |done, total| {
                        let percent = 50 + ((done * 30) / total.max(1)) as u8;
                        if let Some(snapshot) =
                            registry.update(id, |p| p.advance(ProgressStage::Compressing, percent))
                        {
                            let _ = bus.publish(snapshot);
                        }
                    })?;
                    // The staged tree is superseded by the archive.
                    std::fs::remove_dir_all(&staging)
                        .map_err(|e| BackupError::io("compress", e))
                }
            })
            .await?;
            meta.location = archive;
            meta.mark_compressed();
            self.publish(id, |p| p.advance(ProgressStage::Compressing, 80));
        }

        // Verify: 80-100%, bypassed when disabled. A compressed artifact is
        // read end to end (gzip CRC + tar structure) and its entry count
        // compared against what was copied; then the checksum is recorded.
        if self.config.verification.enabled {
            self.publish(id, |p| p.advance(ProgressStage::Verifying, 80));
            if meta.compressed {
                let entries = blocking("verify", {
                    let archive = meta.location.clone();
                    move || stages::verify_archive(&archive)
                })
                .await?;
                if entries != meta.file_count {
                    return Err(BackupError::verification(format!(
                        "archive holds {entries} files, expected {}",
                        meta.file_count
                    )));
                }
            }
            let checksum = blocking("verify", {
                let location = meta.location.clone();
                let compressed = meta.compressed;
                move || stages::checksum_artifact(&location, compressed)
            })
            .await?;
            meta.mark_verified(checksum);
            self.publish(id, |p| p.advance(ProgressStage::Verifying, 95));
        }

        meta.size_bytes = blocking("finalize", {
            let location = meta.location.clone();
            move || stages::artifact_size(&location)
        })
        .await?;
        Ok(())
    }

    /// Publish the terminal snapshot, then drop the job from the registry.
    /// Subscribers are guaranteed one final event per job.
    fn finish_job(&self, id: BackupId, stage: ProgressStage) {
        if let Some(snapshot) = self.registry.update(id, |p| p.finish(stage)) {
            let _ = self.bus.publish(snapshot);
        }
        self.registry.remove(id);
    }

    fn publish(&self, id: BackupId, f: impl FnOnce(&mut BackupProgress)) {
        if let Some(snapshot) = self.registry.update(id, f)
            && self.bus.publish(snapshot).is_err()
        {
            warn!(backup_id = %id, "progress bus unavailable");
        }
    }

    /// Best-effort removal of whatever a failed pipeline left behind: the
    /// staging directory, the half-written archive, or both. A failed job has
    /// no catalog record, so nothing else would ever reclaim this space.
    fn discard_partial_artifact(&self, id: BackupId) {
        let staging = self.config.storage_root.join(id.to_string());
        if let Err(e) = std::fs::remove_dir_all(&staging)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(backup_id = %id, error = %e, "cannot discard partial staging directory");
        }
        let archive = self.config.storage_root.join(format!("{id}.tar.gz"));
        if let Err(e) = std::fs::remove_file(&archive)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(backup_id = %id, error = %e, "cannot discard partial archive");
        }
    }

    fn send_notification(&self, notification: Notification, enabled: bool) {
        if !enabled {
            return;
        }
        if let Err(e) = self.notifier.notify(&notification) {
            warn!(error = %e, "notification delivery failed; backup outcome unaffected");
        }
    }
}

/// Run a blocking stage on the blocking pool; a panicked task surfaces as a
/// stage I/O error rather than poisoning the orchestrator.
async fn blocking<T, F>(stage: &'static str, f: F) -> BackupResult<T>
where
    F: FnOnce() -> BackupResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BackupError::io(stage, std::io::Error::other(e)))?
}
