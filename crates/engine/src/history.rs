//! Durable catalog of finished backup jobs.
//!
//! One JSON record per line in `history.jsonl` under the storage root. The
//! catalog is append-friendly: finishing a job appends a single line; only
//! retention cleanup rewrites the file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use keeper_core::{BackupError, BackupId, BackupMetadata, BackupResult, BackupStatus, BackupType};

const CATALOG_FILE: &str = "history.jsonl";

/// Append-only catalog of completed/failed job metadata.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    entries: Mutex<Vec<BackupMetadata>>,
}

impl HistoryStore {
    /// Open the catalog under `storage_root`, creating the root if needed.
    ///
    /// A missing or corrupt catalog degrades to an empty history; a backup
    /// engine that cannot list old backups is still allowed to make new ones.
    pub fn open(storage_root: &Path) -> BackupResult<Self> {
        fs::create_dir_all(storage_root)
            .map_err(|e| BackupError::storage(format!("cannot create storage root: {e}")))?;
        let path = storage_root.join(CATALOG_FILE);
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => Self::parse_catalog(&raw, &path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read history catalog, starting empty");
                Vec::new()
            }
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn parse_catalog(raw: &str, path: &Path) -> Vec<BackupMetadata> {
        let mut entries = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<BackupMetadata>(line) {
                Ok(meta) => entries.push(meta),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        line = line_no + 1,
                        error = %e,
                        "skipping corrupt history record"
                    );
                }
            }
        }
        entries
    }

    /// Append a finalized record. The record is immutable from here on.
    pub fn append(&self, meta: &BackupMetadata) -> BackupResult<()> {
        let mut entries = self.entries.lock().expect("history lock poisoned");
        let mut line = serde_json::to_string(meta)
            .map_err(|e| BackupError::storage(format!("cannot encode record: {e}")))?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| BackupError::storage(format!("cannot open catalog: {e}")))?;
        file.write_all(line.as_bytes())
            .map_err(|e| BackupError::storage(format!("cannot append record: {e}")))?;
        entries.push(meta.clone());
        Ok(())
    }

    /// All records, newest first.
    pub fn all(&self) -> Vec<BackupMetadata> {
        let mut entries = self.entries.lock().expect("history lock poisoned").clone();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    pub fn get(&self, id: BackupId) -> Option<BackupMetadata> {
        self.entries
            .lock()
            .expect("history lock poisoned")
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    /// Most recent record, optionally restricted to one type.
    pub fn latest(&self, backup_type: Option<BackupType>) -> Option<BackupMetadata> {
        self.entries
            .lock()
            .expect("history lock poisoned")
            .iter()
            .filter(|m| backup_type.is_none_or(|t| m.backup_type == t))
            .max_by_key(|m| m.created_at)
            .cloned()
    }

    pub fn count_by_type(&self, backup_type: BackupType, status: BackupStatus) -> usize {
        self.entries
            .lock()
            .expect("history lock poisoned")
            .iter()
            .filter(|m| m.backup_type == backup_type && m.status == status)
            .count()
    }

    /// Completed records of one type, oldest first (retention scan order).
    pub fn completed_ascending(&self, backup_type: BackupType) -> Vec<BackupMetadata> {
        let mut entries: Vec<_> = self
            .entries
            .lock()
            .expect("history lock poisoned")
            .iter()
            .filter(|m| m.backup_type == backup_type && m.status == BackupStatus::Completed)
            .cloned()
            .collect();
        entries.sort_by_key(|m| m.created_at);
        entries
    }

    /// Remove a record (retention cleanup). Rewrites the catalog file.
    pub fn remove(&self, id: BackupId) -> BackupResult<Option<BackupMetadata>> {
        let mut entries = self.entries.lock().expect("history lock poisoned");
        let Some(pos) = entries.iter().position(|m| m.id == id) else {
            return Ok(None);
        };
        let removed = entries.remove(pos);
        let mut buf = String::new();
        for meta in entries.iter() {
            let line = serde_json::to_string(meta)
                .map_err(|e| BackupError::storage(format!("cannot encode record: {e}")))?;
            buf.push_str(&line);
            buf.push('\n');
        }
        // Write-then-rename so a crash mid-rewrite cannot truncate the catalog.
        let tmp = self.path.with_extension("jsonl.tmp");
        fs::write(&tmp, buf)
            .map_err(|e| BackupError::storage(format!("cannot rewrite catalog: {e}")))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| BackupError::storage(format!("cannot replace catalog: {e}")))?;
        Ok(Some(removed))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("history lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn completed(backup_type: BackupType) -> BackupMetadata {
        let id = BackupId::new();
        let mut meta = BackupMetadata::new(id, backup_type, format!("/tmp/{id}").into());
        meta.mark_completed(Duration::from_millis(100));
        meta
    }

    #[test]
    fn append_and_reload_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let a = completed(BackupType::Daily);
        let b = completed(BackupType::Manual);
        {
            let store = HistoryStore::open(dir.path()).unwrap();
            store.append(&a).unwrap();
            store.append(&b).unwrap();
        }
        let store = HistoryStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(a.id).unwrap(), a);
        assert_eq!(store.latest(Some(BackupType::Manual)).unwrap().id, b.id);
    }

    #[test]
    fn all_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        let mut old = completed(BackupType::Daily);
        old.created_at -= chrono::Duration::hours(1);
        let new = completed(BackupType::Daily);
        store.append(&old).unwrap();
        store.append(&new).unwrap();

        let all = store.all();
        assert_eq!(all[0].id, new.id);
        assert_eq!(all[1].id, old.id);
    }

    #[test]
    fn corrupt_lines_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let meta = completed(BackupType::Weekly);
        let catalog = dir.path().join(CATALOG_FILE);
        let good = serde_json::to_string(&meta).unwrap();
        std::fs::write(&catalog, format!("{{not json\n{good}\n???\n")).unwrap();

        let store = HistoryStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(meta.id).unwrap().id, meta.id);
    }

    #[test]
    fn missing_catalog_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        assert!(store.is_empty());
        assert!(store.latest(None).is_none());
    }

    #[test]
    fn remove_drops_record_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let a = completed(BackupType::Daily);
        let b = completed(BackupType::Daily);
        {
            let store = HistoryStore::open(dir.path()).unwrap();
            store.append(&a).unwrap();
            store.append(&b).unwrap();
            assert!(store.remove(a.id).unwrap().is_some());
            assert!(store.remove(a.id).unwrap().is_none());
        }
        let store = HistoryStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get(a.id).is_none());
        assert!(store.get(b.id).is_some());
    }

    #[test]
    fn count_by_type_distinguishes_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        store.append(&completed(BackupType::Daily)).unwrap();

        let mut failed = BackupMetadata::new(BackupId::new(), BackupType::Daily, "/x".into());
        failed.mark_failed("boom", Duration::from_millis(10));
        store.append(&failed).unwrap();

        assert_eq!(store.count_by_type(BackupType::Daily, BackupStatus::Completed), 1);
        assert_eq!(store.count_by_type(BackupType::Daily, BackupStatus::Failed), 1);
        assert_eq!(store.count_by_type(BackupType::Weekly, BackupStatus::Completed), 0);
    }
}
