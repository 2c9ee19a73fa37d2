//! Outbound notification port.
//!
//! The orchestrator calls this at finalize/fail time. Delivery is the
//! transport's problem (e-mail, websocket, whatever implements the trait);
//! a failed notification never changes a backup's recorded outcome.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use keeper_core::{BackupId, BackupMetadata, BackupType, metadata::human_bytes};

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Failure,
}

/// Structured payload handed to the notification transport.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    /// Human-readable text; never contains internal debug dumps.
    pub message: String,
    /// 0 = low, 1 = normal, 2 = high.
    pub priority: u8,
    pub data: NotificationData,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationData {
    pub id: BackupId,
    pub backup_type: BackupType,
    pub duration_ms: u64,
    pub size_bytes: u64,
}

impl Notification {
    pub fn success(meta: &BackupMetadata) -> Self {
        Self {
            kind: NotificationKind::Success,
            title: format!("Backup completed: {}", meta.name),
            message: format!(
                "{} backup finished in {:.1}s ({})",
                meta.backup_type,
                meta.duration().as_secs_f64(),
                human_bytes(meta.size_bytes),
            ),
            priority: 1,
            data: NotificationData::from(meta),
        }
    }

    pub fn failure(meta: &BackupMetadata) -> Self {
        let reason = meta.error.as_deref().unwrap_or("unknown error");
        Self {
            kind: NotificationKind::Failure,
            title: format!("Backup failed: {}", meta.name),
            message: format!("{} backup failed: {reason}", meta.backup_type),
            priority: 2,
            data: NotificationData::from(meta),
        }
    }
}

impl From<&BackupMetadata> for NotificationData {
    fn from(meta: &BackupMetadata) -> Self {
        Self {
            id: meta.id,
            backup_type: meta.backup_type,
            duration_ms: meta.duration_ms,
            size_bytes: meta.size_bytes,
        }
    }
}

/// Outbound notification transport, implemented by an external service.
pub trait NotificationPort: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Default port: writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationPort for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        match notification.kind {
            NotificationKind::Success => info!(
                backup_id = %notification.data.id,
                title = %notification.title,
                "{}", notification.message
            ),
            NotificationKind::Failure => warn!(
                backup_id = %notification.data.id,
                title = %notification.title,
                "{}", notification.message
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_core::BackupStatus;
    use std::time::Duration;

    #[test]
    fn success_message_carries_human_size() {
        let mut meta = BackupMetadata::new(BackupId::new(), BackupType::Manual, "/x".into());
        meta.size_bytes = 1_572_864;
        meta.mark_completed(Duration::from_secs(2));
        let n = Notification::success(&meta);
        assert_eq!(n.kind, NotificationKind::Success);
        assert!(n.message.contains("1.5 MiB"));
        assert_eq!(n.data.size_bytes, 1_572_864);
    }

    #[test]
    fn failure_message_carries_reason_not_debug_dump() {
        let mut meta = BackupMetadata::new(BackupId::new(), BackupType::Daily, "/x".into());
        meta.mark_failed("copy: disk full", Duration::from_millis(10));
        assert_eq!(meta.status, BackupStatus::Failed);
        let n = Notification::failure(&meta);
        assert_eq!(n.priority, 2);
        assert!(n.message.contains("disk full"));
        assert!(!n.message.contains("Io {"));
    }
}
