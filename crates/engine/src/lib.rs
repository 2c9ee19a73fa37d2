//! `keeper-engine` — backup orchestration core.
//!
//! ## Components
//!
//! - [`registry::ProgressRegistry`]: in-memory table of in-flight jobs
//! - [`history::HistoryStore`]: durable append-only catalog of finished jobs
//! - [`retention::RetentionManager`]: per-type purge of expired backups
//! - [`orchestrator::BackupOrchestrator`]: drives one job through the
//!   analyze → prepare → copy → compress → verify → finalize pipeline under a
//!   single-job lock
//! - [`scheduler::Scheduler`]: cron-style recurring triggers
//! - [`restore::RestoreEngine`]: reconstructs a cataloged backup
//! - [`notify::NotificationPort`]: outbound success/failure notifications

pub mod history;
pub mod notify;
pub mod orchestrator;
pub mod registry;
pub mod restore;
pub mod retention;
pub mod scheduler;
pub mod stages;
pub mod stats;

pub use history::HistoryStore;
pub use notify::{LogNotifier, Notification, NotificationKind, NotificationPort, NotifyError};
pub use orchestrator::{BackupOrchestrator, JobSlot};
pub use registry::ProgressRegistry;
pub use restore::{RestoreEngine, RestoreReport};
pub use retention::RetentionManager;
pub use scheduler::{Clock, Scheduler, SystemClock};
pub use stats::{BackupStats, ScheduledRun};
