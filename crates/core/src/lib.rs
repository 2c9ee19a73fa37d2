//! `keeper-core` — backup domain building blocks.
//!
//! This crate contains **pure domain** primitives (no filesystem or runtime
//! concerns): identifiers, the metadata/progress models, configuration, and
//! the error taxonomy shared by the engine and the API surface.

pub mod config;
pub mod cron;
pub mod error;
pub mod id;
pub mod metadata;
pub mod progress;

pub use config::{BackupConfig, CompressionConfig, NotificationConfig, VerificationConfig};
pub use cron::CronExpr;
pub use error::{BackupError, BackupResult};
pub use id::BackupId;
pub use metadata::{BackupMetadata, BackupStatus, BackupType};
pub use progress::{BackupProgress, ProgressStage};
