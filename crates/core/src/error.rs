//! Backup error taxonomy.

use thiserror::Error;

/// Result type used across the backup engine.
pub type BackupResult<T> = Result<T, BackupError>;

/// Backup-level error.
///
/// Keep this focused on the failure kinds the command surface distinguishes
/// (invalid input, busy, I/O, integrity, lookup). Transport concerns belong
/// elsewhere.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Malformed input (e.g. an unknown backup type string).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A backup job is already active, or a restore target is already
    /// occupied; the caller should retry later or pick another target.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A pipeline stage failed on filesystem I/O.
    #[error("{stage}: {source}")]
    Io {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Checksum mismatch: the artifact's integrity cannot be guaranteed.
    #[error("verification failed: {0}")]
    VerificationFailure(String),

    /// Unknown or expired backup id.
    #[error("backup not found")]
    NotFound,

    /// Configuration failed validation at load time.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The durable history catalog could not be written.
    #[error("history store: {0}")]
    Storage(String),
}

impl BackupError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn io(stage: &'static str, source: std::io::Error) -> Self {
        Self::Io { stage, source }
    }

    /// The single-job slot is taken.
    pub fn busy() -> Self {
        Self::Conflict("a backup job is already running".to_string())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn verification(msg: impl Into<String>) -> Self {
        Self::VerificationFailure(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether the error indicates contention rather than a fault.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
