//! Strongly-typed backup job identifier.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BackupError;

/// Identifier of a backup job (and of the artifact it produces).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupId(Uuid);

impl BackupId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered) so catalog listings sort naturally by
    /// creation. Prefer passing IDs explicitly in tests for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BackupId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for BackupId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for BackupId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<BackupId> for Uuid {
    fn from(value: BackupId) -> Self {
        value.0
    }
}

impl FromStr for BackupId {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| BackupError::invalid_argument(format!("BackupId: {e}")))?;
        Ok(Self(uuid))
    }
}
