//! Unified error type definition

use serde::Serialize;
use thiserror::Error;

/// Core layer error type
#[derive(Error, Debug, Serialize)]
#[serde(tag = "code", content = "details")]
pub enum CoreError {
    /// Platform credential store (keychain) error
    #[error("Credential store error: {0}")]
    CredentialError(String),

    /// Snapshot file does not exist
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// Snapshot exists but cannot be decrypted with the given password
    #[error("Snapshot could not be decrypted: {0}")]
    SnapshotLocked(String),

    /// Snapshot backend I/O or format error
    #[error("Snapshot error: {0}")]
    SnapshotError(String),

    /// Client partition missing from the snapshot
    #[error("Vault client not found: {0}")]
    ClientNotFound(String),

    /// Vault could not be initialized for this process
    #[error("Vault unavailable")]
    VaultUnavailable,

    /// Password scheme migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Local key-value store error
    #[error("Local store error: {0}")]
    LocalStoreError(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    StorageError(String),

    /// serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Project not found
    #[error("Project not found: {0}")]
    ProjectNotFound(i64),

    /// Timesheet not found
    #[error("Timesheet not found: {0}")]
    TimesheetNotFound(i64),

    /// Timesheet entry not found
    #[error("Timesheet entry not found: {0}")]
    EntryNotFound(i64),

    /// Ledger transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(i64),

    /// Timesheet already invoiced and closed
    #[error("Timesheet already closed: {0}")]
    TimesheetClosed(i64),

    /// Sync requested while disabled in the configuration
    #[error("Sync is disabled")]
    SyncDisabled,

    /// Sync requested without remote URL or token
    #[error("Sync is not configured: {0}")]
    SyncNotConfigured(String),

    /// network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Billing API key is not stored in the vault
    #[error("Billing API key not found. Set it in Settings.")]
    MissingApiKey,

    /// Billing API error
    #[error("Billing API error: {status} - {message}")]
    BillingError { status: u16, message: String },

    /// Import and export errors
    #[error("Import/Export error: {0}")]
    ImportExportError(String),
}

impl CoreError {
    /// Whether it is expected behavior (user input, resource does not exist, etc.) is used for log classification.
    ///
    /// Level `warn` should be used when returning `true` and level `error` when returning `false`.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::ProjectNotFound(_)
                | Self::TimesheetNotFound(_)
                | Self::EntryNotFound(_)
                | Self::TransactionNotFound(_)
                | Self::TimesheetClosed(_)
                | Self::ValidationError(_)
                | Self::SyncDisabled
                | Self::SyncNotConfigured(_)
                | Self::MissingApiKey
        )
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

/// Core layer Result type alias
pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_are_expected() {
        assert!(CoreError::SyncDisabled.is_expected());
        assert!(CoreError::ProjectNotFound(7).is_expected());
        assert!(!CoreError::VaultUnavailable.is_expected());
        assert!(!CoreError::StorageError("disk".into()).is_expected());
    }

    #[test]
    fn serializes_with_code_tag() {
        let json = serde_json::to_value(CoreError::TimesheetClosed(3)).unwrap();
        assert_eq!(json["code"], "TimesheetClosed");
        assert_eq!(json["details"], 3);
    }
}
