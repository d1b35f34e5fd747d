//! Vault configuration and status types.

use std::path::PathBuf;

use serde::Serialize;

/// Snapshot file name under the application data directory
pub const SNAPSHOT_FILE_NAME: &str = "paper-trail.hold";

/// Vault constants; `VaultSettings::new` applies the application defaults
#[derive(Debug, Clone)]
pub struct VaultSettings {
    pub snapshot_path: PathBuf,
    pub client_name: String,
    pub secret_key: String,
    pub keyring_service: String,
    pub keyring_account: String,
    /// Hardcoded password of snapshots written by older releases
    pub legacy_password: String,
}

impl VaultSettings {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            client_name: "paper-trail".to_string(),
            secret_key: "stripe_secret_key".to_string(),
            keyring_service: "dev.gremlich.paper-trail".to_string(),
            keyring_account: "vault-password".to_string(),
            legacy_password: "PaperTrailVault".to_string(),
        }
    }
}

/// How the vault reached the ready state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum VaultOutcome {
    /// Existing snapshot opened with the current password
    Opened,
    /// No snapshot existed; a new one was written
    Created,
    /// Legacy-password snapshot re-encrypted under the current password
    Migrated,
    /// Unreadable snapshot moved aside; a new one was written
    #[serde(rename_all = "camelCase")]
    RecoveredFromCorruption { preserved_at: PathBuf },
}

/// Vault lifecycle state for the current process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "outcome", rename_all = "camelCase")]
pub enum VaultStatus {
    Uninitialized,
    Initializing,
    Ready(VaultOutcome),
    /// Initialization failed; secrets go through the fallback store
    Degraded,
}
