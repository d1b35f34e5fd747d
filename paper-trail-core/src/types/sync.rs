//! Sync configuration types.

use serde::{Deserialize, Serialize};

/// Persisted sync configuration record
///
/// Stored as camelCase JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub sync_url: Option<String>,
    pub auth_token: Option<String>,
    pub enable_sync: bool,
    /// Reserved for future gating; informational only
    pub is_paid_feature: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_url: None,
            auth_token: None,
            enable_sync: true,
            is_paid_feature: false,
        }
    }
}

impl SyncConfig {
    /// Sync is enabled and both URL and token are present (and non-blank)
    pub fn is_ready(&self) -> bool {
        self.enable_sync
            && self.sync_url.as_deref().is_some_and(|s| !s.trim().is_empty())
            && self.auth_token.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// In-memory remote endpoint settings of the database client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSyncSettings {
    pub url: Option<String>,
    pub auth_token: Option<String>,
    pub enabled: bool,
}

impl From<&SyncConfig> for RemoteSyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            url: config.sync_url.clone(),
            auth_token: config.auth_token.clone(),
            enabled: config.enable_sync,
        }
    }
}

/// Result of one replication round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Rows written locally from the remote
    pub pulled: usize,
    /// Rows written to the remote
    pub pushed: usize,
    /// Rows deleted on either side from tombstones
    pub deleted: usize,
}
