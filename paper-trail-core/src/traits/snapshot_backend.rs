//! 加密快照后端抽象 Trait
//!
//! A snapshot is one encrypted file holding named client partitions, each
//! a key → bytes map. The master password is never stored in the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CoreResult;

/// Encrypted snapshot backend
///
/// 平台实现:
/// - Desktop: `EncryptedFileBackend` (AES-256-GCM envelope file)
/// - Tests: `MockSnapshotBackend`
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    /// Whether a snapshot file exists at `path`
    async fn exists(&self, path: &Path) -> CoreResult<bool>;

    /// Open the snapshot at `path` with `password`
    ///
    /// # Errors
    /// * `SnapshotNotFound` - no file at `path`
    /// * `SnapshotLocked` - wrong password or undecryptable content
    /// * `SnapshotError` - unreadable or malformed file
    async fn load(&self, path: &Path, password: &str) -> CoreResult<Arc<dyn Snapshot>>;

    /// Start an empty snapshot bound to `path` and `password`
    ///
    /// Nothing touches the disk until `Snapshot::save`.
    async fn create(&self, path: &Path, password: &str) -> CoreResult<Arc<dyn Snapshot>>;

    /// Copy the snapshot file to its backup location and return that location
    async fn backup(&self, path: &Path) -> CoreResult<PathBuf>;

    /// Put the backup taken by `backup` back in place of `path`
    async fn restore_backup(&self, path: &Path) -> CoreResult<()>;

    /// Delete the backup taken by `backup`
    async fn remove_backup(&self, path: &Path) -> CoreResult<()>;

    /// Move an unreadable snapshot aside, returning where it now lives
    async fn quarantine(&self, path: &Path) -> CoreResult<PathBuf>;
}

/// An opened snapshot
#[async_trait]
pub trait Snapshot: Send + Sync {
    /// Load an existing client partition
    ///
    /// # Errors
    /// * `ClientNotFound` - no partition named `name`
    async fn load_client(&self, name: &str) -> CoreResult<Arc<dyn SecretStore>>;

    /// Create (or reset) a client partition
    async fn create_client(&self, name: &str) -> CoreResult<Arc<dyn SecretStore>>;

    /// Encrypt and flush the snapshot to disk
    async fn save(&self) -> CoreResult<()>;
}

/// Key-value store inside one client partition
///
/// Writes are held in memory until the owning snapshot is saved.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>>;

    async fn insert(&self, key: &str, value: Vec<u8>) -> CoreResult<()>;
}
