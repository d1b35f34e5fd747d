//! 加密凭证保险库服务
//!
//! Owns the single encrypted secret (the billing API key). The vault is opened
//! lazily on first access and the outcome is memoized for the process: either
//! a ready handle or degraded mode, in which reads and writes go through the
//! unencrypted fallback store.
//!
//! Opening resolves the master password from the platform credential store
//! (generating and storing one on first run), then:
//! - no snapshot file: create one
//! - opens with the current password: use it
//! - opens with the legacy password: re-encrypt under the current password
//! - opens with neither: move the file aside and create a new one

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell, RwLock};

use crate::crypto::generate_vault_password;
use crate::error::{CoreError, CoreResult};
use crate::traits::{KeyValueStore, PasswordStore, SecretStore, Snapshot, SnapshotBackend};
use crate::types::{VaultOutcome, VaultSettings, VaultStatus};

/// Opened snapshot and the store of its client partition
struct VaultHandle {
    snapshot: Arc<dyn Snapshot>,
    store: Arc<dyn SecretStore>,
}

/// Credential vault service
pub struct VaultService {
    settings: VaultSettings,
    backend: Arc<dyn SnapshotBackend>,
    password_store: Arc<dyn PasswordStore>,
    fallback: Arc<dyn KeyValueStore>,
    /// `None` inside the cell means initialization failed (degraded mode)
    handle: OnceCell<Option<VaultHandle>>,
    status: RwLock<VaultStatus>,
    write_lock: Mutex<()>,
}

impl VaultService {
    pub fn new(
        settings: VaultSettings,
        backend: Arc<dyn SnapshotBackend>,
        password_store: Arc<dyn PasswordStore>,
        fallback: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            settings,
            backend,
            password_store,
            fallback,
            handle: OnceCell::new(),
            status: RwLock::new(VaultStatus::Uninitialized),
            write_lock: Mutex::new(()),
        }
    }

    /// Current lifecycle state
    pub async fn status(&self) -> VaultStatus {
        self.status.read().await.clone()
    }

    /// Open the vault now instead of on first secret access
    pub async fn initialize(&self) -> VaultStatus {
        self.handle().await;
        self.status().await
    }

    /// Read the stored secret
    ///
    /// Never fails: any vault error falls back to the unencrypted store, and
    /// any fallback error yields `None`.
    pub async fn get_secret(&self) -> Option<String> {
        if let Some(handle) = self.handle().await {
            match handle.store.get(&self.settings.secret_key).await {
                Ok(Some(bytes)) => match String::from_utf8(bytes) {
                    Ok(secret) => return Some(secret),
                    Err(e) => log::warn!("Stored secret is not valid UTF-8: {e}"),
                },
                Ok(None) => return None,
                Err(e) => log::warn!("Failed to read secret from vault: {e}"),
            }
        }
        self.read_fallback()
    }

    /// Store the secret
    ///
    /// Never fails: a vault error stores the value in the unencrypted fallback
    /// store instead; if that also fails the write is dropped. Empty values
    /// are ignored.
    pub async fn set_secret(&self, value: &str) {
        if value.is_empty() {
            log::warn!("Ignoring empty secret");
            return;
        }

        match self.write_to_vault(value).await {
            Ok(()) => log::info!("Secret stored in vault"),
            Err(e) => {
                log::warn!("Vault write failed, storing secret in fallback store: {e}");
                if let Err(e) = self.fallback.set_item(&self.settings.secret_key, value) {
                    log::error!("Fallback store write failed, secret dropped: {e}");
                }
            }
        }
    }

    async fn write_to_vault(&self, value: &str) -> CoreResult<()> {
        let handle = self.handle().await.ok_or(CoreError::VaultUnavailable)?;
        let _guard = self.write_lock.lock().await;
        handle
            .store
            .insert(&self.settings.secret_key, value.as_bytes().to_vec())
            .await?;
        handle.snapshot.save().await
    }

    fn read_fallback(&self) -> Option<String> {
        match self.fallback.get_item(&self.settings.secret_key) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Fallback store read failed: {e}");
                None
            }
        }
    }

    /// Memoized initialization; concurrent callers share one attempt
    async fn handle(&self) -> Option<&VaultHandle> {
        self.handle
            .get_or_init(|| async {
                *self.status.write().await = VaultStatus::Initializing;
                match self.open().await {
                    Ok((handle, outcome)) => {
                        log::info!("Vault ready: {outcome:?}");
                        *self.status.write().await = VaultStatus::Ready(outcome);
                        Some(handle)
                    }
                    Err(e) => {
                        log::warn!("Vault unavailable, using fallback store: {e}");
                        *self.status.write().await = VaultStatus::Degraded;
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    async fn open(&self) -> CoreResult<(VaultHandle, VaultOutcome)> {
        let path = self.settings.snapshot_path.as_path();
        let password = self.resolve_password().await?;

        if !self.backend.exists(path).await? {
            log::info!("No vault snapshot found, creating {}", path.display());
            let handle = self.create_fresh(path, &password).await?;
            return Ok((handle, VaultOutcome::Created));
        }

        match self.backend.load(path, &password).await {
            Ok(snapshot) => {
                let store = self.load_or_create_client(snapshot.as_ref()).await?;
                return Ok((VaultHandle { snapshot, store }, VaultOutcome::Opened));
            }
            Err(e) => log::debug!("Snapshot did not open with the current password: {e}"),
        }

        match self
            .backend
            .load(path, &self.settings.legacy_password)
            .await
        {
            Ok(legacy) => {
                log::info!("Legacy vault snapshot detected, migrating to keychain password");
                let handle = self.migrate(path, legacy.as_ref(), &password).await?;
                Ok((handle, VaultOutcome::Migrated))
            }
            Err(e) => {
                log::warn!("Vault snapshot opens with neither password ({e}), preserving it");
                let preserved_at = self.backend.quarantine(path).await?;
                log::warn!("Unreadable snapshot moved to {}", preserved_at.display());
                let handle = self.create_fresh(path, &password).await?;
                Ok((handle, VaultOutcome::RecoveredFromCorruption { preserved_at }))
            }
        }
    }

    /// Keychain password, generated and stored on first run
    async fn resolve_password(&self) -> CoreResult<String> {
        let service = &self.settings.keyring_service;
        let account = &self.settings.keyring_account;

        if let Some(password) = self.password_store.get_password(service, account).await? {
            return Ok(password);
        }

        let password = generate_vault_password();
        self.password_store
            .set_password(service, account, &password)
            .await?;
        log::info!("Generated new vault password");
        Ok(password)
    }

    async fn create_fresh(&self, path: &Path, password: &str) -> CoreResult<VaultHandle> {
        let snapshot = self.backend.create(path, password).await?;
        let store = snapshot.create_client(&self.settings.client_name).await?;
        snapshot.save().await?;
        Ok(VaultHandle { snapshot, store })
    }

    async fn load_or_create_client(&self, snapshot: &dyn Snapshot) -> CoreResult<Arc<dyn SecretStore>> {
        match snapshot.load_client(&self.settings.client_name).await {
            Ok(store) => Ok(store),
            Err(e) => {
                log::debug!("Creating vault client partition: {e}");
                snapshot.create_client(&self.settings.client_name).await
            }
        }
    }

    /// Re-encrypt a legacy snapshot under `password`
    ///
    /// The legacy file is backed up first and restored on any failure, so the
    /// next process retries from intact data.
    async fn migrate(
        &self,
        path: &Path,
        legacy: &dyn Snapshot,
        password: &str,
    ) -> CoreResult<VaultHandle> {
        let legacy_store = self.load_or_create_client(legacy).await?;
        let value = legacy_store.get(&self.settings.secret_key).await?;
        legacy.save().await?;

        let backup = self.backend.backup(path).await?;
        log::debug!("Legacy snapshot backed up to {}", backup.display());

        match self.reencrypt(path, password, value).await {
            Ok(handle) => {
                if let Err(e) = self.backend.remove_backup(path).await {
                    log::warn!("Failed to remove legacy snapshot backup: {e}");
                }
                log::info!("Vault migration completed");
                Ok(handle)
            }
            Err(e) => {
                log::error!("Vault migration failed, restoring legacy snapshot: {e}");
                if let Err(restore_err) = self.backend.restore_backup(path).await {
                    log::error!("Failed to restore legacy snapshot: {restore_err}");
                }
                Err(CoreError::MigrationFailed(e.to_string()))
            }
        }
    }

    async fn reencrypt(
        &self,
        path: &Path,
        password: &str,
        value: Option<Vec<u8>>,
    ) -> CoreResult<VaultHandle> {
        let key = &self.settings.secret_key;

        let snapshot = self.backend.create(path, password).await?;
        let store = snapshot.create_client(&self.settings.client_name).await?;
        if let Some(bytes) = &value {
            store.insert(key, bytes.clone()).await?;
        }
        snapshot.save().await?;

        // Verify from disk; the in-memory handle proves nothing.
        let reopened = self.backend.load(path, password).await?;
        let reopened_store = reopened.load_client(&self.settings.client_name).await?;
        if reopened_store.get(key).await? != value {
            return Err(CoreError::MigrationFailed(
                "secret changed across re-encryption".to_string(),
            ));
        }

        Ok(VaultHandle {
            snapshot: reopened,
            store: reopened_store,
        })
    }
}
