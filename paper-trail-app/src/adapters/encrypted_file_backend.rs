//! Encrypted snapshot file.
//!
//! File layout: a JSON envelope `{ version, salt, nonce, ciphertext }`. The
//! version selects the PBKDF2 parameters. The decrypted payload is a JSON
//! object of client partitions, each a map of key -> base64 bytes.
//!
//! A loaded snapshot lives in memory until `save`, which re-encrypts it with a
//! fresh salt and nonce and replaces the file atomically.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use paper_trail_core::crypto::{self, get_pbkdf2_iterations, Sealed, CURRENT_SNAPSHOT_VERSION};
use paper_trail_core::error::{CoreError, CoreResult};
use paper_trail_core::traits::{SecretStore, Snapshot, SnapshotBackend};

use super::json_file_store::{sibling_with_suffix, write_atomic};

type ClientMap = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    salt: String,
    nonce: String,
    ciphertext: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Payload {
    #[serde(default)]
    clients: ClientMap,
}

/// Snapshot backend writing encrypted envelope files
pub struct EncryptedFileBackend {
    version: u32,
}

impl EncryptedFileBackend {
    pub fn new() -> Self {
        Self {
            version: CURRENT_SNAPSHOT_VERSION,
        }
    }

    /// Backend that writes snapshots with an older envelope version
    ///
    /// # Errors
    /// Returns `CoreError::SnapshotError` for an unknown version.
    pub fn with_version(version: u32) -> CoreResult<Self> {
        get_pbkdf2_iterations(version).ok_or_else(|| {
            CoreError::SnapshotError(format!("Unsupported snapshot version: {version}"))
        })?;
        Ok(Self { version })
    }

    fn backup_path(path: &Path) -> PathBuf {
        sibling_with_suffix(path, "bak")
    }
}

impl Default for EncryptedFileBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn io_error(action: &str, path: &Path, e: &std::io::Error) -> CoreError {
    CoreError::SnapshotError(format!("Failed to {action} {}: {e}", path.display()))
}

fn open_envelope(content: &[u8], password: &str) -> CoreResult<Payload> {
    let envelope: Envelope = serde_json::from_slice(content)
        .map_err(|e| CoreError::SnapshotError(format!("Invalid snapshot envelope: {e}")))?;
    let iterations = get_pbkdf2_iterations(envelope.version).ok_or_else(|| {
        CoreError::SnapshotError(format!(
            "Unsupported snapshot version: {}",
            envelope.version
        ))
    })?;

    let sealed = Sealed {
        salt: envelope.salt,
        nonce: envelope.nonce,
        ciphertext: envelope.ciphertext,
    };
    let plaintext = crypto::decrypt_with_iterations(&sealed, password, iterations)?;

    serde_json::from_slice(&plaintext)
        .map_err(|e| CoreError::SnapshotError(format!("Invalid snapshot payload: {e}")))
}

fn seal_envelope(payload: &Payload, password: &str, version: u32) -> CoreResult<Vec<u8>> {
    let iterations = get_pbkdf2_iterations(version).ok_or_else(|| {
        CoreError::SnapshotError(format!("Unsupported snapshot version: {version}"))
    })?;
    let plaintext = serde_json::to_vec(payload)?;
    let sealed = crypto::encrypt_with_iterations(&plaintext, password, iterations)?;

    let envelope = Envelope {
        version,
        salt: sealed.salt,
        nonce: sealed.nonce,
        ciphertext: sealed.ciphertext,
    };
    Ok(serde_json::to_vec_pretty(&envelope)?)
}

#[async_trait]
impl SnapshotBackend for EncryptedFileBackend {
    async fn exists(&self, path: &Path) -> CoreResult<bool> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| io_error("check", path, &e))
    }

    async fn load(&self, path: &Path, password: &str) -> CoreResult<Arc<dyn Snapshot>> {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CoreError::SnapshotNotFound(path.display().to_string()))
            }
            Err(e) => return Err(io_error("read", path, &e)),
        };

        log::debug!("Opening snapshot {}", path.display());
        let pw = password.to_string();
        let payload = tokio::task::spawn_blocking(move || open_envelope(&content, &pw))
            .await
            .map_err(|e| CoreError::SnapshotError(format!("Task join error: {e}")))??;

        Ok(Arc::new(FileSnapshot {
            path: path.to_path_buf(),
            password: password.to_string(),
            version: self.version,
            clients: Arc::new(RwLock::new(payload.clients)),
        }))
    }

    async fn create(&self, path: &Path, password: &str) -> CoreResult<Arc<dyn Snapshot>> {
        Ok(Arc::new(FileSnapshot {
            path: path.to_path_buf(),
            password: password.to_string(),
            version: self.version,
            clients: Arc::new(RwLock::new(ClientMap::new())),
        }))
    }

    async fn backup(&self, path: &Path) -> CoreResult<PathBuf> {
        let backup = Self::backup_path(path);
        tokio::fs::copy(path, &backup)
            .await
            .map_err(|e| io_error("back up", path, &e))?;
        log::info!("Snapshot backed up to {}", backup.display());
        Ok(backup)
    }

    async fn restore_backup(&self, path: &Path) -> CoreResult<()> {
        let backup = Self::backup_path(path);
        tokio::fs::rename(&backup, path)
            .await
            .map_err(|e| io_error("restore", &backup, &e))?;
        log::warn!("Snapshot restored from {}", backup.display());
        Ok(())
    }

    async fn remove_backup(&self, path: &Path) -> CoreResult<()> {
        let backup = Self::backup_path(path);
        match tokio::fs::remove_file(&backup).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("remove", &backup, &e)),
        }
    }

    async fn quarantine(&self, path: &Path) -> CoreResult<PathBuf> {
        let target = sibling_with_suffix(
            path,
            &format!("corrupt-{}", chrono::Utc::now().timestamp()),
        );
        tokio::fs::rename(path, &target)
            .await
            .map_err(|e| io_error("move", path, &e))?;
        log::warn!("Unreadable snapshot preserved at {}", target.display());
        Ok(target)
    }
}

struct FileSnapshot {
    path: PathBuf,
    password: String,
    version: u32,
    clients: Arc<RwLock<ClientMap>>,
}

#[async_trait]
impl Snapshot for FileSnapshot {
    async fn load_client(&self, name: &str) -> CoreResult<Arc<dyn SecretStore>> {
        if !self.clients.read().await.contains_key(name) {
            return Err(CoreError::ClientNotFound(name.to_string()));
        }
        Ok(Arc::new(ClientStore {
            name: name.to_string(),
            clients: Arc::clone(&self.clients),
        }))
    }

    async fn create_client(&self, name: &str) -> CoreResult<Arc<dyn SecretStore>> {
        self.clients
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(Arc::new(ClientStore {
            name: name.to_string(),
            clients: Arc::clone(&self.clients),
        }))
    }

    async fn save(&self) -> CoreResult<()> {
        let payload = Payload {
            clients: self.clients.read().await.clone(),
        };
        let (path, password, version) = (self.path.clone(), self.password.clone(), self.version);

        tokio::task::spawn_blocking(move || {
            let bytes = seal_envelope(&payload, &password, version)?;
            write_atomic(&path, &bytes).map_err(|e| io_error("write", &path, &e))
        })
        .await
        .map_err(|e| CoreError::SnapshotError(format!("Task join error: {e}")))??;

        log::debug!("Snapshot saved to {}", self.path.display());
        Ok(())
    }
}

/// One client partition of a snapshot
struct ClientStore {
    name: String,
    clients: Arc<RwLock<ClientMap>>,
}

#[async_trait]
impl SecretStore for ClientStore {
    async fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        let clients = self.clients.read().await;
        let Some(value) = clients.get(&self.name).and_then(|store| store.get(key)) else {
            return Ok(None);
        };
        BASE64
            .decode(value)
            .map(Some)
            .map_err(|e| CoreError::SnapshotError(format!("Invalid stored value: {e}")))
    }

    async fn insert(&self, key: &str, value: Vec<u8>) -> CoreResult<()> {
        self.clients
            .write()
            .await
            .entry(self.name.clone())
            .or_default()
            .insert(key.to_string(), BASE64.encode(value));
        Ok(())
    }
}
