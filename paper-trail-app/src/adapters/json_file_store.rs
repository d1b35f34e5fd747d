//! Unencrypted key-value store backed by a JSON object file.
//!
//! Holds the sync configuration and, in degraded mode, the plaintext secret.
//! The whole map is cached in memory and rewritten atomically on every change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use paper_trail_core::error::{CoreError, CoreResult};
use paper_trail_core::traits::KeyValueStore;

pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store, reading existing entries
    ///
    /// A missing or blank file opens empty. A file that is not a JSON string
    /// map is renamed to `<name>.corrupt-<unix seconds>` and the store opens
    /// empty, so the next write cannot replace it.
    ///
    /// # Errors
    /// Returns `CoreError::LocalStoreError` if the file exists but cannot be
    /// read, or if an invalid file cannot be moved aside.
    pub fn open(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    let preserved_at = quarantine(&path)?;
                    log::warn!(
                        "Local store {} is not valid JSON ({e}), preserved at {}; starting empty",
                        path.display(),
                        preserved_at.display()
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(CoreError::LocalStoreError(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> CoreResult<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| CoreError::LocalStoreError("Local store lock poisoned".to_string()))
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> CoreResult<()> {
        let json = serde_json::to_string_pretty(entries)?;
        write_atomic(&self.path, json.as_bytes())
            .map_err(|e| CoreError::LocalStoreError(format!("Failed to write local store: {e}")))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get_item(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> CoreResult<()> {
        let mut entries = self.lock()?;
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&entries) {
            // keep memory and disk identical
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> CoreResult<()> {
        let mut entries = self.lock()?;
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.persist(&entries) {
            entries.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }
}

/// Write through a sibling temp file and rename over the target
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = sibling_with_suffix(path, "tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)
}

/// Move an unreadable file aside, returning its new path
fn quarantine(path: &Path) -> CoreResult<PathBuf> {
    let target = sibling_with_suffix(
        path,
        &format!("corrupt-{}", chrono::Utc::now().timestamp()),
    );
    std::fs::rename(path, &target).map_err(|e| {
        CoreError::LocalStoreError(format!("Failed to move aside {}: {e}", path.display()))
    })?;
    Ok(target)
}

/// `dir/name.ext` -> `dir/name.ext.<suffix>`
pub(crate) fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
