//! Per-install application data locations.

use std::path::{Path, PathBuf};

use paper_trail_core::error::{CoreError, CoreResult};
use paper_trail_core::types::SNAPSHOT_FILE_NAME;

/// Directory name under the platform local data dir
pub const APP_IDENTIFIER: &str = "dev.gremlich.paper-trail";

pub const DATABASE_FILE_NAME: &str = "paper-trail.db";
pub const LOCAL_STORE_FILE_NAME: &str = "local-storage.json";

/// Export folder under the user's documents directory
const EXPORTS_SUBDIR: &str = "paper-trail/exports";

/// Resolved file locations of one installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    data_dir: PathBuf,
    exports_dir: PathBuf,
}

impl AppPaths {
    /// `<data-local>/dev.gremlich.paper-trail`, exports in
    /// `<documents>/paper-trail/exports`
    ///
    /// # Errors
    /// Returns `CoreError::StorageError` when the platform has no local data directory.
    pub fn platform_default() -> CoreResult<Self> {
        let base = dirs::data_local_dir().ok_or_else(|| {
            CoreError::StorageError(
                "Failed to determine data directory - unsupported platform or environment"
                    .to_string(),
            )
        })?;
        let paths = Self::new(base.join(APP_IDENTIFIER));
        Ok(match dirs::document_dir() {
            Some(documents) => paths.with_exports_dir(documents.join(EXPORTS_SUBDIR)),
            None => paths,
        })
    }

    /// Everything under `data_dir`, exports in `<data_dir>/exports`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            exports_dir: data_dir.join("exports"),
            data_dir,
        }
    }

    #[must_use]
    pub fn with_exports_dir(mut self, exports_dir: impl Into<PathBuf>) -> Self {
        self.exports_dir = exports_dir.into();
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn snapshot_file(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE_NAME)
    }

    pub fn database_file(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    pub fn local_store_file(&self) -> PathBuf {
        self.data_dir.join(LOCAL_STORE_FILE_NAME)
    }

    pub fn exports_dir(&self) -> &Path {
        &self.exports_dir
    }

    /// Create the data directory if missing
    pub fn ensure_dir(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| CoreError::StorageError(format!("Failed to create directory: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_live_under_data_dir() {
        let paths = AppPaths::new("/tmp/pt");
        assert_eq!(paths.snapshot_file(), PathBuf::from("/tmp/pt/paper-trail.hold"));
        assert_eq!(paths.database_file(), PathBuf::from("/tmp/pt/paper-trail.db"));
        assert_eq!(
            paths.local_store_file(),
            PathBuf::from("/tmp/pt/local-storage.json")
        );
        assert_eq!(paths.exports_dir(), Path::new("/tmp/pt/exports"));
    }

    #[test]
    fn exports_dir_can_move() {
        let paths =
            AppPaths::new("/tmp/pt").with_exports_dir("/home/me/Documents/paper-trail/exports");
        assert_eq!(
            paths.exports_dir(),
            Path::new("/home/me/Documents/paper-trail/exports")
        );
        assert_eq!(paths.data_dir(), Path::new("/tmp/pt"));
    }
}
