//! Writing rendered exports to disk.

use std::path::{Path, PathBuf};

use paper_trail_core::error::{CoreError, CoreResult};
use paper_trail_core::services::TransactionService;
use paper_trail_core::types::{TransactionExport, TransactionExportFormat};

/// Write `export` into `dir`, creating the directory when missing
///
/// An existing file of the same name (same project, same day) is replaced.
pub async fn write_export(dir: &Path, export: &TransactionExport) -> CoreResult<PathBuf> {
    if export.file_name.contains(['/', '\\']) || export.file_name.starts_with('.') {
        return Err(CoreError::ImportExportError(format!(
            "Invalid export file name: {}",
            export.file_name
        )));
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| CoreError::ImportExportError(format!("Failed to create export folder: {e}")))?;

    let path = dir.join(&export.file_name);
    tokio::fs::write(&path, export.contents.as_bytes())
        .await
        .map_err(|e| CoreError::ImportExportError(format!("Failed to write export: {e}")))?;

    log::info!("Export written to {}", path.display());
    Ok(path)
}

/// Render a project's transactions and write them into `dir`
pub async fn export_project_transactions(
    service: &TransactionService,
    project_id: i64,
    format: TransactionExportFormat,
    dir: &Path,
) -> CoreResult<PathBuf> {
    let export = service
        .export_project_transactions(project_id, format)
        .await?;
    write_export(dir, &export).await
}
