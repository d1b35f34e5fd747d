//! Full data export payload.

use serde::{Deserialize, Serialize};

use super::{Project, Timesheet, TimesheetEntry, Transaction};

/// Export format version
pub const EXPORT_FORMAT_VERSION: &str = "1.0.0";

/// Complete export of the local database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub version: String,
    /// RFC3339 export timestamp
    pub export_date: String,
    pub projects: Vec<Project>,
    pub timesheets: Vec<Timesheet>,
    pub timesheet_entries: Vec<TimesheetEntry>,
    pub transactions: Vec<Transaction>,
}

/// File format of a per-project transaction export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionExportFormat {
    Csv,
    Json,
}

impl TransactionExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

/// Rendered transaction export, ready to be written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionExport {
    pub file_name: String,
    pub contents: String,
}
