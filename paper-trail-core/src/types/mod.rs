//! 类型定义模块

mod bookkeeping;
mod export;
mod invoice;
mod profile;
mod sql;
mod sync;
mod vault;

pub use bookkeeping::{
    AccountingTransaction, CreateEntryRequest, CreateProjectRequest, CreateTimesheetRequest,
    CreatedProject, Project, ProjectWithTimesheets, SubmitTransactionRequest, Timesheet,
    TimesheetDetails, TimesheetEntry, TimesheetSummary, Transaction, UpdateEntryRequest,
    UpdateTimesheetRequest, UpdateTransactionRequest,
};
pub use export::{ExportData, TransactionExport, TransactionExportFormat, EXPORT_FORMAT_VERSION};
pub use invoice::{Invoice, InvoiceDraft, InvoiceItemDraft};
pub use profile::{SyncCode, UpdateProfileRequest, UserProfile};
pub use sql::{ExecuteResult, Row, SqlValue};
pub use sync::{RemoteSyncSettings, SyncConfig, SyncReport};
pub use vault::{VaultOutcome, VaultSettings, VaultStatus, SNAPSHOT_FILE_NAME};
