//! Projects, timesheets, timesheet entries and transactions.
//!
//! Field names follow the column names of the local schema so rows
//! deserialize directly. Money is integer cents; timestamps are unix seconds.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(with = "crate::utils::int_bool")]
    pub active: bool,
    pub customer_id: Option<String>,
    /// Hourly rate in cents
    #[serde(rename = "rate_in_cents")]
    pub rate_in_cents: Option<i64>,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Timesheet header as listed under its project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesheetSummary {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "crate::utils::int_bool")]
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectWithTimesheets {
    #[serde(flatten)]
    pub project: Project,
    pub timesheets: Vec<TimesheetSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timesheet {
    pub id: i64,
    pub project_id: i64,
    /// Billing invoice id once invoiced
    pub invoice_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    /// `false` once the timesheet is closed by invoicing
    #[serde(with = "crate::utils::int_bool")]
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Timesheet {
    pub fn is_closed(&self) -> bool {
        !self.active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesheetEntry {
    pub id: i64,
    pub timesheet_id: i64,
    /// `YYYY-MM-DD`
    pub date: String,
    pub minutes: i64,
    pub description: String,
    /// Amount in cents
    pub amount: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Timesheet joined with its project's billing fields, plus its entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesheetDetails {
    #[serde(flatten)]
    pub timesheet: Timesheet,
    pub customer_id: Option<String>,
    /// Project hourly rate in cents
    pub project_rate: Option<i64>,
    #[serde(default)]
    pub entries: Vec<TimesheetEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub project_id: Option<i64>,
    pub date: String,
    pub description: String,
    /// Amount in cents; negative for expenses
    pub amount: i64,
    pub file_path: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    pub customer_id: Option<String>,
    pub rate_in_cents: Option<i64>,
    pub description: Option<String>,
}

/// A new project together with its initial timesheet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedProject {
    pub project: Project,
    pub timesheet: Timesheet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimesheetRequest {
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryRequest {
    pub timesheet_id: i64,
    /// Free-form date input, normalized to `YYYY-MM-DD`
    pub date: String,
    pub hours: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTimesheetRequest {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntryRequest {
    pub id: i64,
    /// Free-form date input, normalized to `YYYY-MM-DD`
    pub date: String,
    pub hours: f64,
    pub description: String,
}

/// Ledger transaction to create, or to overwrite when `id` is set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTransactionRequest {
    pub id: Option<i64>,
    pub project_id: Option<i64>,
    pub date: String,
    pub description: String,
    /// Amount in cents; negative for expenses
    pub amount: i64,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTransactionRequest {
    pub id: i64,
    pub project_id: Option<i64>,
    pub date: String,
    pub description: String,
    /// Amount in cents
    pub amount: i64,
}

/// Categorized bookkeeping record kept on this device only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountingTransaction {
    /// Caller-chosen key, e.g. a bank statement line id
    pub id: String,
    pub date: String,
    pub description: String,
    pub account: i64,
    pub category: String,
    /// Amount in cents
    pub amount: i64,
    pub file_path: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}
