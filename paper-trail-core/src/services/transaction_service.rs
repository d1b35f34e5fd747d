//! 收支流水服务
//!
//! Project ledger transactions (replicated) and categorized accounting
//! records (this device only), plus per-project CSV / JSON export rendering.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CoreError, CoreResult};
use crate::traits::{select_as, DatabaseClient};
use crate::types::{
    AccountingTransaction, SubmitTransactionRequest, Transaction, TransactionExport,
    TransactionExportFormat, UpdateTransactionRequest,
};
use crate::utils::date::normalize_date_input;

use super::timesheet_service::{optional_text, NOW};
use super::ServiceContext;

const TRANSACTION_COLUMNS: &str =
    "id, projectId, date, description, amount, filePath, createdAt, updatedAt";

const ACCOUNTING_COLUMNS: &str =
    "id, date, description, account, category, amount, filePath, createdAt, updatedAt";

const CSV_HEADER: &str = "Date,Project,Description,Amount";

/// 收支流水服务
pub struct TransactionService {
    ctx: Arc<ServiceContext>,
}

impl TransactionService {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    fn db(&self) -> &dyn DatabaseClient {
        self.ctx.database().as_ref()
    }

    /// 全部流水，按日期升序
    pub async fn list_transactions(&self) -> CoreResult<Vec<Transaction>> {
        select_as(
            self.db(),
            &format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions
                 ORDER BY date ASC, createdAt ASC, id ASC"
            ),
            Vec::new(),
        )
        .await
    }

    /// 项目下的流水，按日期升序
    pub async fn list_by_project(&self, project_id: i64) -> CoreResult<Vec<Transaction>> {
        select_as(
            self.db(),
            &format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE projectId = ?
                 ORDER BY date ASC, createdAt ASC, id ASC"
            ),
            vec![project_id.into()],
        )
        .await
    }

    pub async fn get_transaction(&self, transaction_id: i64) -> CoreResult<Transaction> {
        select_as::<Transaction>(
            self.db(),
            &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?"),
            vec![transaction_id.into()],
        )
        .await?
        .into_iter()
        .next()
        .ok_or(CoreError::TransactionNotFound(transaction_id))
    }

    /// 新建流水；带 `id` 时覆盖同 id 的流水
    pub async fn submit_transaction(
        &self,
        request: SubmitTransactionRequest,
    ) -> CoreResult<Transaction> {
        let date = normalize_date_input(&request.date)?;
        self.ensure_project(request.project_id).await?;

        let result = self
            .db()
            .execute(
                &format!(
                    "INSERT INTO transactions (id, projectId, date, description, amount, filePath)
                     VALUES (?, ?, ?, ?, ?, ?)
                     ON CONFLICT(id) DO UPDATE SET
                         projectId = excluded.projectId,
                         date = excluded.date,
                         description = excluded.description,
                         amount = excluded.amount,
                         filePath = excluded.filePath,
                         updatedAt = {NOW}"
                ),
                vec![
                    request.id.into(),
                    request.project_id.into(),
                    date.into(),
                    request.description.trim().into(),
                    request.amount.into(),
                    optional_text(request.file_path).into(),
                ],
            )
            .await?;

        let id = request.id.unwrap_or(result.last_insert_id);
        log::debug!("Transaction {id} saved");
        self.get_transaction(id).await
    }

    /// 修改流水的项目、日期、描述和金额
    pub async fn update_transaction(
        &self,
        request: UpdateTransactionRequest,
    ) -> CoreResult<Transaction> {
        let date = normalize_date_input(&request.date)?;
        self.ensure_project(request.project_id).await?;

        let updated = self
            .db()
            .execute(
                &format!(
                    "UPDATE transactions
                     SET projectId = ?, date = ?, description = ?, amount = ?, updatedAt = {NOW}
                     WHERE id = ?"
                ),
                vec![
                    request.project_id.into(),
                    date.into(),
                    request.description.trim().into(),
                    request.amount.into(),
                    request.id.into(),
                ],
            )
            .await?;
        if updated.rows_affected == 0 {
            return Err(CoreError::TransactionNotFound(request.id));
        }

        self.get_transaction(request.id).await
    }

    pub async fn delete_transaction(&self, transaction_id: i64) -> CoreResult<()> {
        let deleted = self
            .db()
            .execute(
                "DELETE FROM transactions WHERE id = ?",
                vec![transaction_id.into()],
            )
            .await?;
        if deleted.rows_affected == 0 {
            return Err(CoreError::TransactionNotFound(transaction_id));
        }
        Ok(())
    }

    /// 写入或覆盖一条本机记账记录（按调用方给定的 id）
    pub async fn upsert_accounting_transaction(
        &self,
        record: AccountingTransaction,
    ) -> CoreResult<AccountingTransaction> {
        let id = record.id.trim().to_string();
        if id.is_empty() {
            return Err(CoreError::ValidationError(
                "Accounting transaction id is required".to_string(),
            ));
        }
        let date = normalize_date_input(&record.date)?;

        self.db()
            .execute(
                &format!(
                    "INSERT INTO accounting_transactions
                     (id, date, description, account, category, amount, filePath)
                     VALUES (?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(id) DO UPDATE SET
                         date = excluded.date,
                         description = excluded.description,
                         account = excluded.account,
                         category = excluded.category,
                         amount = excluded.amount,
                         filePath = excluded.filePath,
                         updatedAt = {NOW}"
                ),
                vec![
                    id.as_str().into(),
                    date.into(),
                    record.description.trim().into(),
                    record.account.into(),
                    record.category.trim().into(),
                    record.amount.into(),
                    optional_text(record.file_path).into(),
                ],
            )
            .await?;

        select_as::<AccountingTransaction>(
            self.db(),
            &format!("SELECT {ACCOUNTING_COLUMNS} FROM accounting_transactions WHERE id = ?"),
            vec![id.as_str().into()],
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::StorageError(format!("Accounting transaction {id} not saved")))
    }

    pub async fn list_accounting_transactions(&self) -> CoreResult<Vec<AccountingTransaction>> {
        select_as(
            self.db(),
            &format!(
                "SELECT {ACCOUNTING_COLUMNS} FROM accounting_transactions
                 ORDER BY date ASC, id ASC"
            ),
            Vec::new(),
        )
        .await
    }

    /// 导出项目流水为 CSV 或 JSON
    pub async fn export_project_transactions(
        &self,
        project_id: i64,
        format: TransactionExportFormat,
    ) -> CoreResult<TransactionExport> {
        let project_name = self
            .db()
            .select(
                "SELECT name FROM projects WHERE id = ?",
                vec![project_id.into()],
            )
            .await?
            .into_iter()
            .next()
            .and_then(|row| {
                row.get("name")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
            })
            .ok_or(CoreError::ProjectNotFound(project_id))?;

        let transactions = self.list_by_project(project_id).await?;
        let now = Utc::now();
        let contents = match format {
            TransactionExportFormat::Csv => render_csv(&project_name, &transactions),
            TransactionExportFormat::Json => render_json(&project_name, &transactions, now)?,
        };

        log::info!(
            "Exported {} transactions of project {project_id} as {}",
            transactions.len(),
            format.extension()
        );
        Ok(TransactionExport {
            file_name: export_file_name(&project_name, format, now),
            contents,
        })
    }

    async fn ensure_project(&self, project_id: Option<i64>) -> CoreResult<()> {
        let Some(project_id) = project_id else {
            return Ok(());
        };
        let exists = !self
            .db()
            .select(
                "SELECT id FROM projects WHERE id = ?",
                vec![project_id.into()],
            )
            .await?
            .is_empty();
        if exists {
            Ok(())
        } else {
            Err(CoreError::ProjectNotFound(project_id))
        }
    }
}

/// Cents as a decimal dollar amount, e.g. `-1205` -> `-12.05`
fn format_dollars(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[allow(clippy::cast_precision_loss)]
fn cents_to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

fn escape_csv(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn render_csv(project_name: &str, transactions: &[Transaction]) -> String {
    let project = escape_csv(project_name);
    std::iter::once(CSV_HEADER.to_string())
        .chain(transactions.iter().map(|tx| {
            format!(
                "{},{project},{},{}",
                escape_csv(&tx.date),
                escape_csv(&tx.description),
                format_dollars(tx.amount)
            )
        }))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonExport<'a> {
    project: &'a str,
    exported_at: String,
    transactions: Vec<JsonExportRow<'a>>,
}

#[derive(Serialize)]
struct JsonExportRow<'a> {
    date: &'a str,
    description: &'a str,
    /// Dollars
    amount: f64,
}

fn render_json(
    project_name: &str,
    transactions: &[Transaction],
    exported_at: DateTime<Utc>,
) -> CoreResult<String> {
    let export = JsonExport {
        project: project_name,
        exported_at: exported_at.to_rfc3339(),
        transactions: transactions
            .iter()
            .map(|tx| JsonExportRow {
                date: &tx.date,
                description: &tx.description,
                amount: cents_to_dollars(tx.amount),
            })
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&export)?)
}

/// `transactions-<project-slug>-<YYYY-MM-DD>.<ext>`
fn export_file_name(
    project_name: &str,
    format: TransactionExportFormat,
    date: DateTime<Utc>,
) -> String {
    let slug = project_name
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '/' || c == '\\')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    format!(
        "transactions-{slug}-{}.{}",
        date.format("%Y-%m-%d"),
        format.extension()
    )
}
