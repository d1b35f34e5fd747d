//! 全量数据导入导出服务

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{CoreError, CoreResult};
use crate::traits::{
    finish_transaction, from_rows, select_as, DatabaseClient, DatabaseTransaction,
};
use crate::types::{ExportData, SqlValue, EXPORT_FORMAT_VERSION};

use super::ServiceContext;

/// Tables in parent-before-child order
const TABLES: [&str; 4] = ["projects", "timesheets", "timesheet_entries", "transactions"];

/// Bound replication identity, or a fresh one when the parameter is NULL
const NEW_SYNC_ID: &str = "COALESCE(?, lower(hex(randomblob(16))))";

/// 导入导出服务
pub struct DataTransferService {
    ctx: Arc<ServiceContext>,
}

impl DataTransferService {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    fn db(&self) -> &dyn DatabaseClient {
        self.ctx.database().as_ref()
    }

    /// 导出全部数据
    pub async fn export_all(&self) -> CoreResult<ExportData> {
        let db = self.db();
        let projects = select_as(
            db,
            "SELECT id, name, active, customerId, rate_in_cents, description, createdAt, updatedAt
             FROM projects ORDER BY id ASC",
            Vec::new(),
        )
        .await?;
        let timesheets = select_as(
            db,
            "SELECT id, projectId, invoiceId, name, description, active, createdAt, updatedAt
             FROM timesheets ORDER BY id ASC",
            Vec::new(),
        )
        .await?;
        let timesheet_entries = select_as(
            db,
            "SELECT id, timesheetId, date, minutes, description, amount, createdAt, updatedAt
             FROM timesheet_entries ORDER BY id ASC",
            Vec::new(),
        )
        .await?;
        let transactions = select_as(
            db,
            "SELECT id, projectId, date, description, amount, filePath, createdAt, updatedAt
             FROM transactions ORDER BY id ASC",
            Vec::new(),
        )
        .await?;

        Ok(ExportData {
            version: EXPORT_FORMAT_VERSION.to_string(),
            export_date: chrono::Utc::now().to_rfc3339(),
            projects,
            timesheets,
            timesheet_entries,
            transactions,
        })
    }

    /// 导入数据，替换现有全部数据（单一事务）
    ///
    /// On any failure the database is left as it was.
    pub async fn import_all(&self, data: &ExportData) -> CoreResult<()> {
        let major = data.version.split('.').next().unwrap_or_default();
        if major != "1" {
            return Err(CoreError::ImportExportError(format!(
                "Unsupported export version: {}",
                data.version
            )));
        }

        let txn = self.db().begin().await?;
        let result = Self::replace_all(txn.as_ref(), data).await;
        finish_transaction(txn, result).await.map_err(|e| match e {
            CoreError::StorageError(msg) => {
                CoreError::ImportExportError(format!("Import failed: {msg}"))
            }
            other => other,
        })?;

        log::info!(
            "Imported {} projects, {} timesheets, {} entries, {} transactions",
            data.projects.len(),
            data.timesheets.len(),
            data.timesheet_entries.len(),
            data.transactions.len()
        );
        Ok(())
    }

    /// Replication identity of every existing row, keyed by table and id
    async fn sync_ids(
        txn: &dyn DatabaseTransaction,
    ) -> CoreResult<HashMap<&'static str, HashMap<i64, String>>> {
        let mut ids = HashMap::new();
        for table in TABLES {
            let rows = from_rows::<SyncIdRow>(
                txn.select(&format!("SELECT id, syncId FROM {table}"), Vec::new())
                    .await?,
            )?;
            ids.insert(
                table,
                rows.into_iter().map(|r| (r.id, r.sync_id)).collect(),
            );
        }
        Ok(ids)
    }

    async fn replace_all(txn: &dyn DatabaseTransaction, data: &ExportData) -> CoreResult<()> {
        // Rows that survive the import under the same id keep their identity
        let ids = Self::sync_ids(txn).await?;
        let sync_id = |table: &str, id: i64| -> SqlValue {
            ids.get(table)
                .and_then(|m| m.get(&id))
                .cloned()
                .into()
        };

        for table in TABLES.iter().rev() {
            txn.execute(&format!("DELETE FROM {table}"), Vec::new())
                .await?;
        }

        for p in &data.projects {
            txn.execute(
                &format!(
                    "INSERT INTO projects
                     (id, syncId, name, active, customerId, rate_in_cents, description, createdAt, updatedAt)
                     VALUES (?, {NEW_SYNC_ID}, ?, ?, ?, ?, ?, ?, ?)"
                ),
                vec![
                    p.id.into(),
                    sync_id("projects", p.id),
                    p.name.as_str().into(),
                    p.active.into(),
                    p.customer_id.clone().into(),
                    p.rate_in_cents.into(),
                    p.description.clone().into(),
                    p.created_at.into(),
                    p.updated_at.into(),
                ],
            )
            .await?;
        }

        for t in &data.timesheets {
            txn.execute(
                &format!(
                    "INSERT INTO timesheets
                     (id, syncId, projectId, invoiceId, name, description, active, createdAt, updatedAt)
                     VALUES (?, {NEW_SYNC_ID}, ?, ?, ?, ?, ?, ?, ?)"
                ),
                vec![
                    t.id.into(),
                    sync_id("timesheets", t.id),
                    t.project_id.into(),
                    t.invoice_id.clone().into(),
                    t.name.as_str().into(),
                    t.description.clone().into(),
                    t.active.into(),
                    t.created_at.into(),
                    t.updated_at.into(),
                ],
            )
            .await?;
        }

        for e in &data.timesheet_entries {
            txn.execute(
                &format!(
                    "INSERT INTO timesheet_entries
                     (id, syncId, timesheetId, date, minutes, description, amount, createdAt, updatedAt)
                     VALUES (?, {NEW_SYNC_ID}, ?, ?, ?, ?, ?, ?, ?)"
                ),
                vec![
                    e.id.into(),
                    sync_id("timesheet_entries", e.id),
                    e.timesheet_id.into(),
                    e.date.as_str().into(),
                    e.minutes.into(),
                    e.description.as_str().into(),
                    e.amount.into(),
                    e.created_at.into(),
                    e.updated_at.into(),
                ],
            )
            .await?;
        }

        for tx in &data.transactions {
            txn.execute(
                &format!(
                    "INSERT INTO transactions
                     (id, syncId, projectId, date, description, amount, filePath, createdAt, updatedAt)
                     VALUES (?, {NEW_SYNC_ID}, ?, ?, ?, ?, ?, ?, ?)"
                ),
                vec![
                    tx.id.into(),
                    sync_id("transactions", tx.id),
                    tx.project_id.into(),
                    tx.date.as_str().into(),
                    tx.description.as_str().into(),
                    tx.amount.into(),
                    tx.file_path.clone().into(),
                    tx.created_at.into(),
                    tx.updated_at.into(),
                ],
            )
            .await?;
        }

        // Deleting the old rows left tombstones; imported rows must not be
        // treated as deleted by the next sync.
        for table in TABLES {
            txn.execute(
                &format!(
                    "DELETE FROM sync_tombstones
                     WHERE tableName = ? AND syncId IN (SELECT syncId FROM {table})"
                ),
                vec![SqlValue::from(table)],
            )
            .await?;
        }

        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncIdRow {
    id: i64,
    sync_id: String,
}
