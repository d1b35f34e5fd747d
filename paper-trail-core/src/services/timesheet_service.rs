//! 时间表与时间记录服务

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::traits::{finish_transaction, select_as, DatabaseClient, DatabaseTransaction};
use crate::types::{
    CreateEntryRequest, CreateTimesheetRequest, SqlValue, Timesheet, TimesheetDetails,
    TimesheetEntry, UpdateEntryRequest, UpdateTimesheetRequest,
};
use crate::utils::date::normalize_date_input;

use super::project_service::TIMESHEET_COLUMNS;
use super::ServiceContext;

const ENTRY_COLUMNS: &str =
    "id, timesheetId, date, minutes, description, amount, createdAt, updatedAt";

pub(crate) const NOW: &str = "CAST(strftime('%s','now') AS INTEGER)";

/// Billed amount in cents for `minutes` at `rate_in_cents` per hour
///
/// Rounded to the nearest cent; negative inputs bill nothing.
///
/// # Errors
/// Returns `CoreError::ValidationError` when the amount does not fit in `i64`.
pub fn entry_amount(rate_in_cents: Option<i64>, minutes: i64) -> CoreResult<i64> {
    let rate = rate_in_cents.unwrap_or(0).max(0);
    let minutes = minutes.max(0);
    // Half-up rounding in integer arithmetic
    rate.checked_mul(minutes)
        .and_then(|cents| cents.checked_add(30))
        .map(|cents| cents / 60)
        .ok_or_else(|| {
            CoreError::ValidationError(format!(
                "Amount for {minutes} minutes at {rate} cents per hour is out of range"
            ))
        })
}

/// Whole minutes for a non-negative, finite number of hours
fn minutes_from_hours(hours: f64) -> CoreResult<i64> {
    if !hours.is_finite() || hours < 0.0 {
        return Err(CoreError::ValidationError(
            "Hours must be a non-negative number".to_string(),
        ));
    }
    let minutes = (hours * 60.0).round();
    #[allow(clippy::cast_precision_loss)]
    if minutes >= i64::MAX as f64 {
        return Err(CoreError::ValidationError(format!(
            "{hours} hours is out of range"
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    Ok(minutes as i64)
}

/// 时间表服务
pub struct TimesheetService {
    ctx: Arc<ServiceContext>,
}

impl TimesheetService {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    fn db(&self) -> &dyn DatabaseClient {
        self.ctx.database().as_ref()
    }

    /// 获取时间表详情（含项目客户 ID、费率和所有记录）
    pub async fn get_timesheet(&self, timesheet_id: i64) -> CoreResult<TimesheetDetails> {
        let mut details = select_as::<TimesheetDetails>(
            self.db(),
            "SELECT t.id, t.projectId, t.invoiceId, t.name, t.description, t.active,
                    t.createdAt, t.updatedAt,
                    p.customerId AS customerId, p.rate_in_cents AS projectRate
             FROM timesheets t
             JOIN projects p ON p.id = t.projectId
             WHERE t.id = ?",
            vec![timesheet_id.into()],
        )
        .await?
        .into_iter()
        .next()
        .ok_or(CoreError::TimesheetNotFound(timesheet_id))?;

        details.entries = select_as(
            self.db(),
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM timesheet_entries
                 WHERE timesheetId = ? ORDER BY date ASC, createdAt ASC, id ASC"
            ),
            vec![timesheet_id.into()],
        )
        .await?;

        Ok(details)
    }

    /// 为项目创建新的时间表
    pub async fn create_timesheet(&self, request: CreateTimesheetRequest) -> CoreResult<Timesheet> {
        let name = required_name(&request.name)?;

        let project_exists = !self
            .db()
            .select(
                "SELECT id FROM projects WHERE id = ?",
                vec![request.project_id.into()],
            )
            .await?
            .is_empty();
        if !project_exists {
            return Err(CoreError::ProjectNotFound(request.project_id));
        }

        let id = self
            .db()
            .execute(
                "INSERT INTO timesheets (projectId, name, description, active) VALUES (?, ?, ?, 1)",
                vec![
                    request.project_id.into(),
                    name.into(),
                    optional_text(request.description).into(),
                ],
            )
            .await?
            .last_insert_id;

        self.find_timesheet(id).await
    }

    /// 更新时间表名称、描述和开闭状态
    pub async fn update_timesheet(&self, request: UpdateTimesheetRequest) -> CoreResult<Timesheet> {
        let name = required_name(&request.name)?;

        let updated = self
            .db()
            .execute(
                &format!(
                    "UPDATE timesheets SET name = ?, description = ?, active = ?, updatedAt = {NOW}
                     WHERE id = ?"
                ),
                vec![
                    name.into(),
                    optional_text(request.description).into(),
                    request.active.into(),
                    request.id.into(),
                ],
            )
            .await?;
        if updated.rows_affected == 0 {
            return Err(CoreError::TimesheetNotFound(request.id));
        }

        self.find_timesheet(request.id).await
    }

    /// 添加时间记录
    ///
    /// Minutes come from `hours`; the amount is computed from the project rate.
    pub async fn add_entry(&self, request: CreateEntryRequest) -> CoreResult<TimesheetEntry> {
        let minutes = minutes_from_hours(request.hours)?;
        let date = normalize_date_input(&request.date)?;

        let timesheet = self.get_timesheet(request.timesheet_id).await?;
        if timesheet.timesheet.is_closed() {
            return Err(CoreError::TimesheetClosed(request.timesheet_id));
        }
        let amount = entry_amount(timesheet.project_rate, minutes)?;

        let id = self
            .db()
            .execute(
                "INSERT INTO timesheet_entries (timesheetId, date, minutes, description, amount)
                 VALUES (?, ?, ?, ?, ?)",
                vec![
                    request.timesheet_id.into(),
                    date.into(),
                    minutes.into(),
                    request.description.trim().into(),
                    amount.into(),
                ],
            )
            .await?
            .last_insert_id;

        self.find_entry(id).await
    }

    /// 修改时间记录，并按项目费率重新计算金额
    pub async fn update_entry(&self, request: UpdateEntryRequest) -> CoreResult<TimesheetEntry> {
        let minutes = minutes_from_hours(request.hours)?;
        let date = normalize_date_input(&request.date)?;

        let entry = self.find_entry(request.id).await?;
        let timesheet = self.get_timesheet(entry.timesheet_id).await?;
        if timesheet.timesheet.is_closed() {
            return Err(CoreError::TimesheetClosed(entry.timesheet_id));
        }
        let amount = entry_amount(timesheet.project_rate, minutes)?;

        self.db()
            .execute(
                &format!(
                    "UPDATE timesheet_entries
                     SET date = ?, minutes = ?, description = ?, amount = ?, updatedAt = {NOW}
                     WHERE id = ?"
                ),
                vec![
                    date.into(),
                    minutes.into(),
                    request.description.trim().into(),
                    amount.into(),
                    request.id.into(),
                ],
            )
            .await?;

        self.find_entry(request.id).await
    }

    /// 删除单条时间记录
    pub async fn delete_entry(&self, entry_id: i64) -> CoreResult<()> {
        self.db()
            .execute(
                "DELETE FROM timesheet_entries WHERE id = ?",
                vec![entry_id.into()],
            )
            .await?;
        Ok(())
    }

    /// 删除时间表及其记录（单一事务）
    pub async fn delete_timesheet(&self, timesheet_id: i64) -> CoreResult<()> {
        let txn = self.db().begin().await?;
        let result = Self::delete_timesheet_rows(txn.as_ref(), timesheet_id).await;
        finish_transaction(txn, result).await?;

        log::info!("Timesheet {timesheet_id} deleted");
        Ok(())
    }

    async fn delete_timesheet_rows(
        txn: &dyn DatabaseTransaction,
        timesheet_id: i64,
    ) -> CoreResult<()> {
        let id = SqlValue::from(timesheet_id);
        txn.execute(
            "DELETE FROM timesheet_entries WHERE timesheetId = ?",
            vec![id.clone()],
        )
        .await?;
        let deleted = txn
            .execute("DELETE FROM timesheets WHERE id = ?", vec![id])
            .await?;
        if deleted.rows_affected == 0 {
            return Err(CoreError::TimesheetNotFound(timesheet_id));
        }
        Ok(())
    }

    /// 记录发票 ID 并关闭时间表
    pub async fn attach_invoice(&self, timesheet_id: i64, invoice_id: &str) -> CoreResult<()> {
        let updated = self
            .db()
            .execute(
                &format!(
                    "UPDATE timesheets SET invoiceId = ?, active = 0, updatedAt = {NOW}
                     WHERE id = ?"
                ),
                vec![invoice_id.into(), timesheet_id.into()],
            )
            .await?;
        if updated.rows_affected == 0 {
            return Err(CoreError::TimesheetNotFound(timesheet_id));
        }
        Ok(())
    }

    async fn find_timesheet(&self, timesheet_id: i64) -> CoreResult<Timesheet> {
        select_as::<Timesheet>(
            self.db(),
            &format!("SELECT {TIMESHEET_COLUMNS} FROM timesheets WHERE id = ?"),
            vec![timesheet_id.into()],
        )
        .await?
        .into_iter()
        .next()
        .ok_or(CoreError::TimesheetNotFound(timesheet_id))
    }

    async fn find_entry(&self, entry_id: i64) -> CoreResult<TimesheetEntry> {
        select_as::<TimesheetEntry>(
            self.db(),
            &format!("SELECT {ENTRY_COLUMNS} FROM timesheet_entries WHERE id = ?"),
            vec![entry_id.into()],
        )
        .await?
        .into_iter()
        .next()
        .ok_or(CoreError::EntryNotFound(entry_id))
    }
}

fn required_name(name: &str) -> CoreResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::ValidationError(
            "Timesheet name is required".to_string(),
        ));
    }
    Ok(name.to_string())
}

/// Trimmed text, `None` when blank
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_context;
    use serde_json::json;

    fn header(active: bool) -> serde_json::Value {
        json!({
            "id": 2, "projectId": 1, "invoiceId": null, "name": "March",
            "description": "Consulting", "active": active,
            "createdAt": 1_700_000_000, "updatedAt": 1_700_000_000,
            "customerId": "cus_42", "projectRate": 9_000
        })
    }

    #[test]
    fn amount_rounds_to_nearest_cent() {
        assert_eq!(entry_amount(Some(9_000), 60).unwrap(), 9_000);
        assert_eq!(entry_amount(Some(9_000), 90).unwrap(), 13_500);
        assert_eq!(entry_amount(Some(100), 1).unwrap(), 2); // 1.666.. cents
        assert_eq!(entry_amount(None, 120).unwrap(), 0);
        assert_eq!(entry_amount(Some(-5), 60).unwrap(), 0);
    }

    #[test]
    fn amount_overflow_is_a_validation_error() {
        assert!(matches!(
            entry_amount(Some(9_000), i64::MAX / 2),
            Err(CoreError::ValidationError(_))
        ));
        assert!(matches!(
            entry_amount(Some(1), i64::MAX),
            Err(CoreError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn huge_hours_are_rejected_before_writing() {
        let (ctx, db, _) = create_test_context();
        db.on_select("JOIN projects", vec![header(true)]);

        for hours in [1e15, 1e300, f64::INFINITY, f64::NAN] {
            let result = TimesheetService::new(Arc::clone(&ctx))
                .add_entry(CreateEntryRequest {
                    timesheet_id: 2,
                    date: "2025-03-01".into(),
                    hours,
                    description: "Forever".into(),
                })
                .await;
            assert!(
                matches!(result, Err(CoreError::ValidationError(_))),
                "{hours} hours: {result:?}"
            );
        }
        assert!(db.params_of("INSERT INTO timesheet_entries").is_none());
    }

    #[tokio::test]
    async fn details_join_project_fields() {
        let (ctx, db, _) = create_test_context();
        db.on_select("JOIN projects", vec![header(true)]);
        db.on_select(
            "FROM timesheet_entries",
            vec![json!({
                "id": 1, "timesheetId": 2, "date": "2025-03-01", "minutes": 90,
                "description": "Design", "amount": 13_500,
                "createdAt": 1_700_000_000, "updatedAt": 1_700_000_000
            })],
        );

        let details = TimesheetService::new(ctx).get_timesheet(2).await.unwrap();
        assert_eq!(details.customer_id.as_deref(), Some("cus_42"));
        assert_eq!(details.project_rate, Some(9_000));
        assert_eq!(details.entries.len(), 1);
        assert_eq!(details.entries[0].amount, 13_500);
    }

    #[tokio::test]
    async fn add_entry_computes_minutes_and_amount() {
        let (ctx, db, _) = create_test_context();
        db.on_select("JOIN projects", vec![header(true)]);

        // 插入后回读的行未预置，因此返回 EntryNotFound；这里只校验写入参数
        let _ = TimesheetService::new(ctx)
            .add_entry(CreateEntryRequest {
                timesheet_id: 2,
                date: "3/1/2025".into(),
                hours: 1.5,
                description: " Design review ".into(),
            })
            .await;

        let params = db.params_of("INSERT INTO timesheet_entries").unwrap();
        assert_eq!(
            params,
            vec![
                SqlValue::Integer(2),
                SqlValue::Text("2025-03-01".into()),
                SqlValue::Integer(90),
                SqlValue::Text("Design review".into()),
                SqlValue::Integer(13_500),
            ]
        );
    }

    #[tokio::test]
    async fn closed_timesheet_rejects_entries() {
        let (ctx, db, _) = create_test_context();
        db.on_select("JOIN projects", vec![header(false)]);

        let result = TimesheetService::new(ctx)
            .add_entry(CreateEntryRequest {
                timesheet_id: 2,
                date: "2025-03-01".into(),
                hours: 1.0,
                description: "Late".into(),
            })
            .await;
        assert!(matches!(result, Err(CoreError::TimesheetClosed(2))));
    }

    #[tokio::test]
    async fn negative_hours_are_rejected() {
        let (ctx, _, _) = create_test_context();
        let result = TimesheetService::new(ctx)
            .add_entry(CreateEntryRequest {
                timesheet_id: 2,
                date: "2025-03-01".into(),
                hours: -1.0,
                description: String::new(),
            })
            .await;
        assert!(matches!(result, Err(CoreError::ValidationError(_))));
    }

    #[tokio::test]
    async fn delete_timesheet_rolls_back_on_failure() {
        let (ctx, db, _) = create_test_context();
        db.fail_on(Some("DELETE FROM timesheets"));

        let result = TimesheetService::new(ctx).delete_timesheet(2).await;
        assert!(result.is_err());
        assert_eq!(db.executed().last().map(String::as_str), Some("ROLLBACK"));
    }

    #[tokio::test]
    async fn update_entry_recomputes_amount_and_bumps_timestamp() {
        let (ctx, db, _) = create_test_context();
        db.on_select("JOIN projects", vec![header(true)]);
        db.on_select(
            "FROM timesheet_entries WHERE id",
            vec![json!({
                "id": 5, "timesheetId": 2, "date": "2025-03-01", "minutes": 60,
                "description": "Design", "amount": 9_000,
                "createdAt": 1_700_000_000, "updatedAt": 1_700_000_000
            })],
        );

        TimesheetService::new(ctx)
            .update_entry(UpdateEntryRequest {
                id: 5,
                date: "2025-03-02".into(),
                hours: 2.5,
                description: "Design and review".into(),
            })
            .await
            .unwrap();

        let (sql, params) = db
            .statements()
            .into_iter()
            .find(|(sql, _)| sql.starts_with("UPDATE timesheet_entries"))
            .unwrap();
        assert!(sql.contains("updatedAt"));
        assert_eq!(
            params,
            vec![
                SqlValue::Text("2025-03-02".into()),
                SqlValue::Integer(150),
                SqlValue::Text("Design and review".into()),
                SqlValue::Integer(22_500),
                SqlValue::Integer(5),
            ]
        );
    }

    #[tokio::test]
    async fn update_entry_on_closed_timesheet_is_rejected() {
        let (ctx, db, _) = create_test_context();
        db.on_select("JOIN projects", vec![header(false)]);
        db.on_select(
            "FROM timesheet_entries WHERE id",
            vec![json!({
                "id": 5, "timesheetId": 2, "date": "2025-03-01", "minutes": 60,
                "description": "Design", "amount": 9_000,
                "createdAt": 1_700_000_000, "updatedAt": 1_700_000_000
            })],
        );

        let result = TimesheetService::new(ctx)
            .update_entry(UpdateEntryRequest {
                id: 5,
                date: "2025-03-02".into(),
                hours: 1.0,
                description: "Late edit".into(),
            })
            .await;
        assert!(matches!(result, Err(CoreError::TimesheetClosed(2))));
        assert!(db.params_of("UPDATE timesheet_entries").is_none());
    }

    #[tokio::test]
    async fn update_missing_timesheet_reports_not_found() {
        let (ctx, db, _) = create_test_context();
        db.no_rows_on("UPDATE timesheets");

        let result = TimesheetService::new(ctx)
            .update_timesheet(UpdateTimesheetRequest {
                id: 9,
                name: "April".into(),
                description: None,
                active: false,
            })
            .await;
        assert!(matches!(result, Err(CoreError::TimesheetNotFound(9))));
    }

    #[tokio::test]
    async fn update_timesheet_writes_name_and_state() {
        let (ctx, db, _) = create_test_context();
        db.on_select(
            "FROM timesheets WHERE id",
            vec![json!({
                "id": 2, "projectId": 1, "invoiceId": null, "name": "April",
                "description": null, "active": 0,
                "createdAt": 1_700_000_000, "updatedAt": 1_700_000_100
            })],
        );

        let updated = TimesheetService::new(ctx)
            .update_timesheet(UpdateTimesheetRequest {
                id: 2,
                name: " April ".into(),
                description: Some("  ".into()),
                active: false,
            })
            .await
            .unwrap();
        assert!(updated.is_closed());
        assert_eq!(
            db.params_of("UPDATE timesheets").unwrap(),
            vec![
                SqlValue::Text("April".into()),
                SqlValue::Null,
                SqlValue::Integer(0),
                SqlValue::Integer(2),
            ]
        );
    }

    #[tokio::test]
    async fn delete_timesheet_runs_in_one_transaction() {
        let (ctx, db, _) = create_test_context();

        TimesheetService::new(ctx).delete_timesheet(2).await.unwrap();
        assert_eq!(
            db.executed(),
            vec![
                "BEGIN TRANSACTION".to_string(),
                "DELETE FROM timesheet_entries WHERE timesheetId = ?".to_string(),
                "DELETE FROM timesheets WHERE id = ?".to_string(),
                "COMMIT".to_string(),
            ]
        );
    }
}
