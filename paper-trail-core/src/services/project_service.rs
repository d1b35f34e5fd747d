//! 项目管理服务

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::traits::{
    finish_transaction, from_rows, select_as, DatabaseClient, DatabaseTransaction,
};
use crate::types::{
    CreateProjectRequest, CreatedProject, Project, ProjectWithTimesheets, SqlValue, Timesheet,
    TimesheetSummary,
};

use super::ServiceContext;

const PROJECT_COLUMNS: &str =
    "id, name, active, customerId, rate_in_cents, description, createdAt, updatedAt";

pub(crate) const TIMESHEET_COLUMNS: &str =
    "id, projectId, invoiceId, name, description, active, createdAt, updatedAt";

/// 项目服务
pub struct ProjectService {
    ctx: Arc<ServiceContext>,
}

impl ProjectService {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    fn db(&self) -> &dyn DatabaseClient {
        self.ctx.database().as_ref()
    }

    /// 列出所有项目（最新的在前）
    pub async fn list_projects(&self) -> CoreResult<Vec<Project>> {
        select_as(
            self.db(),
            &format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY createdAt DESC, id DESC"),
            Vec::new(),
        )
        .await
    }

    /// 获取项目及其时间表
    pub async fn get_project(&self, project_id: i64) -> CoreResult<ProjectWithTimesheets> {
        let project = self.find_project(project_id).await?;
        let timesheets: Vec<TimesheetSummary> = select_as(
            self.db(),
            "SELECT id, name, description, active, createdAt, updatedAt
             FROM timesheets WHERE projectId = ? ORDER BY createdAt DESC, id DESC",
            vec![project_id.into()],
        )
        .await?;

        Ok(ProjectWithTimesheets {
            project,
            timesheets,
        })
    }

    /// 创建项目，并在同一事务中创建初始时间表
    pub async fn create_project(&self, request: CreateProjectRequest) -> CoreResult<CreatedProject> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(CoreError::ValidationError(
                "Project name is required".to_string(),
            ));
        }
        if request.rate_in_cents.is_some_and(|rate| rate < 0) {
            return Err(CoreError::ValidationError(
                "Rate cannot be negative".to_string(),
            ));
        }

        let txn = self.db().begin().await?;
        let result = Self::insert_project_with_timesheet(txn.as_ref(), &name, request).await;
        let created = finish_transaction(txn, result).await?;

        log::info!(
            "Project {} created with timesheet {}",
            created.project.id,
            created.timesheet.id
        );
        Ok(created)
    }

    async fn insert_project_with_timesheet(
        txn: &dyn DatabaseTransaction,
        name: &str,
        request: CreateProjectRequest,
    ) -> CoreResult<CreatedProject> {
        let customer_id = request
            .customer_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let description = request
            .description
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let project_id = txn
            .execute(
                "INSERT INTO projects (name, customerId, rate_in_cents, description)
                 VALUES (?, ?, ?, ?)",
                vec![
                    name.into(),
                    customer_id.into(),
                    request.rate_in_cents.into(),
                    description.into(),
                ],
            )
            .await?
            .last_insert_id;

        let timesheet_name = format!("{} Timesheet", chrono::Local::now().format("%Y-%m-%d"));
        let timesheet_id = txn
            .execute(
                "INSERT INTO timesheets (projectId, name, description, active) VALUES (?, ?, ?, 1)",
                vec![
                    project_id.into(),
                    timesheet_name.into(),
                    "Initial timesheet".into(),
                ],
            )
            .await?
            .last_insert_id;

        let project = from_rows::<Project>(
            txn.select(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"),
                vec![project_id.into()],
            )
            .await?,
        )?
        .into_iter()
        .next()
        .ok_or(CoreError::ProjectNotFound(project_id))?;
        let timesheet = from_rows::<Timesheet>(
            txn.select(
                &format!("SELECT {TIMESHEET_COLUMNS} FROM timesheets WHERE id = ?"),
                vec![timesheet_id.into()],
            )
            .await?,
        )?
        .into_iter()
        .next()
        .ok_or(CoreError::TimesheetNotFound(timesheet_id))?;

        Ok(CreatedProject { project, timesheet })
    }

    /// 删除项目及其时间表和时间记录（单一事务）
    ///
    /// Either all three levels are removed or none are.
    pub async fn delete_project(&self, project_id: i64) -> CoreResult<()> {
        let txn = self.db().begin().await?;
        let result = Self::delete_project_rows(txn.as_ref(), project_id).await;
        finish_transaction(txn, result).await?;

        log::info!("Project {project_id} deleted");
        Ok(())
    }

    async fn delete_project_rows(
        txn: &dyn DatabaseTransaction,
        project_id: i64,
    ) -> CoreResult<()> {
        let id = SqlValue::from(project_id);

        txn.execute(
            "DELETE FROM timesheet_entries
             WHERE timesheetId IN (SELECT id FROM timesheets WHERE projectId = ?)",
            vec![id.clone()],
        )
        .await?;
        txn.execute(
            "DELETE FROM timesheets WHERE projectId = ?",
            vec![id.clone()],
        )
        .await?;
        let deleted = txn
            .execute("DELETE FROM projects WHERE id = ?", vec![id])
            .await?;

        if deleted.rows_affected == 0 {
            return Err(CoreError::ProjectNotFound(project_id));
        }
        Ok(())
    }

    async fn find_project(&self, project_id: i64) -> CoreResult<Project> {
        select_as::<Project>(
            self.db(),
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"),
            vec![project_id.into()],
        )
        .await?
        .into_iter()
        .next()
        .ok_or(CoreError::ProjectNotFound(project_id))
    }
}
