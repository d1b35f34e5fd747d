use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::ConnectionTrait;

use crate::adapters::sqlite::schema::{
    self, Projects, SyncTombstones, TimesheetEntries, Timesheets, Transactions,
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // projects, timesheets, timesheet_entries, transactions, sync_tombstones
        for table in schema::tables() {
            manager.create_table(table).await?;
        }

        // 删除触发器 → sync_tombstones
        let conn = manager.get_connection();
        for trigger in schema::triggers() {
            conn.execute_unprepared(&trigger).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncTombstones::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TimesheetEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Timesheets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Projects::Table).to_owned())
            .await?;

        Ok(())
    }
}
