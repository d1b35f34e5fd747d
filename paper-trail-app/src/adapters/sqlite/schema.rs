//! Table definitions shared by the local migration and the remote replica.

use sea_orm::sea_query::{
    ColumnDef, Expr, Iden, Index, SqliteQueryBuilder, Table, TableCreateStatement,
};
use sea_orm::DeriveIden;

const NOW: &str = "(CAST(strftime('%s','now') AS INTEGER))";

/// Random 128-bit identity as 32 hex digits
const NEW_SYNC_ID: &str = "(lower(hex(randomblob(16))))";

#[derive(DeriveIden)]
pub(crate) enum Projects {
    Table,
    Id,
    #[sea_orm(iden = "syncId")]
    SyncId,
    Name,
    Active,
    #[sea_orm(iden = "customerId")]
    CustomerId,
    #[sea_orm(iden = "rate_in_cents")]
    RateInCents,
    Description,
    #[sea_orm(iden = "createdAt")]
    CreatedAt,
    #[sea_orm(iden = "updatedAt")]
    UpdatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum Timesheets {
    Table,
    Id,
    #[sea_orm(iden = "syncId")]
    SyncId,
    #[sea_orm(iden = "projectId")]
    ProjectId,
    #[sea_orm(iden = "invoiceId")]
    InvoiceId,
    Name,
    Description,
    Active,
    #[sea_orm(iden = "createdAt")]
    CreatedAt,
    #[sea_orm(iden = "updatedAt")]
    UpdatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum TimesheetEntries {
    #[sea_orm(iden = "timesheet_entries")]
    Table,
    Id,
    #[sea_orm(iden = "syncId")]
    SyncId,
    #[sea_orm(iden = "timesheetId")]
    TimesheetId,
    Date,
    Minutes,
    Description,
    Amount,
    #[sea_orm(iden = "createdAt")]
    CreatedAt,
    #[sea_orm(iden = "updatedAt")]
    UpdatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum Transactions {
    Table,
    Id,
    #[sea_orm(iden = "syncId")]
    SyncId,
    #[sea_orm(iden = "projectId")]
    ProjectId,
    Date,
    Description,
    Amount,
    #[sea_orm(iden = "filePath")]
    FilePath,
    #[sea_orm(iden = "createdAt")]
    CreatedAt,
    #[sea_orm(iden = "updatedAt")]
    UpdatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum SyncTombstones {
    #[sea_orm(iden = "sync_tombstones")]
    Table,
    #[sea_orm(iden = "tableName")]
    TableName,
    #[sea_orm(iden = "syncId")]
    SyncId,
    #[sea_orm(iden = "deletedAt")]
    DeletedAt,
}

#[derive(DeriveIden)]
pub(crate) enum UserProfile {
    #[sea_orm(iden = "user_profile")]
    Table,
    Id,
    Uuid,
    #[sea_orm(iden = "displayName")]
    DisplayName,
    Email,
    #[sea_orm(iden = "createdAt")]
    CreatedAt,
    #[sea_orm(iden = "updatedAt")]
    UpdatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum AccountingTransactions {
    #[sea_orm(iden = "accounting_transactions")]
    Table,
    Id,
    Date,
    Description,
    Account,
    Category,
    Amount,
    #[sea_orm(iden = "filePath")]
    FilePath,
    #[sea_orm(iden = "createdAt")]
    CreatedAt,
    #[sea_orm(iden = "updatedAt")]
    UpdatedAt,
}

/// A replicated table and its columns, `id` and `syncId` first
pub(crate) struct ReplicatedTable {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    /// (table, column) pairs holding a foreign key to this table's `id`
    pub children: &'static [(&'static str, &'static str)],
}

/// Parents before children
pub(crate) static REPLICATED_TABLES: [ReplicatedTable; 4] = [
    ReplicatedTable {
        name: "projects",
        columns: &[
            "id",
            "syncId",
            "name",
            "active",
            "customerId",
            "rate_in_cents",
            "description",
            "createdAt",
            "updatedAt",
        ],
        children: &[("timesheets", "projectId"), ("transactions", "projectId")],
    },
    ReplicatedTable {
        name: "timesheets",
        columns: &[
            "id",
            "syncId",
            "projectId",
            "invoiceId",
            "name",
            "description",
            "active",
            "createdAt",
            "updatedAt",
        ],
        children: &[("timesheet_entries", "timesheetId")],
    },
    ReplicatedTable {
        name: "timesheet_entries",
        columns: &[
            "id",
            "syncId",
            "timesheetId",
            "date",
            "minutes",
            "description",
            "amount",
            "createdAt",
            "updatedAt",
        ],
        children: &[],
    },
    ReplicatedTable {
        name: "transactions",
        columns: &[
            "id",
            "syncId",
            "projectId",
            "date",
            "description",
            "amount",
            "filePath",
            "createdAt",
            "updatedAt",
        ],
        children: &[],
    },
];

fn id_col<T: Iden + 'static>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn sync_id_col<T: Iden + 'static>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .text()
        .not_null()
        .unique_key()
        .default(Expr::cust(NEW_SYNC_ID))
        .to_owned()
}

fn timestamp_col<T: Iden + 'static>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .big_integer()
        .not_null()
        .default(Expr::cust(NOW))
        .to_owned()
}

pub(crate) fn tables() -> Vec<TableCreateStatement> {
    vec![
        Table::create()
            .table(Projects::Table)
            .if_not_exists()
            .col(id_col(Projects::Id))
            .col(sync_id_col(Projects::SyncId))
            .col(ColumnDef::new(Projects::Name).text().not_null())
            .col(
                ColumnDef::new(Projects::Active)
                    .boolean()
                    .not_null()
                    .default(true),
            )
            .col(ColumnDef::new(Projects::CustomerId).text().null())
            .col(ColumnDef::new(Projects::RateInCents).integer().null())
            .col(ColumnDef::new(Projects::Description).text().null())
            .col(timestamp_col(Projects::CreatedAt))
            .col(timestamp_col(Projects::UpdatedAt))
            .to_owned(),
        Table::create()
            .table(Timesheets::Table)
            .if_not_exists()
            .col(id_col(Timesheets::Id))
            .col(sync_id_col(Timesheets::SyncId))
            .col(ColumnDef::new(Timesheets::ProjectId).integer().not_null())
            .col(ColumnDef::new(Timesheets::InvoiceId).text().null())
            .col(ColumnDef::new(Timesheets::Name).text().not_null())
            .col(ColumnDef::new(Timesheets::Description).text().null())
            .col(
                ColumnDef::new(Timesheets::Active)
                    .boolean()
                    .not_null()
                    .default(true),
            )
            .col(timestamp_col(Timesheets::CreatedAt))
            .col(timestamp_col(Timesheets::UpdatedAt))
            .to_owned(),
        Table::create()
            .table(TimesheetEntries::Table)
            .if_not_exists()
            .col(id_col(TimesheetEntries::Id))
            .col(sync_id_col(TimesheetEntries::SyncId))
            .col(
                ColumnDef::new(TimesheetEntries::TimesheetId)
                    .integer()
                    .not_null(),
            )
            .col(ColumnDef::new(TimesheetEntries::Date).text().not_null())
            .col(
                ColumnDef::new(TimesheetEntries::Minutes)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .col(
                ColumnDef::new(TimesheetEntries::Description)
                    .text()
                    .not_null()
                    .default(""),
            )
            .col(
                ColumnDef::new(TimesheetEntries::Amount)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .col(timestamp_col(TimesheetEntries::CreatedAt))
            .col(timestamp_col(TimesheetEntries::UpdatedAt))
            .to_owned(),
        Table::create()
            .table(Transactions::Table)
            .if_not_exists()
            .col(id_col(Transactions::Id))
            .col(sync_id_col(Transactions::SyncId))
            .col(ColumnDef::new(Transactions::ProjectId).integer().null())
            .col(ColumnDef::new(Transactions::Date).text().not_null())
            .col(
                ColumnDef::new(Transactions::Description)
                    .text()
                    .not_null()
                    .default(""),
            )
            .col(
                ColumnDef::new(Transactions::Amount)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .col(ColumnDef::new(Transactions::FilePath).text().null())
            .col(timestamp_col(Transactions::CreatedAt))
            .col(timestamp_col(Transactions::UpdatedAt))
            .to_owned(),
        Table::create()
            .table(SyncTombstones::Table)
            .if_not_exists()
            .col(ColumnDef::new(SyncTombstones::TableName).text().not_null())
            .col(ColumnDef::new(SyncTombstones::SyncId).text().not_null())
            .col(
                ColumnDef::new(SyncTombstones::DeletedAt)
                    .big_integer()
                    .not_null(),
            )
            .primary_key(
                Index::create()
                    .col(SyncTombstones::TableName)
                    .col(SyncTombstones::SyncId),
            )
            .to_owned(),
    ]
}

/// Tables kept on this device only
pub(crate) fn local_tables() -> Vec<TableCreateStatement> {
    vec![
        Table::create()
            .table(UserProfile::Table)
            .if_not_exists()
            .col(id_col(UserProfile::Id))
            .col(ColumnDef::new(UserProfile::Uuid).text().not_null())
            .col(ColumnDef::new(UserProfile::DisplayName).text().null())
            .col(ColumnDef::new(UserProfile::Email).text().null())
            .col(timestamp_col(UserProfile::CreatedAt))
            .col(timestamp_col(UserProfile::UpdatedAt))
            .to_owned(),
        Table::create()
            .table(AccountingTransactions::Table)
            .if_not_exists()
            .col(
                ColumnDef::new(AccountingTransactions::Id)
                    .text()
                    .not_null()
                    .primary_key(),
            )
            .col(ColumnDef::new(AccountingTransactions::Date).text().not_null())
            .col(
                ColumnDef::new(AccountingTransactions::Description)
                    .text()
                    .not_null(),
            )
            .col(
                ColumnDef::new(AccountingTransactions::Account)
                    .integer()
                    .not_null(),
            )
            .col(
                ColumnDef::new(AccountingTransactions::Category)
                    .text()
                    .not_null(),
            )
            .col(
                ColumnDef::new(AccountingTransactions::Amount)
                    .integer()
                    .not_null(),
            )
            .col(ColumnDef::new(AccountingTransactions::FilePath).text().null())
            .col(timestamp_col(AccountingTransactions::CreatedAt))
            .col(timestamp_col(AccountingTransactions::UpdatedAt))
            .to_owned(),
    ]
}

/// Delete triggers feeding `sync_tombstones`
///
/// A delete already covered by a tombstone at least as new as the row keeps
/// that tombstone's time; any other delete is stamped with the current time.
pub(crate) fn triggers() -> Vec<String> {
    REPLICATED_TABLES
        .iter()
        .map(|table| {
            let name = table.name;
            format!(
                "CREATE TRIGGER IF NOT EXISTS {name}_tombstone AFTER DELETE ON {name}
                 BEGIN
                     INSERT INTO sync_tombstones (tableName, syncId, deletedAt)
                     VALUES ('{name}', OLD.syncId, {NOW})
                     ON CONFLICT(tableName, syncId) DO UPDATE SET deletedAt = excluded.deletedAt
                     WHERE sync_tombstones.deletedAt < OLD.updatedAt;
                 END"
            )
        })
        .collect()
}

/// DDL for an empty remote replica, safe to run repeatedly
pub(crate) fn remote_statements() -> Vec<String> {
    tables()
        .iter()
        .map(|t| t.to_string(SqliteQueryBuilder))
        .chain(triggers())
        .collect()
}
