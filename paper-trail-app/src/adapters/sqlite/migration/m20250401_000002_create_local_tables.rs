use sea_orm_migration::prelude::*;

use crate::adapters::sqlite::schema::{self, AccountingTransactions, UserProfile};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // user_profile, accounting_transactions: 不参与同步
        for table in schema::local_tables() {
            manager.create_table(table).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AccountingTransactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserProfile::Table).to_owned())
            .await?;
        Ok(())
    }
}
