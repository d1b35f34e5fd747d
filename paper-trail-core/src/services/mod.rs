//! 业务逻辑服务层

mod data_transfer_service;
mod invoice_service;
mod profile_service;
mod project_service;
mod sync_service;
mod timesheet_service;
mod transaction_service;
mod vault_service;

pub use data_transfer_service::DataTransferService;
pub use invoice_service::InvoiceService;
pub use profile_service::ProfileService;
pub use project_service::ProjectService;
pub use sync_service::{AutoSyncHandle, SyncService, SYNC_CONFIG_KEY};
pub use timesheet_service::{entry_amount, TimesheetService};
pub use transaction_service::TransactionService;
pub use vault_service::VaultService;

use std::sync::Arc;

use crate::traits::{DatabaseClient, KeyValueStore};

/// 服务上下文 - 持有所有依赖
///
/// 平台层需要创建此上下文，并注入平台特定的存储实现。
pub struct ServiceContext {
    /// Local relational store (process-wide, shared by every service)
    pub database: Arc<dyn DatabaseClient>,
    /// Unencrypted local key-value store
    pub local_store: Arc<dyn KeyValueStore>,
}

impl ServiceContext {
    /// 创建服务上下文
    #[must_use]
    pub fn new(database: Arc<dyn DatabaseClient>, local_store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            database,
            local_store,
        }
    }

    pub fn database(&self) -> &Arc<dyn DatabaseClient> {
        &self.database
    }

    pub fn local_store(&self) -> &Arc<dyn KeyValueStore> {
        &self.local_store
    }
}
