//! 存储与平台协作者抽象 Trait

mod billing_gateway;
mod database_client;
mod key_value_store;
mod password_store;
mod snapshot_backend;

pub use billing_gateway::BillingGateway;
pub use database_client::{
    finish_transaction, from_rows, is_transaction_control, select_as, DatabaseClient,
    DatabaseTransaction,
};
pub use key_value_store::KeyValueStore;
pub use password_store::PasswordStore;
pub use snapshot_backend::{SecretStore, Snapshot, SnapshotBackend};
