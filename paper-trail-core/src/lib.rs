//! Paper Trail Core Library
//!
//! Platform-independent logic for the Paper Trail bookkeeping application:
//! - Credential vault (encrypted snapshot holding the billing API key)
//! - Sync configuration and replication of the local database
//! - Projects, timesheets, invoicing and data export/import
//!
//! Storage and platform integrations are abstracted behind traits so the same
//! services run on top of the desktop adapters and in-memory test doubles.

pub mod crypto;
pub mod error;
pub mod services;
pub mod traits;
pub mod types;
pub mod utils;

#[cfg(test)]
mod test_utils;

// Re-export common types
pub use error::{CoreError, CoreResult};
pub use services::ServiceContext;
pub use traits::{
    BillingGateway, DatabaseClient, DatabaseTransaction, KeyValueStore, PasswordStore,
    SecretStore, Snapshot, SnapshotBackend,
};
