//! 本地关系型存储抽象 Trait

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::{CoreError, CoreResult};
use crate::types::{ExecuteResult, RemoteSyncSettings, Row, SqlValue, SyncReport};

/// Local relational store with optional remote replication
///
/// Parameters bind positionally to `?` placeholders. `select` and `execute`
/// never touch the network; only `sync` does.
///
/// Access is serialized: while a transaction from `begin` is open, standalone
/// statements and `sync` wait until it commits or rolls back.
///
/// 平台实现:
/// - Desktop/CLI: `SqliteDatabase` (`SeaORM` + sqlx-sqlite)
/// - Tests: `MockDatabaseClient`
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Run a read-only query and return its rows
    async fn select(&self, query: &str, params: Vec<SqlValue>) -> CoreResult<Vec<Row>>;

    /// Run a write or DDL statement
    ///
    /// Transaction control statements (`BEGIN`, `COMMIT`, `ROLLBACK`, `END`)
    /// are rejected with `ValidationError`; use [`DatabaseClient::begin`].
    async fn execute(&self, query: &str, params: Vec<SqlValue>) -> CoreResult<ExecuteResult>;

    /// Open a transaction holding exclusive access to the store
    ///
    /// Dropping the handle without `commit` rolls the transaction back.
    async fn begin(&self) -> CoreResult<Box<dyn DatabaseTransaction>>;

    /// Run one replication round against the configured remote endpoint
    ///
    /// # Errors
    /// * `SyncDisabled` - settings disable sync; no network call is made
    /// * `SyncNotConfigured` - URL or token missing; no network call is made
    async fn sync(&self) -> CoreResult<SyncReport>;

    /// Replace the in-memory remote endpoint settings; does not sync
    async fn update_sync_config(&self, settings: RemoteSyncSettings) -> CoreResult<()>;
}

/// An open transaction; its statements see each other's writes
#[async_trait]
pub trait DatabaseTransaction: Send + Sync {
    async fn select(&self, query: &str, params: Vec<SqlValue>) -> CoreResult<Vec<Row>>;

    async fn execute(&self, query: &str, params: Vec<SqlValue>) -> CoreResult<ExecuteResult>;

    async fn commit(self: Box<Self>) -> CoreResult<()>;

    async fn rollback(self: Box<Self>) -> CoreResult<()>;
}

/// Deserialize each row into `T`
pub fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> CoreResult<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(serde_json::Value::Object(row))
                .map_err(|e| CoreError::SerializationError(format!("Failed to decode row: {e}")))
        })
        .collect()
}

/// Run a query and deserialize each row into `T`
pub async fn select_as<T: DeserializeOwned>(
    db: &dyn DatabaseClient,
    query: &str,
    params: Vec<SqlValue>,
) -> CoreResult<Vec<T>> {
    from_rows(db.select(query, params).await?)
}

/// Close a transaction
///
/// Commits when `result` is `Ok`; otherwise rolls back and returns the
/// original error. A failed rollback is logged, not returned.
pub async fn finish_transaction<T>(
    txn: Box<dyn DatabaseTransaction>,
    result: CoreResult<T>,
) -> CoreResult<T> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = txn.rollback().await {
                log::error!("Rollback failed: {rollback_err}");
            }
            Err(e)
        }
    }
}

/// Whether `query` opens or closes a transaction
pub fn is_transaction_control(query: &str) -> bool {
    let keyword = query
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == ';')
        .next()
        .unwrap_or_default();
    ["BEGIN", "COMMIT", "ROLLBACK", "END"]
        .iter()
        .any(|k| keyword.eq_ignore_ascii_case(k))
}
