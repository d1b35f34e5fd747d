//! SQLite relational store using `SeaORM`.
//!
//! `SqliteDatabase` implements `DatabaseClient`: raw parameterized
//! select/execute against a local file, plus replication to a remote libSQL
//! database. The connection is opened lazily on first use and the schema
//! migrations run at most once per process.
//!
//! The pool holds exactly one connection. An access gate serializes its
//! users: an open transaction holds the gate until it ends, and standalone
//! statements and sync rounds wait for it.

mod hrana;
mod migration;
mod replication;
mod schema;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, JsonValue,
    QueryResult, Statement, TransactionTrait, Value,
};
use sea_orm_migration::MigratorTrait;
use tokio::sync::{Mutex, OnceCell, OwnedMutexGuard, RwLock};

use paper_trail_core::error::{CoreError, CoreResult};
use paper_trail_core::traits::{is_transaction_control, DatabaseClient, DatabaseTransaction};
use paper_trail_core::types::{ExecuteResult, RemoteSyncSettings, Row, SqlValue, SyncReport};

pub use hrana::{HranaConnector, HranaRemote};
pub use replication::{BatchStatement, RemoteConnector, RemoteDatabase};

use migration::Migrator;

/// SQLite-backed `DatabaseClient` with optional remote replication.
pub struct SqliteDatabase {
    path: PathBuf,
    conn: OnceCell<DatabaseConnection>,
    /// Set once the migrations have run in this process
    migrated: AtomicBool,
    /// Held by open transactions and for each standalone statement
    access: Arc<Mutex<()>>,
    settings: RwLock<RemoteSyncSettings>,
    connector: Arc<dyn RemoteConnector>,
}

impl SqliteDatabase {
    /// Database at `path` replicating to libSQL servers
    ///
    /// Nothing is opened until the first statement.
    ///
    /// # Errors
    /// Returns `CoreError::NetworkError` if the HTTP client cannot be built.
    pub fn new(path: impl Into<PathBuf>) -> CoreResult<Self> {
        Ok(Self::with_connector(path, Arc::new(HranaConnector::new()?)))
    }

    pub fn with_connector(path: impl Into<PathBuf>, connector: Arc<dyn RemoteConnector>) -> Self {
        Self {
            path: path.into(),
            conn: OnceCell::new(),
            migrated: AtomicBool::new(false),
            access: Arc::new(Mutex::new(())),
            settings: RwLock::new(RemoteSyncSettings::default()),
            connector,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn migrations_applied(&self) -> bool {
        self.migrated.load(Ordering::SeqCst)
    }

    async fn connection(&self) -> CoreResult<&DatabaseConnection> {
        self.conn
            .get_or_try_init(|| async {
                let db = self.connect().await?;
                if !self.migrated.swap(true, Ordering::SeqCst) {
                    if let Err(e) = Migrator::up(&db, None).await {
                        self.migrated.store(false, Ordering::SeqCst);
                        return Err(CoreError::StorageError(format!(
                            "Failed to run migrations: {e}"
                        )));
                    }
                    log::info!("Database schema ready at {}", self.path.display());
                }
                Ok(db)
            })
            .await
    }

    async fn connect(&self) -> CoreResult<DatabaseConnection> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::StorageError(format!("Failed to create directory: {e}")))?;
        }

        let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", self.path.display()));
        options
            .max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);

        Database::connect(options)
            .await
            .map_err(|e| CoreError::StorageError(format!("Failed to connect to SQLite: {e}")))
    }
}

fn statement(query: &str, params: Vec<SqlValue>) -> Statement {
    Statement::from_sql_and_values(DbBackend::Sqlite, query, params.into_iter().map(to_value))
}

fn to_value(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::BigInt(None),
        SqlValue::Integer(v) => Value::from(v),
        SqlValue::Real(v) => Value::from(v),
        SqlValue::Text(v) => Value::from(v),
        SqlValue::Blob(v) => Value::from(v),
    }
}

/// Decode a row by the runtime type of each value
///
/// Works for computed columns (`COUNT(*)`, expressions) that carry no
/// declared type.
fn to_row(result: &QueryResult) -> CoreResult<Row> {
    result
        .column_names()
        .into_iter()
        .enumerate()
        .map(|(idx, name)| column_value(result, idx).map(|value| (name, value)))
        .collect()
}

fn column_value(result: &QueryResult, idx: usize) -> CoreResult<JsonValue> {
    if let Ok(value) = result.try_get_by_index::<Option<i64>>(idx) {
        return Ok(value.map_or(JsonValue::Null, JsonValue::from));
    }
    if let Ok(value) = result.try_get_by_index::<Option<f64>>(idx) {
        return Ok(value.map_or(JsonValue::Null, JsonValue::from));
    }
    if let Ok(value) = result.try_get_by_index::<Option<String>>(idx) {
        return Ok(value.map_or(JsonValue::Null, JsonValue::from));
    }
    result
        .try_get_by_index::<Option<Vec<u8>>>(idx)
        .map(|value| value.map_or(JsonValue::Null, JsonValue::from))
        .map_err(|e| CoreError::SerializationError(format!("Failed to decode column {idx}: {e}")))
}

fn storage_error(e: &sea_orm::DbErr) -> CoreError {
    CoreError::StorageError(e.to_string())
}

fn execute_result(result: &sea_orm::ExecResult) -> ExecuteResult {
    ExecuteResult {
        rows_affected: result.rows_affected(),
        last_insert_id: i64::try_from(result.last_insert_id()).unwrap_or_default(),
    }
}

fn reject_transaction_control(query: &str) -> CoreResult<()> {
    if is_transaction_control(query) {
        return Err(CoreError::ValidationError(
            "Transaction control statements are not accepted; use begin()".to_string(),
        ));
    }
    Ok(())
}

async fn query_rows<C: ConnectionTrait>(
    conn: &C,
    query: &str,
    params: Vec<SqlValue>,
) -> CoreResult<Vec<Row>> {
    let rows = conn
        .query_all(statement(query, params))
        .await
        .map_err(|e| storage_error(&e))?;
    rows.iter().map(to_row).collect()
}

async fn execute_on<C: ConnectionTrait>(
    conn: &C,
    query: &str,
    params: Vec<SqlValue>,
) -> CoreResult<ExecuteResult> {
    let result = conn
        .execute(statement(query, params))
        .await
        .map_err(|e| storage_error(&e))?;
    Ok(execute_result(&result))
}

#[async_trait]
impl DatabaseClient for SqliteDatabase {
    async fn select(&self, query: &str, params: Vec<SqlValue>) -> CoreResult<Vec<Row>> {
        let conn = self.connection().await?;
        let _access = self.access.lock().await;
        query_rows(conn, query, params).await
    }

    async fn execute(&self, query: &str, params: Vec<SqlValue>) -> CoreResult<ExecuteResult> {
        reject_transaction_control(query)?;
        let conn = self.connection().await?;
        let _access = self.access.lock().await;
        execute_on(conn, query, params).await
    }

    async fn begin(&self) -> CoreResult<Box<dyn DatabaseTransaction>> {
        let conn = self.connection().await?;
        let access = Arc::clone(&self.access).lock_owned().await;
        let txn = conn.begin().await.map_err(|e| storage_error(&e))?;
        Ok(Box::new(SqliteTransaction {
            txn,
            _access: access,
        }))
    }

    async fn sync(&self) -> CoreResult<SyncReport> {
        let settings = self.settings.read().await.clone();
        if !settings.enabled {
            return Err(CoreError::SyncDisabled);
        }
        let url = settings
            .url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::SyncNotConfigured("sync URL is missing".to_string()))?;
        let token = settings
            .auth_token
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::SyncNotConfigured("auth token is missing".to_string()))?;

        let remote = self.connector.connect(url, token)?;
        let conn = self.connection().await?;
        let report = {
            let _access = self.access.lock().await;
            replication::replicate(&ConnectionView(conn), remote.as_ref()).await?
        };

        log::info!(
            "Sync complete: {} pulled, {} pushed, {} deleted",
            report.pulled,
            report.pushed,
            report.deleted
        );
        Ok(report)
    }

    async fn update_sync_config(&self, settings: RemoteSyncSettings) -> CoreResult<()> {
        log::debug!("Remote sync settings updated (enabled: {})", settings.enabled);
        *self.settings.write().await = settings;
        Ok(())
    }
}

/// Transaction on the shared connection; holds the access gate until it ends
struct SqliteTransaction {
    txn: sea_orm::DatabaseTransaction,
    _access: OwnedMutexGuard<()>,
}

#[async_trait]
impl DatabaseTransaction for SqliteTransaction {
    async fn select(&self, query: &str, params: Vec<SqlValue>) -> CoreResult<Vec<Row>> {
        query_rows(&self.txn, query, params).await
    }

    async fn execute(&self, query: &str, params: Vec<SqlValue>) -> CoreResult<ExecuteResult> {
        reject_transaction_control(query)?;
        execute_on(&self.txn, query, params).await
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        let this = *self;
        this.txn.commit().await.map_err(|e| storage_error(&e))
    }

    async fn rollback(self: Box<Self>) -> CoreResult<()> {
        let this = *self;
        this.txn.rollback().await.map_err(|e| storage_error(&e))
    }
}

/// The open connection, used while the caller already holds the gate
struct ConnectionView<'a>(&'a DatabaseConnection);

#[async_trait]
impl RemoteDatabase for ConnectionView<'_> {
    async fn query(&self, sql: &str, params: Vec<SqlValue>) -> CoreResult<Vec<Row>> {
        query_rows(self.0, sql, params).await
    }

    async fn execute_batch(
        &self,
        statements: Vec<BatchStatement>,
    ) -> CoreResult<Vec<ExecuteResult>> {
        let txn = self.0.begin().await.map_err(|e| storage_error(&e))?;

        let mut results = Vec::with_capacity(statements.len());
        for (sql, params) in statements {
            match execute_on(&txn, &sql, params).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    if let Err(rollback_err) = txn.rollback().await {
                        log::error!("Rollback failed: {rollback_err}");
                    }
                    return Err(e);
                }
            }
        }

        txn.commit().await.map_err(|e| storage_error(&e))?;
        Ok(results)
    }
}

/// Lets a local database act as the replica of another one
#[async_trait]
impl RemoteDatabase for SqliteDatabase {
    async fn query(&self, sql: &str, params: Vec<SqlValue>) -> CoreResult<Vec<Row>> {
        let conn = self.connection().await?;
        let _access = self.access.lock().await;
        ConnectionView(conn).query(sql, params).await
    }

    async fn execute_batch(
        &self,
        statements: Vec<BatchStatement>,
    ) -> CoreResult<Vec<ExecuteResult>> {
        let conn = self.connection().await?;
        let _access = self.access.lock().await;
        ConnectionView(conn).execute_batch(statements).await
    }
}
