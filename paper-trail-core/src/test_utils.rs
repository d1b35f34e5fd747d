//! 测试辅助模块
//!
//! 提供 mock 实现和便捷的测试工厂方法。

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{CoreError, CoreResult};
use crate::services::ServiceContext;
use crate::traits::{
    BillingGateway, DatabaseClient, DatabaseTransaction, KeyValueStore, PasswordStore,
    SecretStore, Snapshot, SnapshotBackend,
};
use crate::types::{
    ExecuteResult, Invoice, InvoiceDraft, InvoiceItemDraft, RemoteSyncSettings, Row, SqlValue,
    SyncReport,
};

// ===== MockPasswordStore =====

pub struct MockPasswordStore {
    entries: RwLock<HashMap<(String, String), String>>,
    fail: AtomicBool,
    pub set_calls: AtomicUsize,
}

impl MockPasswordStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            fail: AtomicBool::new(false),
            set_calls: AtomicUsize::new(0),
        }
    }

    pub async fn with_entry(service: &str, account: &str, password: &str) -> Self {
        let store = Self::new();
        store
            .entries
            .write()
            .await
            .insert((service.to_string(), account.to_string()), password.to_string());
        store
    }

    /// 所有调用返回 `CredentialError`
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn password(&self, service: &str, account: &str) -> Option<String> {
        self.entries
            .read()
            .await
            .get(&(service.to_string(), account.to_string()))
            .cloned()
    }
}

#[async_trait]
impl PasswordStore for MockPasswordStore {
    async fn get_password(&self, service: &str, account: &str) -> CoreResult<Option<String>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::CredentialError("keychain unavailable".into()));
        }
        Ok(self.password(service, account).await)
    }

    async fn set_password(&self, service: &str, account: &str, password: &str) -> CoreResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::CredentialError("keychain unavailable".into()));
        }
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.entries
            .write()
            .await
            .insert((service.to_string(), account.to_string()), password.to_string());
        Ok(())
    }
}

// ===== MockSnapshotBackend =====

type Clients = HashMap<String, HashMap<String, Vec<u8>>>;

/// 内存中的"快照文件"
#[derive(Clone)]
pub enum MockFile {
    Sealed { password: String, clients: Clients },
    /// Unreadable with any password
    Corrupt,
}

#[derive(Default)]
pub struct MockDisk {
    files: StdMutex<HashMap<PathBuf, MockFile>>,
    backups: StdMutex<HashMap<PathBuf, MockFile>>,
    /// Saves by snapshots sealed with this password fail
    fail_save_password: StdMutex<Option<String>>,
}

pub struct MockSnapshotBackend {
    pub disk: Arc<MockDisk>,
    pub load_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub backup_calls: AtomicUsize,
}

impl MockSnapshotBackend {
    pub fn new() -> Self {
        Self {
            disk: Arc::new(MockDisk::default()),
            load_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            backup_calls: AtomicUsize::new(0),
        }
    }

    /// 预置一个用 `password` 加密、包含 `client` / `key` = `value` 的快照
    pub fn seed(&self, path: &Path, password: &str, client: &str, key: &str, value: &[u8]) {
        let mut clients = Clients::new();
        clients
            .entry(client.to_string())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        self.disk.files.lock().unwrap().insert(
            path.to_path_buf(),
            MockFile::Sealed {
                password: password.to_string(),
                clients,
            },
        );
    }

    pub fn seed_corrupt(&self, path: &Path) {
        self.disk
            .files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), MockFile::Corrupt);
    }

    pub fn fail_saves_for(&self, password: Option<&str>) {
        *self.disk.fail_save_password.lock().unwrap() = password.map(str::to_string);
    }

    pub fn file(&self, path: &Path) -> Option<MockFile> {
        self.disk.files.lock().unwrap().get(path).cloned()
    }

    /// 直接读取磁盘上的值（绕过服务）
    pub fn stored_value(&self, path: &Path, client: &str, key: &str) -> Option<(String, Vec<u8>)> {
        match self.file(path)? {
            MockFile::Sealed { password, clients } => clients
                .get(client)
                .and_then(|c| c.get(key))
                .map(|v| (password, v.clone())),
            MockFile::Corrupt => None,
        }
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.disk.files.lock().unwrap().keys().cloned().collect()
    }

    fn open_snapshot(&self, path: &Path, password: &str, clients: Clients) -> Arc<dyn Snapshot> {
        let clients = clients
            .into_iter()
            .map(|(name, entries)| (name, Arc::new(MockSecretStore::with_entries(entries))))
            .collect();
        Arc::new(MockSnapshot {
            disk: Arc::clone(&self.disk),
            path: path.to_path_buf(),
            password: password.to_string(),
            clients: RwLock::new(clients),
        })
    }
}

#[async_trait]
impl SnapshotBackend for MockSnapshotBackend {
    async fn exists(&self, path: &Path) -> CoreResult<bool> {
        Ok(self.disk.files.lock().unwrap().contains_key(path))
    }

    async fn load(&self, path: &Path, password: &str) -> CoreResult<Arc<dyn Snapshot>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        // 模拟 KDF 耗时，让并发调用者真正交错
        tokio::task::yield_now().await;
        let file = self.file(path);
        match file {
            None => Err(CoreError::SnapshotNotFound(path.display().to_string())),
            Some(MockFile::Corrupt) => Err(CoreError::SnapshotError("corrupt".into())),
            Some(MockFile::Sealed {
                password: sealed_with,
                clients,
            }) => {
                if sealed_with != password {
                    return Err(CoreError::SnapshotLocked("wrong password".into()));
                }
                Ok(self.open_snapshot(path, password, clients))
            }
        }
    }

    async fn create(&self, path: &Path, password: &str) -> CoreResult<Arc<dyn Snapshot>> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.open_snapshot(path, password, Clients::new()))
    }

    async fn backup(&self, path: &Path) -> CoreResult<PathBuf> {
        self.backup_calls.fetch_add(1, Ordering::SeqCst);
        let file = self
            .file(path)
            .ok_or_else(|| CoreError::SnapshotNotFound(path.display().to_string()))?;
        self.disk
            .backups
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), file);
        Ok(path.with_extension("bak"))
    }

    async fn restore_backup(&self, path: &Path) -> CoreResult<()> {
        let file = self
            .disk
            .backups
            .lock()
            .unwrap()
            .remove(path)
            .ok_or_else(|| CoreError::SnapshotError("no backup".into()))?;
        self.disk
            .files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), file);
        Ok(())
    }

    async fn remove_backup(&self, path: &Path) -> CoreResult<()> {
        self.disk.backups.lock().unwrap().remove(path);
        Ok(())
    }

    async fn quarantine(&self, path: &Path) -> CoreResult<PathBuf> {
        let mut files = self.disk.files.lock().unwrap();
        let file = files
            .remove(path)
            .ok_or_else(|| CoreError::SnapshotNotFound(path.display().to_string()))?;
        let target = path.with_extension("corrupt-test");
        files.insert(target.clone(), file);
        Ok(target)
    }
}

struct MockSnapshot {
    disk: Arc<MockDisk>,
    path: PathBuf,
    password: String,
    clients: RwLock<HashMap<String, Arc<MockSecretStore>>>,
}

#[async_trait]
impl Snapshot for MockSnapshot {
    async fn load_client(&self, name: &str) -> CoreResult<Arc<dyn SecretStore>> {
        self.clients
            .read()
            .await
            .get(name)
            .cloned()
            .map(|store| store as Arc<dyn SecretStore>)
            .ok_or_else(|| CoreError::ClientNotFound(name.to_string()))
    }

    async fn create_client(&self, name: &str) -> CoreResult<Arc<dyn SecretStore>> {
        let store = Arc::new(MockSecretStore::with_entries(HashMap::new()));
        self.clients
            .write()
            .await
            .insert(name.to_string(), Arc::clone(&store));
        Ok(store)
    }

    async fn save(&self) -> CoreResult<()> {
        if self.disk.fail_save_password.lock().unwrap().as_deref() == Some(self.password.as_str())
        {
            return Err(CoreError::SnapshotError("disk full".into()));
        }
        let mut clients = Clients::new();
        for (name, store) in self.clients.read().await.iter() {
            clients.insert(name.clone(), store.entries.read().await.clone());
        }
        self.disk.files.lock().unwrap().insert(
            self.path.clone(),
            MockFile::Sealed {
                password: self.password.clone(),
                clients,
            },
        );
        Ok(())
    }
}

pub struct MockSecretStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MockSecretStore {
    fn with_entries(entries: HashMap<String, Vec<u8>>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl SecretStore for MockSecretStore {
    async fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn insert(&self, key: &str, value: Vec<u8>) -> CoreResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

// ===== MockKeyValueStore =====

pub struct MockKeyValueStore {
    items: StdMutex<HashMap<String, String>>,
    fail: AtomicBool,
}

impl MockKeyValueStore {
    pub fn new() -> Self {
        Self {
            items: StdMutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.items.lock().unwrap().get(key).cloned()
    }

    fn check(&self) -> CoreResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::LocalStoreError("storage quota exceeded".into()));
        }
        Ok(())
    }
}

impl KeyValueStore for MockKeyValueStore {
    fn get_item(&self, key: &str) -> CoreResult<Option<String>> {
        self.check()?;
        Ok(self.raw(key))
    }

    fn set_item(&self, key: &str, value: &str) -> CoreResult<()> {
        self.check()?;
        self.items
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> CoreResult<()> {
        self.check()?;
        self.items.lock().unwrap().remove(key);
        Ok(())
    }
}

// ===== MockDatabaseClient =====

/// 语句记录与预置结果，客户端与其事务共享
#[derive(Default)]
pub struct MockSql {
    statements: StdMutex<Vec<(String, Vec<SqlValue>)>>,
    select_results: StdMutex<Vec<(String, Vec<Row>)>>,
    /// Statements containing this fragment fail
    fail_on: StdMutex<Option<String>>,
    /// Writes containing one of these fragments affect no rows
    no_rows_on: StdMutex<Vec<String>>,
    inserts: AtomicUsize,
}

impl MockSql {
    fn check(&self, query: &str) -> CoreResult<()> {
        if let Some(fragment) = self.fail_on.lock().unwrap().as_deref() {
            if query.contains(fragment) {
                return Err(CoreError::StorageError(format!("injected failure: {fragment}")));
            }
        }
        Ok(())
    }

    fn record(&self, query: &str, params: Vec<SqlValue>) -> CoreResult<()> {
        self.check(query)?;
        self.statements
            .lock()
            .unwrap()
            .push((query.to_string(), params));
        Ok(())
    }

    fn select(&self, query: &str, params: Vec<SqlValue>) -> CoreResult<Vec<Row>> {
        self.record(query, params)?;
        Ok(self
            .select_results
            .lock()
            .unwrap()
            .iter()
            .find(|(fragment, _)| query.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    fn execute(&self, query: &str, params: Vec<SqlValue>) -> CoreResult<ExecuteResult> {
        self.record(query, params)?;
        let id = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        let no_rows = self
            .no_rows_on
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| query.contains(fragment.as_str()));
        Ok(ExecuteResult {
            rows_affected: u64::from(!no_rows),
            last_insert_id: i64::try_from(id).unwrap(),
        })
    }
}

/// 记录语句的数据库 mock
///
/// `select` 按查询子串匹配预置结果；`sync` 依次消费预置结果（耗尽后成功）。
/// 事务把 `BEGIN TRANSACTION` / `COMMIT` / `ROLLBACK` 记入同一语句列表。
pub struct MockDatabaseClient {
    sql: Arc<MockSql>,
    sync_results: StdMutex<VecDeque<CoreResult<SyncReport>>>,
    pub sync_calls: AtomicUsize,
    pub settings: StdMutex<Option<RemoteSyncSettings>>,
    fail_update_settings: AtomicBool,
}

impl MockDatabaseClient {
    pub fn new() -> Self {
        Self {
            sql: Arc::new(MockSql::default()),
            sync_results: StdMutex::new(VecDeque::new()),
            sync_calls: AtomicUsize::new(0),
            settings: StdMutex::new(None),
            fail_update_settings: AtomicBool::new(false),
        }
    }

    pub fn on_select(&self, fragment: &str, rows: Vec<serde_json::Value>) {
        let rows = rows
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.sql
            .select_results
            .lock()
            .unwrap()
            .push((fragment.to_string(), rows));
    }

    pub fn fail_on(&self, fragment: Option<&str>) {
        *self.sql.fail_on.lock().unwrap() = fragment.map(str::to_string);
    }

    pub fn no_rows_on(&self, fragment: &str) {
        self.sql.no_rows_on.lock().unwrap().push(fragment.to_string());
    }

    pub fn push_sync_result(&self, result: CoreResult<SyncReport>) {
        self.sync_results.lock().unwrap().push_back(result);
    }

    pub fn set_fail_update_settings(&self, fail: bool) {
        self.fail_update_settings.store(fail, Ordering::SeqCst);
    }

    /// 已执行语句及其参数
    pub fn statements(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.sql.statements.lock().unwrap().clone()
    }

    /// 已执行语句的 SQL 文本
    pub fn executed(&self) -> Vec<String> {
        self.statements().into_iter().map(|(sql, _)| sql).collect()
    }

    /// Parameters of the first statement containing `fragment`
    pub fn params_of(&self, fragment: &str) -> Option<Vec<SqlValue>> {
        self.statements()
            .into_iter()
            .find(|(sql, _)| sql.contains(fragment))
            .map(|(_, params)| params)
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn select(&self, query: &str, params: Vec<SqlValue>) -> CoreResult<Vec<Row>> {
        self.sql.select(query, params)
    }

    async fn execute(&self, query: &str, params: Vec<SqlValue>) -> CoreResult<ExecuteResult> {
        self.sql.execute(query, params)
    }

    async fn begin(&self) -> CoreResult<Box<dyn DatabaseTransaction>> {
        self.sql.record("BEGIN TRANSACTION", Vec::new())?;
        Ok(Box::new(MockTransaction {
            sql: Arc::clone(&self.sql),
        }))
    }

    async fn sync(&self) -> CoreResult<SyncReport> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        self.sync_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(SyncReport::default()))
    }

    async fn update_sync_config(&self, settings: RemoteSyncSettings) -> CoreResult<()> {
        if self.fail_update_settings.load(Ordering::SeqCst) {
            return Err(CoreError::StorageError("client closed".into()));
        }
        *self.settings.lock().unwrap() = Some(settings);
        Ok(())
    }
}

pub struct MockTransaction {
    sql: Arc<MockSql>,
}

#[async_trait]
impl DatabaseTransaction for MockTransaction {
    async fn select(&self, query: &str, params: Vec<SqlValue>) -> CoreResult<Vec<Row>> {
        self.sql.select(query, params)
    }

    async fn execute(&self, query: &str, params: Vec<SqlValue>) -> CoreResult<ExecuteResult> {
        self.sql.execute(query, params)
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        self.sql.record("COMMIT", Vec::new())
    }

    async fn rollback(self: Box<Self>) -> CoreResult<()> {
        self.sql.record("ROLLBACK", Vec::new())
    }
}

// ===== MockBillingGateway =====

pub struct MockBillingGateway {
    pub calls: StdMutex<Vec<String>>,
    pub drafts: StdMutex<Vec<InvoiceDraft>>,
    pub items: StdMutex<Vec<InvoiceItemDraft>>,
    missing_key: AtomicBool,
}

impl MockBillingGateway {
    pub fn new() -> Self {
        Self {
            calls: StdMutex::new(Vec::new()),
            drafts: StdMutex::new(Vec::new()),
            items: StdMutex::new(Vec::new()),
            missing_key: AtomicBool::new(false),
        }
    }

    pub fn set_missing_key(&self, missing: bool) {
        self.missing_key.store(missing, Ordering::SeqCst);
    }

    fn record(&self, call: String) -> CoreResult<()> {
        if self.missing_key.load(Ordering::SeqCst) {
            return Err(CoreError::MissingApiKey);
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    fn invoice(id: &str, status: &str) -> Invoice {
        Invoice {
            id: id.to_string(),
            status: Some(status.to_string()),
            hosted_invoice_url: None,
            amount_due: None,
            extra: serde_json::Map::new(),
        }
    }
}

#[async_trait]
impl BillingGateway for MockBillingGateway {
    async fn create_invoice(&self, draft: &InvoiceDraft) -> CoreResult<Invoice> {
        self.record(format!("create:{}", draft.customer_id))?;
        self.drafts.lock().unwrap().push(draft.clone());
        Ok(Self::invoice("in_test", "draft"))
    }

    async fn add_invoice_item(
        &self,
        invoice_id: &str,
        item: &InvoiceItemDraft,
    ) -> CoreResult<()> {
        self.record(format!("item:{invoice_id}"))?;
        self.items.lock().unwrap().push(item.clone());
        Ok(())
    }

    async fn finalize_invoice(&self, invoice_id: &str) -> CoreResult<Invoice> {
        self.record(format!("finalize:{invoice_id}"))?;
        Ok(Self::invoice(invoice_id, "open"))
    }

    async fn send_invoice(&self, invoice_id: &str) -> CoreResult<Invoice> {
        self.record(format!("send:{invoice_id}"))?;
        Ok(Self::invoice(invoice_id, "open"))
    }

    async fn get_invoice(&self, invoice_id: &str) -> CoreResult<Invoice> {
        self.record(format!("get:{invoice_id}"))?;
        Ok(Self::invoice(invoice_id, "open"))
    }

    async fn mark_paid_out_of_band(&self, invoice_id: &str) -> CoreResult<Invoice> {
        self.record(format!("pay:{invoice_id}"))?;
        Ok(Self::invoice(invoice_id, "paid"))
    }

    async fn void_invoice(&self, invoice_id: &str) -> CoreResult<Invoice> {
        self.record(format!("void:{invoice_id}"))?;
        Ok(Self::invoice(invoice_id, "void"))
    }
}

// ===== 工厂方法 =====

pub fn create_test_context() -> (
    Arc<ServiceContext>,
    Arc<MockDatabaseClient>,
    Arc<MockKeyValueStore>,
) {
    let database = Arc::new(MockDatabaseClient::new());
    let local_store = Arc::new(MockKeyValueStore::new());
    let ctx = Arc::new(ServiceContext::new(
        Arc::clone(&database) as Arc<dyn DatabaseClient>,
        Arc::clone(&local_store) as Arc<dyn KeyValueStore>,
    ));
    (ctx, database, local_store)
}
