//! Platform-agnostic application bootstrap for Paper Trail.
//!
//! Provides `AppState` (service container), `AppStateBuilder` (adapter
//! injection), `AppPaths` (per-install file locations), export file writing
//! and the concrete adapters in [`adapters`].

pub mod adapters;
pub mod exports;
pub mod paths;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use paper_trail_core::error::{CoreError, CoreResult};
use paper_trail_core::services::{
    DataTransferService, InvoiceService, ProfileService, ProjectService, ServiceContext,
    SyncService, TimesheetService, TransactionService, VaultService,
};
use paper_trail_core::traits::{
    BillingGateway, DatabaseClient, KeyValueStore, PasswordStore, SnapshotBackend,
};
use paper_trail_core::types::{VaultSettings, VaultStatus};

use adapters::{EncryptedFileBackend, StripeGateway};
pub use paths::AppPaths;

/// Platform-agnostic application state.
///
/// Holds all services and the `ServiceContext`. Every frontend constructs this
/// once at startup via `AppStateBuilder`.
pub struct AppState {
    /// Service context (database client and local key-value store)
    pub ctx: Arc<ServiceContext>,
    /// Credential vault holding the billing API key
    pub vault_service: Arc<VaultService>,
    /// Sync configuration and auto-sync
    pub sync_service: Arc<SyncService>,
    pub project_service: ProjectService,
    pub timesheet_service: TimesheetService,
    pub invoice_service: InvoiceService,
    /// Ledger transactions, accounting records and their exports
    pub transaction_service: TransactionService,
    /// User profile and sync codes
    pub profile_service: ProfileService,
    /// Export / import
    pub data_transfer_service: DataTransferService,
    /// Whether the startup sequence has completed
    pub startup_completed: AtomicBool,
}

impl AppState {
    /// Run the full startup sequence: vault warm-up → sync config restore.
    pub async fn run_startup(&self) -> CoreResult<()> {
        self.run_vault_warmup().await;
        self.run_sync_restore().await;
        self.startup_completed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Open (or create, or migrate) the vault before the first secret is needed.
    pub async fn run_vault_warmup(&self) -> VaultStatus {
        let status = self.vault_service.initialize().await;
        match &status {
            VaultStatus::Ready(outcome) => log::info!("Vault ready: {outcome:?}"),
            VaultStatus::Degraded => {
                log::warn!("Vault unavailable, secrets fall back to the local store");
            }
            other => log::debug!("Vault status after warm-up: {other:?}"),
        }
        status
    }

    /// Mirror the persisted sync configuration into the database client.
    pub async fn run_sync_restore(&self) {
        if let Err(e) = self.sync_service.restore_config().await {
            log::error!("Failed to restore sync configuration: {e}");
        }
    }
}

/// Builder for constructing `AppState` with platform-specific adapters.
///
/// # Required adapters
/// - `vault_settings`: snapshot path and vault constants
/// - `password_store`: where the vault password lives
/// - `local_store`: unencrypted key-value store
/// - `database`: relational store
///
/// # Optional
/// - `snapshot_backend`: defaults to `EncryptedFileBackend`
/// - `billing_gateway`: defaults to `StripeGateway` keyed from the vault
pub struct AppStateBuilder {
    vault_settings: Option<VaultSettings>,
    password_store: Option<Arc<dyn PasswordStore>>,
    snapshot_backend: Option<Arc<dyn SnapshotBackend>>,
    local_store: Option<Arc<dyn KeyValueStore>>,
    database: Option<Arc<dyn DatabaseClient>>,
    billing_gateway: Option<Arc<dyn BillingGateway>>,
}

impl AppStateBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vault_settings: None,
            password_store: None,
            snapshot_backend: None,
            local_store: None,
            database: None,
            billing_gateway: None,
        }
    }

    /// Builder wired to the desktop adapters under `paths`
    ///
    /// # Errors
    /// Returns an error if the data directory or local store cannot be opened.
    #[cfg(all(feature = "keyring-store", feature = "sqlite-store"))]
    pub fn for_platform(paths: &AppPaths) -> CoreResult<Self> {
        use adapters::{JsonFileStore, KeyringPasswordStore, SqliteDatabase};

        paths.ensure_dir()?;
        Ok(Self::new()
            .vault_settings(VaultSettings::new(paths.snapshot_file()))
            .password_store(Arc::new(KeyringPasswordStore::new()))
            .snapshot_backend(Arc::new(EncryptedFileBackend::new()))
            .local_store(Arc::new(JsonFileStore::open(paths.local_store_file())?))
            .database(Arc::new(SqliteDatabase::new(paths.database_file())?)))
    }

    #[must_use]
    pub fn vault_settings(mut self, settings: VaultSettings) -> Self {
        self.vault_settings = Some(settings);
        self
    }

    #[must_use]
    pub fn password_store(mut self, store: Arc<dyn PasswordStore>) -> Self {
        self.password_store = Some(store);
        self
    }

    #[must_use]
    pub fn snapshot_backend(mut self, backend: Arc<dyn SnapshotBackend>) -> Self {
        self.snapshot_backend = Some(backend);
        self
    }

    #[must_use]
    pub fn local_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.local_store = Some(store);
        self
    }

    #[must_use]
    pub fn database(mut self, database: Arc<dyn DatabaseClient>) -> Self {
        self.database = Some(database);
        self
    }

    #[must_use]
    pub fn billing_gateway(mut self, gateway: Arc<dyn BillingGateway>) -> Self {
        self.billing_gateway = Some(gateway);
        self
    }

    /// Build the `AppState`.
    ///
    /// # Errors
    /// Returns `CoreError::ValidationError` if required adapters are missing.
    pub fn build(self) -> CoreResult<AppState> {
        let vault_settings = self.vault_settings.ok_or_else(|| {
            CoreError::ValidationError("vault_settings is required".to_string())
        })?;
        let password_store = self.password_store.ok_or_else(|| {
            CoreError::ValidationError("password_store is required".to_string())
        })?;
        let local_store = self
            .local_store
            .ok_or_else(|| CoreError::ValidationError("local_store is required".to_string()))?;
        let database = self
            .database
            .ok_or_else(|| CoreError::ValidationError("database is required".to_string()))?;
        let snapshot_backend = self
            .snapshot_backend
            .unwrap_or_else(|| Arc::new(EncryptedFileBackend::new()));

        let ctx = Arc::new(ServiceContext::new(database, Arc::clone(&local_store)));

        let vault_service = Arc::new(VaultService::new(
            vault_settings,
            snapshot_backend,
            password_store,
            local_store,
        ));
        let billing_gateway = match self.billing_gateway {
            Some(gateway) => gateway,
            None => Arc::new(StripeGateway::new(Arc::clone(&vault_service))?),
        };

        let sync_service = Arc::new(SyncService::new(&ctx));
        let project_service = ProjectService::new(Arc::clone(&ctx));
        let timesheet_service = TimesheetService::new(Arc::clone(&ctx));
        let invoice_service = InvoiceService::new(Arc::clone(&ctx), billing_gateway);
        let transaction_service = TransactionService::new(Arc::clone(&ctx));
        let profile_service = ProfileService::new(Arc::clone(&ctx), Arc::clone(&sync_service));
        let data_transfer_service = DataTransferService::new(Arc::clone(&ctx));

        Ok(AppState {
            ctx,
            vault_service,
            sync_service,
            project_service,
            timesheet_service,
            invoice_service,
            transaction_service,
            profile_service,
            data_transfer_service,
            startup_completed: AtomicBool::new(false),
        })
    }
}

impl Default for AppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
