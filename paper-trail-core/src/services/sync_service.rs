//! 同步配置与同步调度服务
//!
//! The persisted `SyncConfig` in the key-value store is the source of truth.
//! Every change is mirrored into the database client's in-memory settings,
//! and `sync_now` re-reads the store so a toggle applies on the next call.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::{CoreError, CoreResult};
use crate::traits::{DatabaseClient, KeyValueStore};
use crate::types::{RemoteSyncSettings, SyncConfig, SyncReport};

use super::ServiceContext;

/// Key of the sync configuration record in the key-value store
pub const SYNC_CONFIG_KEY: &str = "paper-trail-sync-config";

const MIN_AUTO_SYNC_INTERVAL: Duration = Duration::from_secs(1);
const MAX_AUTO_SYNC_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Sync configuration service
pub struct SyncService {
    database: Arc<dyn DatabaseClient>,
    store: Arc<dyn KeyValueStore>,
    /// Serializes read-modify-write of the config record
    config_lock: Mutex<()>,
}

impl SyncService {
    pub fn new(ctx: &ServiceContext) -> Self {
        Self {
            database: Arc::clone(ctx.database()),
            store: Arc::clone(ctx.local_store()),
            config_lock: Mutex::new(()),
        }
    }

    /// Persisted configuration, or the default when absent or unreadable
    pub fn get_config(&self) -> SyncConfig {
        match self.store.get_item(SYNC_CONFIG_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                log::warn!("Invalid sync config, using defaults: {e}");
                SyncConfig::default()
            }),
            Ok(None) => SyncConfig::default(),
            Err(e) => {
                log::warn!("Failed to read sync config, using defaults: {e}");
                SyncConfig::default()
            }
        }
    }

    /// Persist `config` and mirror it into the database client
    ///
    /// If mirroring fails the previously persisted record is restored.
    pub async fn set_config(&self, config: &SyncConfig) -> CoreResult<()> {
        let _guard = self.config_lock.lock().await;
        self.persist_and_mirror(config).await
    }

    /// Point sync at a remote database and enable it
    pub async fn configure_remote(&self, url: &str, auth_token: &str) -> CoreResult<SyncConfig> {
        let url = url.trim();
        let auth_token = auth_token.trim();
        if url.is_empty() || auth_token.is_empty() {
            return Err(CoreError::ValidationError(
                "Sync URL and auth token are required".to_string(),
            ));
        }

        let _guard = self.config_lock.lock().await;
        let config = SyncConfig {
            sync_url: Some(url.to_string()),
            auth_token: Some(auth_token.to_string()),
            enable_sync: true,
            ..self.get_config()
        };
        self.persist_and_mirror(&config).await?;
        log::info!("Remote sync configured");
        Ok(config)
    }

    /// Disable sync, keeping URL and token for later re-enabling
    pub async fn disable_sync(&self) -> CoreResult<SyncConfig> {
        self.set_enabled(false).await
    }

    /// Re-enable sync with the stored URL and token
    pub async fn enable_sync(&self) -> CoreResult<SyncConfig> {
        self.set_enabled(true).await
    }

    async fn set_enabled(&self, enable_sync: bool) -> CoreResult<SyncConfig> {
        let _guard = self.config_lock.lock().await;
        let config = SyncConfig {
            enable_sync,
            ..self.get_config()
        };
        self.persist_and_mirror(&config).await?;
        log::info!("Sync {}", if enable_sync { "enabled" } else { "disabled" });
        Ok(config)
    }

    /// Mirror the persisted configuration into the database client (startup)
    pub async fn restore_config(&self) -> CoreResult<()> {
        let config = self.get_config();
        self.database
            .update_sync_config(RemoteSyncSettings::from(&config))
            .await
    }

    /// Run one replication round now
    ///
    /// # Errors
    /// * `SyncDisabled` - config disables sync; the database is not contacted
    /// * `SyncNotConfigured` - URL or token missing
    pub async fn sync_now(&self) -> CoreResult<SyncReport> {
        let config = self.get_config();
        if !config.enable_sync {
            return Err(CoreError::SyncDisabled);
        }
        if !config.is_ready() {
            return Err(CoreError::SyncNotConfigured(
                "sync URL or auth token missing".to_string(),
            ));
        }

        self.database
            .update_sync_config(RemoteSyncSettings::from(&config))
            .await?;
        let report = self.database.sync().await?;
        log::info!(
            "Sync completed: {} pulled, {} pushed, {} deleted",
            report.pulled,
            report.pushed,
            report.deleted
        );
        Ok(report)
    }

    /// Start periodic sync every `interval`, clamped to between one second
    /// and one day
    ///
    /// A tick only syncs when sync is enabled and URL and token are present.
    /// Failures are logged and never stop the schedule. Dropping or
    /// cancelling the handle stops future ticks; a sync in flight completes.
    pub fn start_auto_sync(self: &Arc<Self>, interval: Duration) -> AutoSyncHandle {
        let period = interval.clamp(MIN_AUTO_SYNC_INTERVAL, MAX_AUTO_SYNC_INTERVAL);
        let service = Arc::clone(self);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }
                service.run_scheduled_sync().await;
            }
            log::debug!("Auto-sync stopped");
        });

        log::info!("Auto-sync started, every {}s", period.as_secs());
        AutoSyncHandle {
            cancel: cancel_tx,
            task,
        }
    }

    async fn run_scheduled_sync(&self) {
        if !self.get_config().is_ready() {
            log::debug!("Auto-sync tick skipped: sync disabled or not configured");
            return;
        }
        if let Err(e) = self.sync_now().await {
            if e.is_expected() {
                log::warn!("Auto-sync failed: {e}");
            } else {
                log::error!("Auto-sync failed: {e}");
            }
        }
    }

    async fn persist_and_mirror(&self, config: &SyncConfig) -> CoreResult<()> {
        let previous = self.store.get_item(SYNC_CONFIG_KEY)?;
        let raw = serde_json::to_string(config)?;
        self.store.set_item(SYNC_CONFIG_KEY, &raw)?;

        if let Err(e) = self
            .database
            .update_sync_config(RemoteSyncSettings::from(config))
            .await
        {
            log::error!("Failed to apply sync config to database client, rolling back: {e}");
            let rollback = match previous {
                Some(raw) => self.store.set_item(SYNC_CONFIG_KEY, &raw),
                None => self.store.remove_item(SYNC_CONFIG_KEY),
            };
            if let Err(rollback_err) = rollback {
                log::error!("Failed to roll back sync config: {rollback_err}");
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Cancellation handle of a running auto-sync schedule
pub struct AutoSyncHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AutoSyncHandle {
    /// Stop future ticks
    pub fn cancel(&self) {
        // Receiver gone means the task already exited.
        let _ = self.cancel.send(true);
    }

    /// Stop future ticks and wait for the task (and any sync in flight)
    pub async fn shutdown(self) {
        self.cancel();
        let task = self.task;
        if let Err(e) = task.await {
            log::error!("Auto-sync task ended abnormally: {e}");
        }
    }
}
