//! Keyring-based password store.
//!
//! Uses the system keychain (macOS Keychain, Windows Credential Manager,
//! Linux Secret Service) via the `keyring` crate. Keychain calls block, so
//! they run on the blocking pool.

use async_trait::async_trait;
use keyring::Entry;

use paper_trail_core::error::{CoreError, CoreResult};
use paper_trail_core::traits::PasswordStore;

#[derive(Debug, Default)]
pub struct KeyringPasswordStore;

impl KeyringPasswordStore {
    pub fn new() -> Self {
        Self
    }

    fn get_entry(service: &str, account: &str) -> CoreResult<Entry> {
        Entry::new(service, account).map_err(|e| CoreError::CredentialError(e.to_string()))
    }

    fn read_sync(service: &str, account: &str) -> CoreResult<Option<String>> {
        let entry = Self::get_entry(service, account)?;
        match entry.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CoreError::CredentialError(e.to_string())),
        }
    }

    fn write_sync(service: &str, account: &str, password: &str) -> CoreResult<()> {
        let entry = Self::get_entry(service, account)?;
        entry
            .set_password(password)
            .map_err(|e| CoreError::CredentialError(e.to_string()))
    }
}

#[async_trait]
impl PasswordStore for KeyringPasswordStore {
    async fn get_password(&self, service: &str, account: &str) -> CoreResult<Option<String>> {
        let (service, account) = (service.to_string(), account.to_string());
        tokio::task::spawn_blocking(move || {
            log::debug!("Reading vault password from Keychain");
            Self::read_sync(&service, &account)
        })
        .await
        .map_err(|e| CoreError::CredentialError(format!("Task join error: {e}")))?
    }

    async fn set_password(&self, service: &str, account: &str, password: &str) -> CoreResult<()> {
        let (service, account, password) =
            (service.to_string(), account.to_string(), password.to_string());
        tokio::task::spawn_blocking(move || Self::write_sync(&service, &account, &password))
            .await
            .map_err(|e| CoreError::CredentialError(format!("Task join error: {e}")))??;

        log::info!("Vault password saved to Keychain");
        Ok(())
    }
}
