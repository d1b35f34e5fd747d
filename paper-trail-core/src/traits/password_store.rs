//! 平台凭证存储抽象 Trait

use async_trait::async_trait;

use crate::error::CoreResult;

/// Platform credential store (OS keychain)
///
/// 平台实现:
/// - Desktop: `KeyringPasswordStore` (keyring crate)
/// - Tests: `MockPasswordStore`
#[async_trait]
pub trait PasswordStore: Send + Sync {
    /// Read the password stored under `service` / `account`
    ///
    /// # Returns
    /// * `Ok(Some(password))` - entry exists
    /// * `Ok(None)` - no entry yet
    async fn get_password(&self, service: &str, account: &str) -> CoreResult<Option<String>>;

    /// Create or overwrite the entry under `service` / `account`
    async fn set_password(&self, service: &str, account: &str, password: &str) -> CoreResult<()>;
}
