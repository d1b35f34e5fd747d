//! 非加密本地键值存储抽象 Trait

use crate::error::CoreResult;

/// Small unencrypted key-value store (the desktop analogue of browser local storage).
///
/// Holds the sync configuration record and, in degraded mode only, the
/// plaintext secret. Operations are synchronous and cheap.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> CoreResult<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> CoreResult<()>;

    fn remove_item(&self, key: &str) -> CoreResult<()>;
}
