//! Platform adapters behind the core storage and billing traits.

mod encrypted_file_backend;
mod http;
mod json_file_store;
mod stripe;

pub use encrypted_file_backend::EncryptedFileBackend;
pub use json_file_store::JsonFileStore;
pub use stripe::StripeGateway;

#[cfg(feature = "keyring-store")]
mod keyring_password_store;

#[cfg(feature = "keyring-store")]
pub use keyring_password_store::KeyringPasswordStore;

#[cfg(feature = "sqlite-store")]
mod sqlite;

#[cfg(feature = "sqlite-store")]
pub use sqlite::{
    BatchStatement, HranaConnector, HranaRemote, RemoteConnector, RemoteDatabase, SqliteDatabase,
};
