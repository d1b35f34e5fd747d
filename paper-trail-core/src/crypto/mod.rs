//! encryption module
//!
//! AES-256-GCM encryption/decryption used by the vault snapshot format, plus
//! generation of the per-installation vault password.

mod versions;

pub use versions::{get_pbkdf2_iterations, CURRENT_SNAPSHOT_VERSION};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pbkdf2::pbkdf2_hmac_array;
use rand::RngCore;
use sha2::Sha256;

use crate::error::{CoreError, CoreResult};

const SALT_LENGTH: usize = 16;
const NONCE_LENGTH: usize = 12;
const KEY_LENGTH: usize = 32; // AES-256

/// Number of random bytes behind a generated vault password
pub const VAULT_PASSWORD_BYTES: usize = 32;

/// Sealed payload: base64 salt, nonce and ciphertext
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
}

/// Derive encryption keys from passwords (supports custom number of iterations)
fn derive_key_with_iterations(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LENGTH] {
    pbkdf2_hmac_array::<Sha256, KEY_LENGTH>(password.as_bytes(), salt, iterations)
}

/// Generate a fresh vault password: 32 random bytes, base64 encoded.
pub fn generate_vault_password() -> String {
    let mut bytes = [0u8; VAULT_PASSWORD_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}

/// Encrypt data using a custom number of PBKDF2 iterations
pub fn encrypt_with_iterations(
    plaintext: &[u8],
    password: &str,
    iterations: u32,
) -> CoreResult<Sealed> {
    let mut salt = [0u8; SALT_LENGTH];
    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    rand::rng().fill_bytes(&mut salt);
    rand::rng().fill_bytes(&mut nonce_bytes);

    let key = derive_key_with_iterations(password, &salt, iterations);

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CoreError::SerializationError(format!("Failed to create cipher: {e}")))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CoreError::SerializationError(format!("Encryption failed: {e}")))?;

    Ok(Sealed {
        salt: BASE64.encode(salt),
        nonce: BASE64.encode(nonce_bytes),
        ciphertext: BASE64.encode(ciphertext),
    })
}

/// Decrypt data using a custom number of iterations
///
/// Wrong password and tampered ciphertext both surface as `SnapshotLocked`;
/// AES-GCM cannot tell them apart.
pub fn decrypt_with_iterations(
    sealed: &Sealed,
    password: &str,
    iterations: u32,
) -> CoreResult<Vec<u8>> {
    let salt = BASE64
        .decode(&sealed.salt)
        .map_err(|e| CoreError::SnapshotError(format!("Invalid salt: {e}")))?;
    let nonce_bytes = BASE64
        .decode(&sealed.nonce)
        .map_err(|e| CoreError::SnapshotError(format!("Invalid nonce: {e}")))?;
    let ciphertext = BASE64
        .decode(&sealed.ciphertext)
        .map_err(|e| CoreError::SnapshotError(format!("Invalid ciphertext: {e}")))?;

    if nonce_bytes.len() != NONCE_LENGTH {
        return Err(CoreError::SnapshotError(format!(
            "Invalid nonce length: {}",
            nonce_bytes.len()
        )));
    }

    let key = derive_key_with_iterations(password, &salt, iterations);

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CoreError::SerializationError(format!("Failed to create cipher: {e}")))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    cipher.decrypt(nonce, ciphertext.as_ref()).map_err(|_| {
        CoreError::SnapshotLocked("invalid password or corrupted data".to_string())
    })
}
