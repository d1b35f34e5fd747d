//! Snapshot encryption version management
//!
//! Each snapshot envelope records a version number; the key derivation
//! parameters behind a version are defined here and never stored in the file.
//!
//! - Version 1: PBKDF2-HMAC-SHA256, 100,000 iterations
//! - Version 2: PBKDF2-HMAC-SHA256, 600,000 iterations (OWASP 2023 Recommended)

/// Version 1: PBKDF2-HMAC-SHA256, 100,000 iterations
const VERSION_1_ITERATIONS: u32 = 100_000;

/// Version 2: PBKDF2-HMAC-SHA256, 600,000 iterations
const VERSION_2_ITERATIONS: u32 = 600_000;

/// Version written into newly saved snapshots
pub const CURRENT_SNAPSHOT_VERSION: u32 = 2;

// CURRENT_SNAPSHOT_VERSION must map to a known iteration count
const _: () = assert!(get_pbkdf2_iterations(CURRENT_SNAPSHOT_VERSION).is_some());

/// Get the number of PBKDF2 iterations for the specified snapshot version
pub const fn get_pbkdf2_iterations(version: u32) -> Option<u32> {
    match version {
        1 => Some(VERSION_1_ITERATIONS),
        2 => Some(VERSION_2_ITERATIONS),
        _ => None,
    }
}
