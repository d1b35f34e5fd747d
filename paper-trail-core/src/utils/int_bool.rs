//! SQLite boolean serialization/deserialization helpers.
//!
//! SQLite stores booleans as `0` / `1`; exported JSON carries real booleans.
//! - Serialization: `bool` -> JSON boolean
//! - Deserialization: JSON boolean or integer -> `bool`

use serde::{Deserialize, Deserializer, Serializer};

/// Serializes `bool` as a JSON boolean.
#[allow(clippy::trivially_copy_pass_by_ref)]
pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_bool(*value)
}

/// Deserializes `bool` from a JSON boolean or an integer (non-zero is `true`).
pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrInt {
        Bool(bool),
        I64(i64),
    }

    match BoolOrInt::deserialize(deserializer)? {
        BoolOrInt::Bool(b) => Ok(b),
        BoolOrInt::I64(n) => Ok(n != 0),
    }
}
