//! Serde and input normalization helpers

pub mod date;
pub mod int_bool;
