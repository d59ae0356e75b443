//! Row key rules shared by the stores.

use nanoid::nanoid;
use serde_json::Value;

use crate::{errors::RepoError, keys::key_repr, types::TableDescriptor};

const NANOID_KEY_LENGTH: usize = 20;

/// Key for a [`KeyStrategy::Nanoid`](crate::types::KeyStrategy::Nanoid) table.
pub fn generate_row_key() -> String {
    nanoid!(NANOID_KEY_LENGTH)
}

/// Value an increment sequence has to move past once `key` is stored.
///
/// Keys compare loosely, so a submitted `"12"` holds the same slot as `12`.
pub fn sequence_floor(key: &Value) -> Option<u64> {
    key_repr(key).parse().ok()
}

/// Raised when a [`KeyStrategy::Manual`](crate::types::KeyStrategy::Manual)
/// table receives a row without a key.
pub(crate) fn missing_key(table: &TableDescriptor) -> RepoError {
    RepoError::ConstraintViolation {
        table: table.name.clone(),
        column: table.key.clone(),
        message: "key must be supplied".to_string(),
    }
}
