use std::borrow::Cow;

use serde_json::Value;
use thiserror::Error;

/// Top-level error type returned by graftom writers and stores.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Underlying Redis command failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored row or submitted payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A row with the same key already exists in the table.
    #[error("duplicate key {key} in table `{table}`")]
    DuplicateKey { table: String, key: Value },

    /// The store refused a write that would break a column constraint.
    #[error("constraint violation on `{table}.{column}`: {message}")]
    ConstraintViolation {
        table: String,
        column: String,
        message: String,
    },

    /// Transaction bookkeeping failed (nested begin, commit without begin, ...).
    #[error("transaction error: {message}")]
    Transaction { message: Cow<'static, str> },

    /// The table is not registered in the schema.
    #[error("table `{table}` is not registered")]
    UnknownTable { table: String },

    /// The relation is not declared on the owning table.
    #[error("relation `{relation}` is not declared on table `{table}`")]
    UnknownRelation { table: String, relation: String },

    /// Submitted relation values have a shape the reconciler cannot use.
    #[error("malformed submission for relation `{relation}`: {message}")]
    MalformedSubmission { relation: String, message: String },

    /// Nested relation payloads go deeper than the configured limit.
    #[error("relation nesting exceeded limit of {limit}")]
    NestingTooDeep { limit: usize },

    #[error("{message}")]
    Other { message: Cow<'static, str> },
}

impl RepoError {
    pub(crate) fn malformed(relation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedSubmission {
            relation: relation.into(),
            message: message.into(),
        }
    }

    pub(crate) fn transaction(message: &'static str) -> Self {
        Self::Transaction {
            message: Cow::Borrowed(message),
        }
    }

    /// True for failures raised by the storage layer itself (connection,
    /// serialization, key and column constraints, transactions).
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::Redis(_)
                | Self::Serialization(_)
                | Self::DuplicateKey { .. }
                | Self::ConstraintViolation { .. }
                | Self::Transaction { .. }
        )
    }
}
