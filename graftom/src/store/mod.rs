//! Storage collaborator used by the writers.
//!
//! A [`Store`] executes set-based statements against one table at a time and
//! exposes transaction boundaries. Two backends ship with the crate:
//! [`MemoryStore`] (snapshot transactions, used by tests and walkthroughs) and
//! [`RedisStore`] (JSON rows in Redis with a journaled rollback).

mod memory;
mod redis_store;

pub use memory::{MemoryStore, StoreStats};
pub use redis_store::RedisStore;

use serde_json::Value;

use crate::{
    errors::RepoError,
    keys::keys_match,
    types::{Attributes, Row, TableDescriptor},
};

#[allow(async_fn_in_trait)]
pub trait Store {
    /// Inserts one row, applying column defaults and generating the key when absent.
    async fn insert(&mut self, table: &TableDescriptor, attributes: Attributes) -> Result<Row, RepoError>;

    /// Rows matching the filter, in insertion order.
    async fn select(&mut self, table: &TableDescriptor, filter: &Filter) -> Result<Vec<Row>, RepoError>;

    /// Applies `changes` to every matching row; returns the number of rows touched.
    async fn update(&mut self, table: &TableDescriptor, filter: &Filter, changes: &Attributes)
    -> Result<u64, RepoError>;

    /// Deletes every matching row; returns the number of rows removed.
    async fn delete(&mut self, table: &TableDescriptor, filter: &Filter) -> Result<u64, RepoError>;

    async fn begin(&mut self) -> Result<(), RepoError>;

    async fn commit(&mut self) -> Result<(), RepoError>;

    async fn rollback(&mut self) -> Result<(), RepoError>;

    async fn first(&mut self, table: &TableDescriptor, filter: &Filter) -> Result<Option<Row>, RepoError> {
        Ok(self.select(table, filter).await?.into_iter().next())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Loose equality; `Eq(column, Null)` matches null or missing columns.
    Eq(String, Value),
    In(String, Vec<Value>),
    /// Never matches rows whose column is null.
    NotIn(String, Vec<Value>),
}

impl Condition {
    fn matches(&self, attributes: &Attributes) -> bool {
        let current = |column: &String| attributes.get(column).unwrap_or(&Value::Null);
        match self {
            Condition::Eq(column, expected) => keys_match(current(column), expected),
            Condition::In(column, values) => {
                let value = current(column);
                values.iter().any(|candidate| keys_match(value, candidate))
            }
            Condition::NotIn(column, values) => {
                let value = current(column);
                !value.is_null() && !values.iter().any(|candidate| keys_match(value, candidate))
            }
        }
    }
}

/// Conjunction of conditions; an empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(column.into(), value.into()));
        self
    }

    pub fn is_in(mut self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.conditions.push(Condition::In(column.into(), values));
        self
    }

    pub fn not_in(mut self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.conditions.push(Condition::NotIn(column.into(), values));
        self
    }

    pub fn matches(&self, attributes: &Attributes) -> bool {
        self.conditions.iter().all(|condition| condition.matches(attributes))
    }
}

/// Row image after applying `changes` on top of `current`.
pub(crate) fn merged(current: &Attributes, changes: &Attributes) -> Attributes {
    let mut next = current.clone();
    for (column, value) in changes {
        next.insert(column.clone(), value.clone());
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn filter_uses_loose_key_equality() {
        let filter = Filter::all().eq("story_id", "4").is_in("id", vec![json!(1), json!("2")]);
        assert!(filter.matches(&row(json!({"id": 2, "story_id": 4}))));
        assert!(!filter.matches(&row(json!({"id": 3, "story_id": 4}))));
    }

    #[test]
    fn not_in_skips_nulls_and_eq_null_matches_missing() {
        let not_in = Filter::all().not_in("story_id", vec![json!(1)]);
        assert!(!not_in.matches(&row(json!({"id": 1}))));
        assert!(not_in.matches(&row(json!({"id": 1, "story_id": 2}))));

        let is_null = Filter::all().eq("story_id", Value::Null);
        assert!(is_null.matches(&row(json!({"id": 1}))));
        assert!(!is_null.matches(&row(json!({"id": 1, "story_id": 2}))));
    }
}
