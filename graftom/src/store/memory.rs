use std::collections::BTreeMap;

use log::trace;
use serde_json::Value;

use super::{Filter, Store, merged};
use crate::{
    errors::RepoError,
    id::{generate_row_key, missing_key, sequence_floor},
    keys::keys_match,
    types::{Attributes, KeyStrategy, Row, TableDescriptor},
};

#[derive(Debug, Clone, Default)]
struct TableData {
    rows: Vec<Attributes>,
    sequence: u64,
}

/// Number of statements a store has executed, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub selects: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
}

/// In-process store that enforces the declared column constraints.
///
/// Transactions snapshot every table on `begin` and restore the snapshot on
/// `rollback`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, TableData>,
    snapshot: Option<BTreeMap<String, TableData>>,
    stats: StoreStats,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored rows of a table, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Attributes> {
        self.tables.get(table).map(|data| data.rows.clone()).unwrap_or_default()
    }

    pub fn find(&self, table: &str, key_column: &str, key: &Value) -> Option<Attributes> {
        self.tables.get(table)?.rows.iter().find_map(|row| {
            row.get(key_column)
                .filter(|value| keys_match(value, key))
                .map(|_| row.clone())
        })
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn next_key(table: &TableDescriptor, data: &mut TableData) -> Result<Value, RepoError> {
        match table.key_strategy {
            KeyStrategy::Increment => {
                data.sequence += 1;
                Ok(Value::from(data.sequence))
            }
            KeyStrategy::Nanoid => Ok(Value::String(generate_row_key())),
            KeyStrategy::Manual => Err(missing_key(table)),
        }
    }
}

impl Store for MemoryStore {
    async fn insert(&mut self, table: &TableDescriptor, attributes: Attributes) -> Result<Row, RepoError> {
        self.stats.inserts += 1;
        let data = self.tables.entry(table.name.clone()).or_default();
        let mut attributes = attributes;
        table.apply_defaults(&mut attributes);

        let key = match attributes.get(&table.key) {
            Some(key) if !key.is_null() => {
                if let Some(numeric) = sequence_floor(key) {
                    data.sequence = data.sequence.max(numeric);
                }
                key.clone()
            }
            _ => {
                let key = Self::next_key(table, data)?;
                attributes.insert(table.key.clone(), key.clone());
                key
            }
        };

        if data
            .rows
            .iter()
            .any(|row| row.get(&table.key).is_some_and(|existing| keys_match(existing, &key)))
        {
            return Err(RepoError::DuplicateKey {
                table: table.name.clone(),
                key,
            });
        }
        table.check_row(&attributes)?;

        trace!("insert into {} key {}", table.name, key);
        data.rows.push(attributes.clone());
        Ok(Row::new(table, attributes))
    }

    async fn select(&mut self, table: &TableDescriptor, filter: &Filter) -> Result<Vec<Row>, RepoError> {
        self.stats.selects += 1;
        let rows = self
            .tables
            .get(&table.name)
            .map(|data| {
                data.rows
                    .iter()
                    .filter(|row| filter.matches(row))
                    .map(|row| Row::new(table, row.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn update(
        &mut self,
        table: &TableDescriptor,
        filter: &Filter,
        changes: &Attributes,
    ) -> Result<u64, RepoError> {
        self.stats.updates += 1;
        let Some(data) = self.tables.get_mut(&table.name) else {
            return Ok(0);
        };

        let mut pending = Vec::new();
        for (index, row) in data.rows.iter().enumerate() {
            if filter.matches(row) {
                let next = merged(row, changes);
                table.check_row(&next)?;
                pending.push((index, next));
            }
        }

        trace!("update {} rows in {}", pending.len(), table.name);
        let touched = pending.len() as u64;
        for (index, next) in pending {
            data.rows[index] = next;
        }
        Ok(touched)
    }

    async fn delete(&mut self, table: &TableDescriptor, filter: &Filter) -> Result<u64, RepoError> {
        self.stats.deletes += 1;
        let Some(data) = self.tables.get_mut(&table.name) else {
            return Ok(0);
        };
        let before = data.rows.len();
        data.rows.retain(|row| !filter.matches(row));
        let removed = (before - data.rows.len()) as u64;
        trace!("delete {} rows from {}", removed, table.name);
        Ok(removed)
    }

    async fn begin(&mut self) -> Result<(), RepoError> {
        if self.snapshot.is_some() {
            return Err(RepoError::transaction("transaction already active"));
        }
        self.snapshot = Some(self.tables.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), RepoError> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| RepoError::transaction("no active transaction"))
    }

    async fn rollback(&mut self) -> Result<(), RepoError> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| RepoError::transaction("no active transaction"))?;
        self.tables = snapshot;
        Ok(())
    }
}
