use log::trace;
use redis::{aio::ConnectionLike, cmd};

use super::{Filter, Store, merged};
use crate::{
    errors::RepoError,
    id::{generate_row_key, missing_key, sequence_floor},
    keys::{KeyContext, key_repr},
    types::{Attributes, KeyStrategy, Row, TableDescriptor},
};

const PURGE_BATCH: usize = 500;

#[derive(Debug)]
struct UndoEntry {
    table: String,
    key: String,
    /// Row document before the write; `None` when the write created the row.
    previous: Option<String>,
    /// Index score of a deleted row, so a restored row keeps its position.
    order: Option<f64>,
}

/// Store keeping each row as a JSON document in Redis.
///
/// Layout per table: `{prefix}:{table}:{key}` documents, a `{prefix}:{table}:_keys`
/// sorted set ordering keys by insertion, and a `{prefix}:{table}:_seq` counter.
/// Redis cannot roll back a read-then-write sequence, so transactions journal
/// the before-image of every touched row and `rollback` writes them back.
pub struct RedisStore<C>
where
    C: ConnectionLike + Send,
{
    conn: C,
    prefix: String,
    journal: Option<Vec<UndoEntry>>,
}

impl<C> RedisStore<C>
where
    C: ConnectionLike + Send,
{
    pub fn new(conn: C, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
            journal: None,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Removes every key under this store's prefix and returns how many went.
    /// Not journaled: a purge inside a transaction is not undone by `rollback`.
    pub async fn purge(&mut self) -> Result<u64, RepoError> {
        let pattern = format!("{}:*", self.prefix);
        let mut cursor = 0_u64;
        let mut purged = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(PURGE_BATCH)
                .query_async(&mut self.conn)
                .await?;
            if !batch.is_empty() {
                let removed: u64 = cmd("UNLINK").arg(&batch).query_async(&mut self.conn).await?;
                purged += removed;
            }
            if next == 0 {
                trace!("purged {purged} keys under {}", self.prefix);
                return Ok(purged);
            }
            cursor = next;
        }
    }

    async fn load(&mut self, table: &TableDescriptor) -> Result<Vec<(String, Attributes)>, RepoError> {
        let ctx = KeyContext::new(&self.prefix);
        let members: Vec<String> = cmd("ZRANGE")
            .arg(ctx.table_index(&table.name))
            .arg(0)
            .arg(-1)
            .query_async(&mut self.conn)
            .await?;
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let row_keys: Vec<String> = members.iter().map(|member| ctx.row(&table.name, member)).collect();
        let documents: Vec<Option<String>> = cmd("MGET").arg(&row_keys).query_async(&mut self.conn).await?;

        let mut rows = Vec::with_capacity(members.len());
        for (member, document) in members.into_iter().zip(documents) {
            if let Some(document) = document {
                rows.push((member, serde_json::from_str::<Attributes>(&document)?));
            }
        }
        Ok(rows)
    }

    /// Stores the document and indexes the key. New keys are scored by the
    /// insertion clock unless `order` is given; existing keys keep their score.
    async fn write_row(&mut self, table: &str, key: &str, document: &str, order: Option<f64>) -> Result<(), RepoError> {
        let ctx = KeyContext::new(&self.prefix);
        let order = match order {
            Some(order) => order,
            None => {
                let tick: u64 = cmd("INCR").arg(format!("{}:_clock", self.prefix)).query_async(&mut self.conn).await?;
                tick as f64
            }
        };
        let () = cmd("SET").arg(ctx.row(table, key)).arg(document).query_async(&mut self.conn).await?;
        let _: i64 = cmd("ZADD")
            .arg(ctx.table_index(table))
            .arg("NX")
            .arg(order)
            .arg(key)
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn remove_row(&mut self, table: &str, key: &str) -> Result<(), RepoError> {
        let ctx = KeyContext::new(&self.prefix);
        let _: i64 = cmd("DEL").arg(ctx.row(table, key)).query_async(&mut self.conn).await?;
        let _: i64 = cmd("ZREM").arg(ctx.table_index(table)).arg(key).query_async(&mut self.conn).await?;
        Ok(())
    }

    fn record(&mut self, table: &str, key: &str, previous: Option<String>, order: Option<f64>) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(UndoEntry {
                table: table.to_string(),
                key: key.to_string(),
                previous,
                order,
            });
        }
    }

    async fn assign_key(&mut self, table: &TableDescriptor, attributes: &mut Attributes) -> Result<String, RepoError> {
        let sequence = KeyContext::new(&self.prefix).sequence(&table.name);
        if let Some(key) = attributes.get(&table.key).filter(|key| !key.is_null()) {
            let key = key.clone();
            if let Some(numeric) = sequence_floor(&key) {
                let current: Option<u64> = cmd("GET").arg(&sequence).query_async(&mut self.conn).await?;
                if current.is_none_or(|current| current < numeric) {
                    let () = cmd("SET").arg(&sequence).arg(numeric).query_async(&mut self.conn).await?;
                }
            }
            return Ok(key_repr(&key));
        }

        let key = match table.key_strategy {
            KeyStrategy::Increment => {
                let next: u64 = cmd("INCR").arg(&sequence).query_async(&mut self.conn).await?;
                serde_json::Value::from(next)
            }
            KeyStrategy::Nanoid => serde_json::Value::String(generate_row_key()),
            KeyStrategy::Manual => return Err(missing_key(table)),
        };
        let repr = key_repr(&key);
        attributes.insert(table.key.clone(), key);
        Ok(repr)
    }
}

impl<C> Store for RedisStore<C>
where
    C: ConnectionLike + Send,
{
    async fn insert(&mut self, table: &TableDescriptor, attributes: Attributes) -> Result<Row, RepoError> {
        let mut attributes = attributes;
        table.apply_defaults(&mut attributes);
        let key = self.assign_key(table, &mut attributes).await?;

        let row_key = KeyContext::new(&self.prefix).row(&table.name, &key);
        let exists: bool = cmd("EXISTS").arg(&row_key).query_async(&mut self.conn).await?;
        if exists {
            return Err(RepoError::DuplicateKey {
                table: table.name.clone(),
                key: attributes.get(&table.key).cloned().unwrap_or_default(),
            });
        }
        table.check_row(&attributes)?;

        trace!("insert {row_key}");
        let document = serde_json::to_string(&attributes)?;
        self.write_row(&table.name, &key, &document, None).await?;
        self.record(&table.name, &key, None, None);
        Ok(Row::new(table, attributes))
    }

    async fn select(&mut self, table: &TableDescriptor, filter: &Filter) -> Result<Vec<Row>, RepoError> {
        let rows = self.load(table).await?;
        Ok(rows
            .into_iter()
            .filter(|(_, row)| filter.matches(row))
            .map(|(_, row)| Row::new(table, row))
            .collect())
    }

    async fn update(
        &mut self,
        table: &TableDescriptor,
        filter: &Filter,
        changes: &Attributes,
    ) -> Result<u64, RepoError> {
        let mut pending = Vec::new();
        for (key, row) in self.load(table).await? {
            if filter.matches(&row) {
                let next = merged(&row, changes);
                table.check_row(&next)?;
                pending.push((key, serde_json::to_string(&row)?, serde_json::to_string(&next)?));
            }
        }

        trace!("update {} rows in {}:{}", pending.len(), self.prefix, table.name);
        let touched = pending.len() as u64;
        for (key, previous, document) in pending {
            self.write_row(&table.name, &key, &document, None).await?;
            self.record(&table.name, &key, Some(previous), None);
        }
        Ok(touched)
    }

    async fn delete(&mut self, table: &TableDescriptor, filter: &Filter) -> Result<u64, RepoError> {
        let mut removed = 0;
        for (key, row) in self.load(table).await? {
            if !filter.matches(&row) {
                continue;
            }
            let previous = serde_json::to_string(&row)?;
            let order: Option<f64> = cmd("ZSCORE")
                .arg(KeyContext::new(&self.prefix).table_index(&table.name))
                .arg(&key)
                .query_async(&mut self.conn)
                .await?;
            self.remove_row(&table.name, &key).await?;
            self.record(&table.name, &key, Some(previous), order);
            removed += 1;
        }
        trace!("delete {removed} rows from {}:{}", self.prefix, table.name);
        Ok(removed)
    }

    async fn begin(&mut self) -> Result<(), RepoError> {
        if self.journal.is_some() {
            return Err(RepoError::transaction("transaction already active"));
        }
        self.journal = Some(Vec::new());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), RepoError> {
        self.journal
            .take()
            .map(|_| ())
            .ok_or_else(|| RepoError::transaction("no active transaction"))
    }

    async fn rollback(&mut self) -> Result<(), RepoError> {
        let journal = self
            .journal
            .take()
            .ok_or_else(|| RepoError::transaction("no active transaction"))?;
        for entry in journal.into_iter().rev() {
            match entry.previous {
                Some(document) => self.write_row(&entry.table, &entry.key, &document, entry.order).await?,
                None => self.remove_row(&entry.table, &entry.key).await?,
            }
        }
        Ok(())
    }
}
