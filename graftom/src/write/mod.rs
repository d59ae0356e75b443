//! Writes a record together with everything submitted for its relations.
//!
//! [`RecordWriter::create`] inserts the top-level row and hands each relation
//! submission to the dispatcher, which routes it to the one-to-one,
//! one-to-many or many-to-many reconciler. Reconcilers recurse into the
//! related rows' own submissions through the dispatcher.

mod dispatch;
mod many_to_many;
mod one_to_many;
mod one_to_one;
mod removal;

use log::{debug, error, warn};
use serde_json::Value;

use crate::{
    config::{Settings, WriteOptions},
    errors::RepoError,
    input::{FieldDescriptor, RelationSubmissions, relation_fields, split_input},
    registry::Schema,
    store::{Filter, Store, merged},
    types::{Attributes, PivotDescriptor, RelationDescriptor, Row, TableDescriptor},
};

pub use removal::RemovalAction;

/// Writes records of one table using the form fields that describe its input.
#[derive(Debug, Clone)]
pub struct RecordWriter<'a> {
    schema: &'a Schema,
    table: &'a TableDescriptor,
    fields: Vec<FieldDescriptor>,
    settings: Settings,
}

impl<'a> RecordWriter<'a> {
    pub fn new(schema: &'a Schema, table: &str, fields: Vec<FieldDescriptor>) -> Result<Self, RepoError> {
        Ok(Self {
            schema,
            table: schema.table(table)?,
            fields,
            settings: Settings::default(),
        })
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn table(&self) -> &TableDescriptor {
        self.table
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Fields shown on the create form.
    pub fn create_fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Create-form fields that edit a relation.
    pub fn relation_fields(&self) -> Vec<FieldDescriptor> {
        relation_fields(&self.fields)
    }

    /// Inserts a record and reconciles all of its submitted relations, inside
    /// a transaction when the settings ask for one.
    pub async fn create<S>(&self, store: &mut S, input: Attributes) -> Result<Row, RepoError>
    where
        S: Store + ?Sized,
    {
        self.create_with(store, input, WriteOptions::default()).await
    }

    pub async fn create_with<S>(&self, store: &mut S, input: Attributes, options: WriteOptions) -> Result<Row, RepoError>
    where
        S: Store + ?Sized,
    {
        let (direct, relations) = split_input(self.schema, self.table, &self.fields, input)?;

        if !options.use_transactions(&self.settings) {
            return self.create_record_and_relations(store, direct, relations).await;
        }

        store.begin().await?;
        match self.create_record_and_relations(store, direct, relations).await {
            Ok(row) => {
                store.commit().await?;
                Ok(row)
            }
            Err(err) => {
                if let Err(rollback_err) = store.rollback().await {
                    error!("rollback after failed write to {} failed: {rollback_err}", self.table.name);
                }
                Err(err)
            }
        }
    }

    /// Reconciles relation submissions against an existing owner row.
    pub async fn reconcile<S>(&self, store: &mut S, owner: &Row, relations: RelationSubmissions) -> Result<(), RepoError>
    where
        S: Store + ?Sized,
    {
        let cx = WriteContext::new(self.schema, &self.settings);
        dispatch::reconcile_all(&cx, store, owner, relations, 0).await
    }

    async fn create_record_and_relations<S>(
        &self,
        store: &mut S,
        direct: Attributes,
        relations: RelationSubmissions,
    ) -> Result<Row, RepoError>
    where
        S: Store + ?Sized,
    {
        let row = create_row(store, self.table, direct).await?;
        debug!("created {} {}", self.table.name, row.key);
        self.reconcile(store, &row, relations).await?;
        Ok(row)
    }
}

pub(crate) struct WriteContext<'a> {
    pub schema: &'a Schema,
    pub settings: &'a Settings,
}

impl<'a> WriteContext<'a> {
    pub fn new(schema: &'a Schema, settings: &'a Settings) -> Self {
        Self { schema, settings }
    }

    /// Lenient mode logs and carries on; strict mode fails the write.
    pub fn skip_malformed(&self, relation: &str, message: &str) -> Result<(), RepoError> {
        if self.settings.strict_submissions {
            return Err(RepoError::malformed(relation, message));
        }
        warn!("skipping malformed value for relation `{relation}`: {message}");
        Ok(())
    }
}

/// Arrays holding at least one array or object carry per-row attributes.
pub(crate) fn is_multidimensional(items: &[Value]) -> bool {
    items.iter().any(|item| item.is_array() || item.is_object())
}

pub(crate) fn key_filter(table: &TableDescriptor, row: &Row) -> Filter {
    Filter::all().eq(&table.key, row.key.clone())
}

/// Related rows belonging to `owner`, including the morph type when polymorphic.
pub(crate) fn owner_scope(relation: &RelationDescriptor, owner: &Row) -> Filter {
    let filter = Filter::all().eq(&relation.foreign_key, owner.value(&relation.local_key));
    match &relation.morph {
        Some(morph) => filter.eq(&morph.type_column, morph.class.clone()),
        None => filter,
    }
}

/// Column values that attach a related row to `owner`.
pub(crate) fn owner_link(relation: &RelationDescriptor, owner: &Row) -> Attributes {
    let mut link = Attributes::new();
    link.insert(relation.foreign_key.clone(), owner.value(&relation.local_key));
    if let Some(morph) = &relation.morph {
        link.insert(morph.type_column.clone(), Value::String(morph.class.clone()));
    }
    link
}

pub(crate) fn pivot_scope(relation: &RelationDescriptor, pivot: &PivotDescriptor, owner: &Row) -> Filter {
    let filter = Filter::all().eq(&pivot.foreign_pivot_key, owner.value(&relation.local_key));
    match &relation.morph {
        Some(morph) => filter.eq(&morph.type_column, morph.class.clone()),
        None => filter,
    }
}

pub(crate) fn pivot_link(relation: &RelationDescriptor, pivot: &PivotDescriptor, owner: &Row) -> Attributes {
    let mut link = Attributes::new();
    link.insert(pivot.foreign_pivot_key.clone(), owner.value(&relation.local_key));
    if let Some(morph) = &relation.morph {
        link.insert(morph.type_column.clone(), Value::String(morph.class.clone()));
    }
    link
}

pub(crate) async fn create_row<S>(store: &mut S, table: &TableDescriptor, attributes: Attributes) -> Result<Row, RepoError>
where
    S: Store + ?Sized,
{
    let mut attributes = attributes;
    table.touch(&mut attributes, true);
    store.insert(table, attributes).await
}

/// Writes the columns of `changes` that differ from `existing`. The key
/// column is never rewritten.
pub(crate) async fn update_row<S>(
    store: &mut S,
    table: &TableDescriptor,
    existing: &Row,
    changes: Attributes,
) -> Result<Row, RepoError>
where
    S: Store + ?Sized,
{
    let mut changes = changes;
    changes.remove(&table.key);
    if changes.iter().all(|(column, value)| existing.get(column) == Some(value)) {
        return Ok(existing.clone());
    }

    table.touch(&mut changes, false);
    store.update(table, &key_filter(table, existing), &changes).await?;
    Ok(Row::new(table, merged(&existing.attributes, &changes)))
}
