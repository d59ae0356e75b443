use serde_json::Value;

use crate::{
    errors::RepoError,
    input::RelationOptions,
    store::{Filter, Store},
    types::{Attributes, CastType, RelationDescriptor, Row, TableDescriptor},
};

/// What happens to related rows that dropped out of a one-to-many submission.
#[derive(Debug, Clone, PartialEq)]
pub enum RemovalAction {
    /// Point the foreign key at this value instead.
    Reassign(Value),
    Delete,
}

impl RemovalAction {
    /// Fallback key first, then forced deletion, then whatever the foreign key
    /// column can hold: its default, or deletion when it has neither a default
    /// nor null.
    pub fn choose(related: &TableDescriptor, foreign_key: &str, options: &RelationOptions) -> Self {
        if let Some(fallback) = options.fallback() {
            return RemovalAction::Reassign(fallback.clone());
        }
        if options.force_delete {
            return RemovalAction::Delete;
        }

        let default = related.column_default(foreign_key);
        if default.is_null() && !related.is_column_nullable(foreign_key) {
            return RemovalAction::Delete;
        }
        match related.cast_type(foreign_key) {
            Some(CastType::Integer) if !default.is_null() => RemovalAction::Reassign(Value::from(to_integer(&default))),
            _ => RemovalAction::Reassign(default),
        }
    }
}

/// Applies the removal policy to `removed` with one set-based statement.
pub(crate) async fn apply<S>(
    store: &mut S,
    related: &TableDescriptor,
    relation: &RelationDescriptor,
    options: &RelationOptions,
    removed: Vec<Row>,
) -> Result<(), RepoError>
where
    S: Store + ?Sized,
{
    if removed.is_empty() {
        return Ok(());
    }

    let keys = removed.into_iter().map(|row| row.key).collect();
    let targets = Filter::all().is_in(&related.key, keys);
    match RemovalAction::choose(related, &relation.foreign_key, options) {
        RemovalAction::Delete => {
            store.delete(related, &targets).await?;
        }
        RemovalAction::Reassign(value) => {
            let mut changes = Attributes::new();
            changes.insert(relation.foreign_key.clone(), value);
            related.touch(&mut changes, false);
            store.update(related, &targets, &changes).await?;
        }
    }
    Ok(())
}

fn to_integer(value: &Value) -> i64 {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float.trunc() as i64))
            .unwrap_or_default(),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(|float| float.trunc() as i64))
                .unwrap_or_default()
        }
        Value::Bool(flag) => i64::from(*flag),
        _ => 0,
    }
}
