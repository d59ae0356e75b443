use indexmap::IndexMap;
use serde_json::Value;

use super::{WriteContext, is_multidimensional, pivot_link, pivot_scope};
use crate::{
    errors::RepoError,
    input::RelationSubmission,
    keys::{is_blank, key_repr, keys_match},
    store::Store,
    types::{Attributes, PivotDescriptor, RelationDescriptor, Row, TableDescriptor},
};

/// Entry attribute that overrides the pivot key name for that entry.
pub const PIVOT_KEY_NAME_ATTRIBUTE: &str = "pivot_key_name";

/// Related key and extra pivot attributes, keyed by the related key's repr.
type PivotEntries = IndexMap<String, (Value, Attributes)>;

/// Reconciles the pivot rows of a many-to-many relation.
pub(crate) async fn reconcile<S>(
    cx: &WriteContext<'_>,
    store: &mut S,
    owner: &Row,
    submission: &RelationSubmission,
) -> Result<(), RepoError>
where
    S: Store + ?Sized,
{
    let relation = &submission.relation;
    let pivot = relation.pivot.as_ref().ok_or_else(|| RepoError::Other {
        message: format!("many-to-many relation `{}` declares no pivot table", relation.name).into(),
    })?;
    let pivot_table = cx.schema.table(&pivot.table)?;
    let values = decode_values(cx, submission)?;

    let entries = if is_multidimensional(&values) {
        if submission.options.allow_duplicate_pivots {
            return sync_duplicate_pivots(cx, store, owner, submission, pivot_table, pivot, values).await;
        }
        let mut entries = PivotEntries::new();
        for item in values {
            let Value::Object(mut attributes) = item else {
                cx.skip_malformed(&submission.name, "pivot entries must be objects")?;
                continue;
            };
            match attributes.remove(&submission.name).filter(|key| !key.is_null()) {
                Some(key) => {
                    entries.insert(key_repr(&key), (key, attributes));
                }
                None => cx.skip_malformed(&submission.name, "pivot entry is missing the related key")?,
            }
        }
        entries
    } else {
        values
            .into_iter()
            .filter(|key| !is_blank(key))
            .map(|key| (key_repr(&key), (key, Attributes::new())))
            .collect()
    };

    sync(store, owner, relation, pivot, pivot_table, entries).await
}

/// Submitted value as a list; JSON-encoded strings are decoded and a missing
/// or null value means an empty list.
fn decode_values(cx: &WriteContext<'_>, submission: &RelationSubmission) -> Result<Vec<Value>, RepoError> {
    let value = match submission.own_value() {
        Some(Value::String(encoded)) => match serde_json::from_str::<Value>(encoded) {
            Ok(decoded) => decoded,
            Err(err) => {
                cx.skip_malformed(&submission.name, &format!("invalid JSON: {err}"))?;
                Value::Null
            }
        },
        Some(value) => value.clone(),
        None => Value::Null,
    };

    Ok(match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, item)| item).collect(),
        key => vec![key],
    })
}

/// Makes the owner's pivot rows match `entries`: rows for keys not submitted
/// are deleted, changed attributes are written, missing keys are inserted.
async fn sync<S>(
    store: &mut S,
    owner: &Row,
    relation: &RelationDescriptor,
    pivot: &PivotDescriptor,
    pivot_table: &TableDescriptor,
    entries: PivotEntries,
) -> Result<(), RepoError>
where
    S: Store + ?Sized,
{
    let scope = pivot_scope(relation, pivot, owner);
    let current = store.select(pivot_table, &scope).await?;
    let related_key = |row: &Row| row.value(&pivot.related_pivot_key);

    let stale: Vec<Value> = current
        .iter()
        .map(related_key)
        .filter(|key| !entries.contains_key(&key_repr(key)))
        .collect();
    if !stale.is_empty() {
        let filter = scope.clone().is_in(&pivot.related_pivot_key, stale);
        store.delete(pivot_table, &filter).await?;
    }

    for (key, attributes) in entries.into_values() {
        let existing: Vec<&Row> = current
            .iter()
            .filter(|row| keys_match(&related_key(*row), &key))
            .collect();

        if existing.is_empty() {
            let mut row = attributes;
            row.extend(pivot_link(relation, pivot, owner));
            row.insert(pivot.related_pivot_key.clone(), key);
            pivot_table.touch(&mut row, true);
            store.insert(pivot_table, row).await?;
            continue;
        }

        let changed = existing
            .iter()
            .any(|row| attributes.iter().any(|(column, value)| row.get(column) != Some(value)));
        if changed {
            let mut changes = attributes;
            pivot_table.touch(&mut changes, false);
            let filter = scope.clone().eq(&pivot.related_pivot_key, key);
            store.update(pivot_table, &filter, &changes).await?;
        }
    }
    Ok(())
}

/// Pivot rows are identified by their own key instead of the related key, so
/// the same related row may be attached more than once.
async fn sync_duplicate_pivots<S>(
    cx: &WriteContext<'_>,
    store: &mut S,
    owner: &Row,
    submission: &RelationSubmission,
    pivot_table: &TableDescriptor,
    pivot: &PivotDescriptor,
    items: Vec<Value>,
) -> Result<(), RepoError>
where
    S: Store + ?Sized,
{
    let relation = &submission.relation;
    let key_name = &submission.options.pivot_key_name;
    let scope = pivot_scope(relation, pivot, owner);

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Object(attributes) => entries.push(attributes),
            _ => cx.skip_malformed(&submission.name, "pivot entries must be objects")?,
        }
    }

    let sent: Vec<Value> = entries
        .iter()
        .filter_map(|entry| entry.get(key_name))
        .filter(|key| !is_blank(key))
        .cloned()
        .collect();
    let unsent: Vec<Value> = store
        .select(pivot_table, &scope)
        .await?
        .iter()
        .map(|row| row.value(key_name))
        .filter(|key| !sent.iter().any(|candidate| keys_match(candidate, key)))
        .collect();
    if !unsent.is_empty() {
        store.delete(pivot_table, &scope.clone().is_in(key_name, unsent)).await?;
    }

    for entry in entries {
        let pivot_key = entry.get(key_name).filter(|key| !is_blank(key)).cloned();
        let mut attributes = pivot_attributes(entry, submission, pivot);

        match pivot_key {
            Some(pivot_key) => {
                attributes.remove(&pivot.foreign_pivot_key);
                if let Some(morph) = &relation.morph {
                    attributes.remove(&morph.type_column);
                }
                if attributes.is_empty() {
                    continue;
                }
                pivot_table.touch(&mut attributes, false);
                let filter = scope.clone().eq(key_name, pivot_key);
                store.update(pivot_table, &filter, &attributes).await?;
            }
            None => {
                if attributes.get(&pivot.related_pivot_key).is_none_or(Value::is_null) {
                    cx.skip_malformed(&submission.name, "pivot entry is missing the related key")?;
                    continue;
                }
                attributes.extend(pivot_link(relation, pivot, owner));
                pivot_table.touch(&mut attributes, true);
                store.insert(pivot_table, attributes).await?;
            }
        }
    }
    Ok(())
}

/// Moves the related key under the pivot's related column and drops the
/// entry's identifying keys.
fn pivot_attributes(mut entry: Attributes, submission: &RelationSubmission, pivot: &PivotDescriptor) -> Attributes {
    let key_name = entry
        .remove(PIVOT_KEY_NAME_ATTRIBUTE)
        .and_then(|name| name.as_str().map(str::to_string))
        .unwrap_or_else(|| submission.options.pivot_key_name.clone());
    let related = entry.remove(&submission.name);
    entry.remove(&key_name);
    if let Some(related) = related {
        entry.insert(pivot.related_pivot_key.clone(), related);
    }
    entry
}
