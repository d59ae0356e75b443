use serde_json::Value;

use super::{
    WriteContext, create_row, dispatch::reconcile_all, is_multidimensional, owner_link, owner_scope, removal,
    update_row,
};
use crate::{
    errors::RepoError,
    input::{RelationSubmission, split_input},
    keys::is_blank,
    store::{Filter, Store},
    types::Row,
};

/// Reconciles the related rows of a one-to-many relation.
///
/// A list of keys attaches existing rows and applies the removal policy to
/// the ones no longer listed. A list of objects creates or updates each
/// entry and deletes the owner's rows that were not submitted.
pub(crate) async fn reconcile<S>(
    cx: &WriteContext<'_>,
    store: &mut S,
    owner: &Row,
    submission: &RelationSubmission,
    depth: usize,
) -> Result<(), RepoError>
where
    S: Store + ?Sized,
{
    match submission.own_value().cloned().unwrap_or(Value::Null) {
        Value::Array(items) if is_multidimensional(&items) => {
            create_many_entries(cx, store, owner, submission, items, depth).await
        }
        Value::Array(keys) => attach(cx, store, owner, submission, keys).await,
        Value::Null => attach(cx, store, owner, submission, Vec::new()).await,
        key => attach(cx, store, owner, submission, vec![key]).await,
    }
}

async fn attach<S>(
    cx: &WriteContext<'_>,
    store: &mut S,
    owner: &Row,
    submission: &RelationSubmission,
    keys: Vec<Value>,
) -> Result<(), RepoError>
where
    S: Store + ?Sized,
{
    let relation = &submission.relation;
    let related = cx.schema.table(&relation.related)?;
    let keys: Vec<Value> = keys.into_iter().filter(|key| !is_blank(key)).collect();

    if keys.is_empty() {
        let removed = store.select(related, &owner_scope(relation, owner)).await?;
        return removal::apply(store, related, relation, &submission.options, removed).await;
    }

    let mut link = owner_link(relation, owner);
    related.touch(&mut link, false);
    store
        .update(related, &Filter::all().is_in(&related.key, keys.clone()), &link)
        .await?;

    let dropped = owner_scope(relation, owner).not_in(&related.key, keys);
    let removed = store.select(related, &dropped).await?;
    removal::apply(store, related, relation, &submission.options, removed).await
}

async fn create_many_entries<S>(
    cx: &WriteContext<'_>,
    store: &mut S,
    owner: &Row,
    submission: &RelationSubmission,
    items: Vec<Value>,
    depth: usize,
) -> Result<(), RepoError>
where
    S: Store + ?Sized,
{
    let relation = &submission.relation;
    let related = cx.schema.table(&relation.related)?;
    let scope = owner_scope(relation, owner);
    let mut kept = Vec::new();

    for item in items {
        let Value::Object(item) = item else {
            cx.skip_malformed(&submission.name, "entries must be objects")?;
            continue;
        };
        let key = item.get(&related.key).cloned().filter(|key| !is_blank(key));
        let (mut direct, nested) = split_input(cx.schema, related, &submission.nested_fields, item)?;

        let existing = match &key {
            Some(key) => {
                let filter = scope.clone().eq(&related.key, key.clone());
                store.first(related, &filter).await?
            }
            None => None,
        };
        let row = match existing {
            Some(existing) => update_row(store, related, &existing, direct).await?,
            None => {
                if key.is_none() {
                    direct.remove(&related.key);
                }
                direct.extend(owner_link(relation, owner));
                create_row(store, related, direct).await?
            }
        };

        kept.push(row.key.clone());
        reconcile_all(cx, store, &row, nested, depth + 1).await?;
    }

    if !kept.is_empty() {
        store.delete(related, &scope.not_in(&related.key, kept)).await?;
    }
    Ok(())
}
