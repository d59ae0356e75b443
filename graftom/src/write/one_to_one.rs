use serde_json::Value;

use super::{WriteContext, create_row, dispatch::reconcile_all, is_multidimensional, key_filter, owner_link, owner_scope, update_row};
use crate::{
    errors::RepoError,
    input::{RelationSubmission, split_input},
    store::Store,
    types::{Attributes, Row},
};

/// Creates or updates the single related row of `owner`.
///
/// A null submitted under the relation's own name deletes the related row.
/// Returns the row that now belongs to the owner, if any.
pub(crate) async fn reconcile<S>(
    cx: &WriteContext<'_>,
    store: &mut S,
    owner: &Row,
    submission: &RelationSubmission,
    depth: usize,
) -> Result<Option<Row>, RepoError>
where
    S: Store + ?Sized,
{
    let relation = &submission.relation;
    let related = cx.schema.table(&relation.related)?;
    let scope = owner_scope(relation, owner);

    let input = match submission.own_value() {
        Some(Value::Null) if submission.entity == submission.name => {
            if let Some(existing) = store.first(related, &scope).await? {
                store.delete(related, &key_filter(related, &existing)).await?;
            }
            return Ok(None);
        }
        Some(Value::Array(items)) if items.is_empty() => Attributes::new(),
        Some(Value::Array(items)) if is_multidimensional(items) => match items.first().and_then(Value::as_object) {
            Some(attributes) => attributes.clone(),
            None => {
                cx.skip_malformed(&submission.name, "the first entry must be an object")?;
                return Ok(None);
            }
        },
        Some(Value::Array(_)) => {
            cx.skip_malformed(&submission.name, "expected attributes, got a list of keys")?;
            return Ok(None);
        }
        Some(Value::Object(attributes)) => attributes.clone(),
        _ => submission.values.clone(),
    };

    let (direct, nested) = split_input(cx.schema, related, &submission.nested_fields, input)?;
    let row = match store.first(related, &scope).await? {
        Some(existing) => update_row(store, related, &existing, direct).await?,
        None => {
            let mut attributes = direct;
            attributes.extend(owner_link(relation, owner));
            create_row(store, related, attributes).await?
        }
    };

    reconcile_all(cx, store, &row, nested, depth + 1).await?;
    Ok(Some(row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Settings,
        input::FieldDescriptor,
        registry::Schema,
        store::MemoryStore,
        types::{ColumnDescriptor, RelationDescriptor, TableDescriptor},
    };
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .with_table(
                TableDescriptor::new("monsters")
                    .column(ColumnDescriptor::new("name"))
                    .relation(RelationDescriptor::one_to_one("lair", "lairs", "monster_id")),
            )
            .with_table(
                TableDescriptor::new("lairs")
                    .column(ColumnDescriptor::new("monster_id"))
                    .column(ColumnDescriptor::nullable("depth"))
                    .column(ColumnDescriptor::nullable("region")),
            )
    }

    fn attributes(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    async fn owner(store: &mut MemoryStore, schema: &Schema) -> Row {
        store
            .insert(schema.table("monsters").unwrap(), attributes(json!({"name": "Ogre"})))
            .await
            .unwrap()
    }

    fn submission(schema: &Schema, values: Value) -> RelationSubmission {
        RelationSubmission::new(schema.relation("monsters", "lair").unwrap().clone(), attributes(values))
    }

    #[tokio::test]
    async fn creates_then_updates_the_same_row() {
        let schema = schema();
        let settings = Settings::default();
        let cx = WriteContext::new(&schema, &settings);
        let mut store = MemoryStore::new();
        let owner = owner(&mut store, &schema).await;

        let created = reconcile(&cx, &mut store, &owner, &submission(&schema, json!({"depth": 3})), 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.get("monster_id"), Some(&json!(1)));

        let updated = reconcile(&cx, &mut store, &owner, &submission(&schema, json!({"depth": 9})), 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.key, created.key);
        assert_eq!(store.rows("lairs").len(), 1);
        assert_eq!(store.rows("lairs")[0].get("depth"), Some(&json!(9)));
    }

    #[tokio::test]
    async fn takes_first_entry_of_a_repeatable_value() {
        let schema = schema();
        let settings = Settings::default();
        let cx = WriteContext::new(&schema, &settings);
        let mut store = MemoryStore::new();
        let owner = owner(&mut store, &schema).await;

        let values = json!({"lair": [{"depth": 1, "region": "north"}, {"depth": 2}]});
        let mut submission = submission(&schema, values);
        submission.nested_fields = vec![FieldDescriptor::column("depth"), FieldDescriptor::column("region")];
        reconcile(&cx, &mut store, &owner, &submission, 0).await.unwrap();

        let rows = store.rows("lairs");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("region"), Some(&json!("north")));
    }

    #[tokio::test]
    async fn null_under_own_name_deletes_the_related_row() {
        let schema = schema();
        let settings = Settings::default();
        let cx = WriteContext::new(&schema, &settings);
        let mut store = MemoryStore::new();
        let owner = owner(&mut store, &schema).await;

        reconcile(&cx, &mut store, &owner, &submission(&schema, json!({"depth": 3})), 0)
            .await
            .unwrap();
        let removed = reconcile(&cx, &mut store, &owner, &submission(&schema, json!({"lair": null})), 0)
            .await
            .unwrap();

        assert!(removed.is_none());
        assert!(store.rows("lairs").is_empty());
    }

    #[tokio::test]
    async fn key_list_is_rejected_in_strict_mode() {
        let schema = schema();
        let settings = Settings {
            strict_submissions: true,
            ..Settings::default()
        };
        let cx = WriteContext::new(&schema, &settings);
        let mut store = MemoryStore::new();
        let owner = owner(&mut store, &schema).await;

        let result = reconcile(&cx, &mut store, &owner, &submission(&schema, json!({"lair": [1, 2]})), 0).await;
        assert!(matches!(result, Err(RepoError::MalformedSubmission { .. })));
    }
}
