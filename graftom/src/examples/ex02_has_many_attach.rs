use anyhow::Result;
use serde_json::{Value, json};

use super::support;
use crate::{FieldDescriptor, RecordWriter, Store, split_input, store::MemoryStore};

/// Example 02 – attaching existing rows to a one-to-many relation by key, and
/// what happens to the rows that later drop out of the submission.
pub async fn run() -> Result<()> {
    let schema = support::storybook();
    let writer = RecordWriter::new(&schema, "stories", support::story_fields())?;
    let mut store = MemoryStore::new();

    let monsters = schema.table("monsters")?;
    for name in ["Ogre", "Imp", "Troll"] {
        store.insert(monsters, support::attributes(json!({"name": name}))?).await?;
    }

    let story = writer
        .create(
            &mut store,
            support::attributes(json!({"title": "Night Walk", "monsters": [1, "2"]}))?,
        )
        .await?;
    assert_eq!(support::stored(&store, "monsters", &json!(1))?.get("story_id"), Some(&story.key));
    assert_eq!(support::stored(&store, "monsters", &json!(2))?.get("story_id"), Some(&story.key));

    // The nullable foreign key of a dropped monster is cleared.
    let (_, relations) = split_input(
        &schema,
        writer.table(),
        writer.create_fields(),
        support::attributes(json!({"monsters": [2, 3]}))?,
    )?;
    writer.reconcile(&mut store, &story, relations).await?;
    assert_eq!(support::stored(&store, "monsters", &json!(1))?.get("story_id"), Some(&Value::Null));
    assert_eq!(support::stored(&store, "monsters", &json!(3))?.get("story_id"), Some(&story.key));

    // With a fallback key, dropped monsters move to the fallback story instead.
    let fields = vec![FieldDescriptor::relation("monsters", "monsters", "monsters").fallback_id(42)];
    let (_, relations) = split_input(
        &schema,
        writer.table(),
        &fields,
        support::attributes(json!({"monsters": []}))?,
    )?;
    writer.reconcile(&mut store, &story, relations).await?;
    for key in [2, 3] {
        assert_eq!(support::stored(&store, "monsters", &json!(key))?.get("story_id"), Some(&json!(42)));
    }
    assert_eq!(store.stats().deletes, 0, "no monster was deleted");
    Ok(())
}
