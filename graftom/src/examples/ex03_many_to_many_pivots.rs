use anyhow::Result;
use serde_json::json;

use super::support;
use crate::{FieldDescriptor, RecordWriter, Store, split_input, store::MemoryStore};

/// Example 03 – many-to-many pivots: plain key lists, pivot attributes, and
/// duplicate pivots identified by the pivot row's own key.
pub async fn run() -> Result<()> {
    let schema = support::storybook();
    let writer = RecordWriter::new(&schema, "stories", support::story_fields())?;
    let mut store = MemoryStore::new();

    let heroes = schema.table("heroes")?;
    for name in ["Ayla", "Bram", "Cole"] {
        store.insert(heroes, support::attributes(json!({"name": name}))?).await?;
    }

    // Select fields may hand the keys over as a JSON-encoded string.
    let story = writer
        .create(
            &mut store,
            support::attributes(json!({"title": "Three Roads", "heroes": "[1, 2]"}))?,
        )
        .await?;
    let linked: Vec<_> = store.rows("hero_story").iter().map(|row| row["hero_id"].clone()).collect();
    assert_eq!(linked, [json!(1), json!(2)]);

    // Repeatable fields carry pivot attributes next to the related key.
    let (_, relations) = split_input(
        &schema,
        writer.table(),
        writer.create_fields(),
        support::attributes(json!({"heroes": [
            {"heroes": 2, "role": "guide"},
            {"heroes": 3, "role": "rival"},
        ]}))?,
    )?;
    writer.reconcile(&mut store, &story, relations).await?;
    let pivots = store.rows("hero_story");
    assert_eq!(pivots.len(), 2);
    assert_eq!(pivots[0]["hero_id"], json!(2));
    assert_eq!(pivots[0]["role"], json!("guide"));
    assert_eq!(pivots[1]["role"], json!("rival"));

    // The same hero may appear twice once duplicates are allowed.
    let fields = vec![FieldDescriptor::relation("heroes", "heroes", "heroes").allow_duplicate_pivots("id")];
    let kept = pivots[0]["id"].clone();
    let (_, relations) = split_input(
        &schema,
        writer.table(),
        &fields,
        support::attributes(json!({"heroes": [
            {"id": kept, "heroes": 2, "role": "mentor"},
            {"heroes": 2, "role": "double"},
        ]}))?,
    )?;
    writer.reconcile(&mut store, &story, relations).await?;

    let pivots = store.rows("hero_story");
    assert_eq!(pivots.len(), 2);
    assert!(pivots.iter().all(|row| row["hero_id"] == json!(2)));
    assert_eq!(pivots[0]["role"], json!("mentor"));
    assert_eq!(pivots[1]["role"], json!("double"));
    Ok(())
}
