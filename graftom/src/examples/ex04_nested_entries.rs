use anyhow::Result;
use serde_json::json;

use super::support;
use crate::{RecordWriter, split_input, store::MemoryStore};

/// Example 04 – repeatable entries with nested relations, and polymorphic
/// comments scoped by their type column.
pub async fn run() -> Result<()> {
    let schema = support::storybook();
    let writer = RecordWriter::new(&schema, "stories", support::story_fields())?;
    let mut store = MemoryStore::new();

    let story = writer
        .create(
            &mut store,
            support::attributes(json!({
                "title": "Deep Water",
                "chapters": [
                    {"title": "Harbour", "scenes": [{"summary": "Fog"}, {"summary": "Bell"}]},
                    {"title": "Reef", "scenes": [{"summary": "Dive"}]},
                ],
                "comments": [{"body": "Lovely"}],
            }))?,
        )
        .await?;

    let chapters = store.rows("chapters");
    assert_eq!(chapters.len(), 2);
    assert!(chapters.iter().all(|chapter| chapter["story_id"] == story.key));

    let scenes = store.rows("scenes");
    assert_eq!(scenes.len(), 3);
    assert_eq!(scenes[2]["chapter_id"], chapters[1]["id"]);

    let comments = store.rows("comments");
    assert_eq!(comments[0]["commentable_type"], json!("story"));
    assert_eq!(comments[0]["commentable_id"], story.key);

    // Entries carrying their key are updated; chapters not sent are deleted.
    let harbour = chapters[0]["id"].clone();
    let (_, relations) = split_input(
        &schema,
        writer.table(),
        writer.create_fields(),
        support::attributes(json!({
            "chapters": [{"id": harbour, "title": "Old Harbour"}],
        }))?,
    )?;
    writer.reconcile(&mut store, &story, relations).await?;

    let chapters = store.rows("chapters");
    assert_eq!(chapters.len(), 1);
    assert_eq!(chapters[0]["title"], json!("Old Harbour"));
    Ok(())
}
