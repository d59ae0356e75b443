use anyhow::Result;
use serde_json::json;

use super::support;
use crate::{RecordWriter, store::MemoryStore};

/// Example 01 – dotted field paths create the one-to-one related row, and a
/// later submission updates the same row instead of adding another.
pub async fn run() -> Result<()> {
    let schema = support::storybook();
    let writer = RecordWriter::new(&schema, "stories", support::story_fields())?;
    let mut store = MemoryStore::new();

    let story = writer
        .create(
            &mut store,
            support::attributes(json!({
                "title": "The Long Dusk",
                "cover_artist": "Mira",
                "cover_colour": "amber",
            }))?,
        )
        .await?;
    assert!(story.get("created_at").is_some(), "stories keep timestamps");

    let covers = store.rows("covers");
    assert_eq!(covers.len(), 1);
    assert_eq!(covers[0].get("story_id"), Some(&story.key));
    assert_eq!(covers[0].get("artist"), Some(&json!("Mira")));

    // Reconciling again against the same story updates its only cover.
    let (_, relations) = crate::split_input(
        &schema,
        writer.table(),
        writer.create_fields(),
        support::attributes(json!({"cover_artist": "Jun"}))?,
    )?;
    writer.reconcile(&mut store, &story, relations).await?;

    let covers = store.rows("covers");
    assert_eq!(covers.len(), 1);
    assert_eq!(covers[0].get("artist"), Some(&json!("Jun")));
    assert_eq!(covers[0].get("colour"), Some(&json!("amber")));
    Ok(())
}
