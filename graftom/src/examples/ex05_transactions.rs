use anyhow::Result;
use serde_json::json;

use super::support;
use crate::{RecordWriter, RepoError, Settings, WriteOptions, store::MemoryStore};

/// Example 05 – a failing nested write rolls back the whole create when
/// transactions are on, and leaves partial rows behind when they are off.
pub async fn run() -> Result<()> {
    let schema = support::storybook();
    let settings = Settings {
        use_database_transactions: true,
        ..Settings::default()
    };
    let writer = RecordWriter::new(&schema, "stories", support::story_fields())?.with_settings(settings);
    let mut store = MemoryStore::new();

    // The second chapter has no title, which the chapters table rejects.
    let input = support::attributes(json!({
        "title": "Half Told",
        "chapters": [{"title": "One"}, {"scenes": []}],
    }))?;

    let Err(err) = writer.create(&mut store, input.clone()).await else {
        anyhow::bail!("untitled chapter should fail the write");
    };
    assert!(matches!(err, RepoError::ConstraintViolation { ref column, .. } if column == "title"));
    assert!(store.rows("stories").is_empty());
    assert!(store.rows("chapters").is_empty());
    assert!(!store.in_transaction());

    // Opting out per call keeps whatever was written before the failure.
    let Err(err) = writer
        .create_with(&mut store, input, WriteOptions::non_transactional())
        .await
    else {
        anyhow::bail!("untitled chapter should fail the write");
    };
    assert!(err.is_storage_failure());
    assert_eq!(store.rows("stories").len(), 1);
    assert_eq!(store.rows("chapters").len(), 1);
    Ok(())
}
