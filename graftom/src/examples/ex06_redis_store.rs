use anyhow::Result;
use serde_json::json;

use super::support;
use crate::{RecordWriter, RedisStore, Settings, Store, store::Filter};

/// Example 06 – the same writer against Redis, including a journaled rollback.
pub async fn run() -> Result<()> {
    let conn = support::redis_connection().await?;
    let prefix = support::unique_namespace("redis_store");
    let mut store = RedisStore::new(conn, prefix);

    let schema = support::storybook();
    let settings = Settings {
        use_database_transactions: true,
        ..Settings::default()
    };
    let writer = RecordWriter::new(&schema, "stories", support::story_fields())?.with_settings(settings);

    let story = writer
        .create(
            &mut store,
            support::attributes(json!({
                "title": "Salt Roads",
                "cover_artist": "Ines",
                "chapters": [{"title": "Dock"}, {"title": "Market"}],
            }))?,
        )
        .await?;

    let chapters = store
        .select(schema.table("chapters")?, &Filter::all().eq("story_id", story.key.clone()))
        .await?;
    assert_eq!(chapters.len(), 2);
    let cover = store.first(schema.table("covers")?, &Filter::all()).await?;
    assert_eq!(cover.map(|row| row.value("artist")), Some(json!("Ines")));

    // An untitled chapter fails the write and every row it added is removed again.
    let failed = writer
        .create(
            &mut store,
            support::attributes(json!({"title": "Broken", "chapters": [{"title": "Fine"}, {}]}))?,
        )
        .await;
    assert!(failed.is_err());
    assert_eq!(store.select(schema.table("stories")?, &Filter::all()).await?.len(), 1);
    assert_eq!(store.select(schema.table("chapters")?, &Filter::all()).await?.len(), 2);

    store.purge().await?;
    Ok(())
}
