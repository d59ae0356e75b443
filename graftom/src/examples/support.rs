use anyhow::{Context, Result};
use redis::Client;
use redis::aio::ConnectionManager;
use serde_json::Value;

use crate::{
    id::generate_row_key,
    input::FieldDescriptor,
    registry::Schema,
    types::{Attributes, CastType, ColumnDescriptor, PivotDescriptor, RelationDescriptor, TableDescriptor},
};

/// Establish a connection manager pointing at `REDIS_URL` or the local Redis instance.
pub async fn redis_connection() -> Result<ConnectionManager> {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
    let client = Client::open(url)?;
    let manager = client.get_connection_manager().await?;
    Ok(manager)
}

/// Unique namespace prefix for isolating example data.
pub fn unique_namespace(label: &str) -> String {
    let salt = generate_row_key();
    format!("graftom_example_{label}_{}", &salt[..8])
}

pub fn attributes(value: Value) -> Result<Attributes> {
    match value {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("expected an object, got {other}"),
    }
}

/// Schema shared by the walkthroughs: stories with a cover, monsters,
/// chapters with scenes, heroes through a pivot, and polymorphic comments.
pub fn storybook() -> Schema {
    Schema::new()
        .with_table(TableDescriptor::new("authors").column(ColumnDescriptor::new("name")))
        .with_table(
            TableDescriptor::new("stories")
                .with_timestamps()
                .column(ColumnDescriptor::new("title"))
                .column(ColumnDescriptor::nullable("author_id"))
                .relation(RelationDescriptor::belongs_to("author", "authors", "author_id"))
                .relation(RelationDescriptor::one_to_one("cover", "covers", "story_id"))
                .relation(RelationDescriptor::one_to_many("monsters", "monsters", "story_id"))
                .relation(RelationDescriptor::one_to_many("chapters", "chapters", "story_id"))
                .relation(RelationDescriptor::many_to_many(
                    "heroes",
                    "heroes",
                    PivotDescriptor {
                        table: "hero_story".into(),
                        foreign_pivot_key: "story_id".into(),
                        related_pivot_key: "hero_id".into(),
                    },
                ))
                .relation(
                    RelationDescriptor::one_to_many("comments", "comments", "commentable_id")
                        .morph("commentable_type", "story"),
                ),
        )
        .with_table(
            TableDescriptor::new("covers")
                .column(ColumnDescriptor::new("story_id"))
                .column(ColumnDescriptor::new("artist"))
                .column(ColumnDescriptor::nullable("colour")),
        )
        .with_table(
            TableDescriptor::new("monsters")
                .column(ColumnDescriptor::new("name"))
                .column(ColumnDescriptor::nullable("story_id").with_cast(CastType::Integer)),
        )
        .with_table(
            TableDescriptor::new("chapters")
                .column(ColumnDescriptor::new("story_id"))
                .column(ColumnDescriptor::new("title"))
                .relation(RelationDescriptor::one_to_many("scenes", "scenes", "chapter_id")),
        )
        .with_table(
            TableDescriptor::new("scenes")
                .column(ColumnDescriptor::new("chapter_id"))
                .column(ColumnDescriptor::new("summary")),
        )
        .with_table(TableDescriptor::new("heroes").column(ColumnDescriptor::new("name")))
        .with_table(
            TableDescriptor::new("hero_story")
                .column(ColumnDescriptor::new("story_id"))
                .column(ColumnDescriptor::new("hero_id"))
                .column(ColumnDescriptor::nullable("role")),
        )
        .with_table(
            TableDescriptor::new("comments")
                .column(ColumnDescriptor::new("commentable_id"))
                .column(ColumnDescriptor::new("commentable_type"))
                .column(ColumnDescriptor::new("body")),
        )
}

/// Create-form fields of the `stories` table.
pub fn story_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::column("title"),
        FieldDescriptor::relation("author_id", "author", "authors"),
        FieldDescriptor::relation("cover_artist", "cover.artist", "covers"),
        FieldDescriptor::relation("cover_colour", "cover.colour", "covers"),
        FieldDescriptor::relation("monsters", "monsters", "monsters"),
        FieldDescriptor::relation("chapters", "chapters", "chapters").subfields(vec![
            FieldDescriptor::column("title"),
            FieldDescriptor::relation("scenes", "scenes", "scenes").subfields(vec![FieldDescriptor::column("summary")]),
        ]),
        FieldDescriptor::relation("heroes", "heroes", "heroes"),
        FieldDescriptor::relation("comments", "comments", "comments").subfields(vec![FieldDescriptor::column("body")]),
    ]
}

/// Looks up a stored row by key, failing when it is missing.
pub fn stored(store: &crate::store::MemoryStore, table: &str, key: &Value) -> Result<Attributes> {
    store
        .find(table, "id", key)
        .with_context(|| format!("{table} row {key} should exist"))
}
