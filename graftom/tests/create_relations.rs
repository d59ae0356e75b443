//! End-to-end writes through `RecordWriter` against the in-memory store.

use graftom::examples::support;
use graftom::{
    Attributes, ColumnDescriptor, FieldDescriptor, MemoryStore, PivotDescriptor, RecordWriter, RelationDescriptor,
    RepoError, Row, Schema, Settings, Store, TableDescriptor, split_input,
};
use serde_json::{Value, json};

fn attributes(value: Value) -> Attributes {
    value.as_object().cloned().unwrap()
}

async fn resubmit(schema: &Schema, writer: &RecordWriter<'_>, store: &mut MemoryStore, owner: &Row, input: Value) {
    let (_, relations) = split_input(schema, writer.table(), writer.create_fields(), attributes(input)).unwrap();
    writer.reconcile(store, owner, relations).await.unwrap();
}

#[tokio::test]
async fn one_to_one_null_deletes_existing_row() {
    let schema = support::storybook();
    let fields = vec![
        FieldDescriptor::column("title"),
        FieldDescriptor::relation("cover", "cover", "covers"),
    ];
    let writer = RecordWriter::new(&schema, "stories", fields).unwrap();
    let mut store = MemoryStore::new();

    let story = writer
        .create(
            &mut store,
            attributes(json!({"title": "Ash", "cover": {"artist": "Lou", "colour": "grey"}})),
        )
        .await
        .unwrap();
    assert_eq!(store.rows("covers").len(), 1);

    resubmit(&schema, &writer, &mut store, &story, json!({"cover": null})).await;
    assert!(store.rows("covers").is_empty());

    // Nothing left to delete: still a no-op.
    let deletes = store.stats().deletes;
    resubmit(&schema, &writer, &mut store, &story, json!({"cover": null})).await;
    assert_eq!(store.stats().deletes, deletes);
}

#[tokio::test]
async fn one_to_one_updates_in_place() {
    let schema = support::storybook();
    let writer = RecordWriter::new(&schema, "stories", support::story_fields()).unwrap();
    let mut store = MemoryStore::new();

    let story = writer
        .create(&mut store, attributes(json!({"title": "Ash", "cover_artist": "Lou"})))
        .await
        .unwrap();
    let first = store.rows("covers")[0].clone();

    resubmit(&schema, &writer, &mut store, &story, json!({"cover_artist": "Noor", "cover_colour": "teal"})).await;

    let covers = store.rows("covers");
    assert_eq!(covers.len(), 1);
    assert_eq!(covers[0]["id"], first["id"]);
    assert_eq!(covers[0]["artist"], json!("Noor"));
    assert_eq!(covers[0]["colour"], json!("teal"));
}

fn removal_schema(story_id: ColumnDescriptor) -> Schema {
    Schema::new()
        .with_table(
            TableDescriptor::new("stories")
                .column(ColumnDescriptor::new("title"))
                .relation(RelationDescriptor::one_to_many("monsters", "monsters", "story_id")),
        )
        .with_table(
            TableDescriptor::new("monsters")
                .column(ColumnDescriptor::new("name"))
                .column(story_id),
        )
}

/// Rows 1..=3 belong to the story, row 4 is free. Submits `[2, 3, 4]`.
async fn reconcile_set(schema: &Schema, field: FieldDescriptor) -> MemoryStore {
    let writer = RecordWriter::new(schema, "stories", vec![FieldDescriptor::column("title"), field]).unwrap();
    let mut store = MemoryStore::new();
    let monsters = schema.table("monsters").unwrap();
    for name in ["Ogre", "Imp", "Troll", "Wisp"] {
        store
            .insert(monsters, attributes(json!({"name": name, "story_id": 77})))
            .await
            .unwrap();
    }

    let story = writer
        .create(&mut store, attributes(json!({"title": "Moor", "monsters": [1, 2, 3]})))
        .await
        .unwrap();

    let (_, relations) = split_input(
        schema,
        writer.table(),
        writer.create_fields(),
        attributes(json!({"monsters": [2, 3, 4]})),
    )
    .unwrap();
    writer.reconcile(&mut store, &story, relations).await.unwrap();

    for key in [2, 3, 4] {
        let row = store.find("monsters", "id", &json!(key)).unwrap();
        assert_eq!(row["story_id"], story.key);
    }
    store
}

#[tokio::test]
async fn one_to_many_dropped_row_takes_fallback() {
    let schema = removal_schema(ColumnDescriptor::new("story_id"));
    let field = FieldDescriptor::relation("monsters", "monsters", "monsters").fallback_id(77);
    let store = reconcile_set(&schema, field).await;

    assert_eq!(store.find("monsters", "id", &json!(1)).unwrap()["story_id"], json!(77));
}

#[tokio::test]
async fn one_to_many_dropped_row_is_cleared_when_nullable() {
    let schema = removal_schema(ColumnDescriptor::nullable("story_id"));
    let field = FieldDescriptor::relation("monsters", "monsters", "monsters");
    let store = reconcile_set(&schema, field).await;

    assert_eq!(store.find("monsters", "id", &json!(1)).unwrap()["story_id"], Value::Null);
}

#[tokio::test]
async fn one_to_many_dropped_row_is_deleted_when_required() {
    let schema = removal_schema(ColumnDescriptor::new("story_id"));
    let field = FieldDescriptor::relation("monsters", "monsters", "monsters");
    let store = reconcile_set(&schema, field).await;

    assert!(store.find("monsters", "id", &json!(1)).is_none());
    assert_eq!(store.rows("monsters").len(), 3);
}

#[tokio::test]
async fn one_to_many_force_delete_beats_nullable_column() {
    let schema = removal_schema(ColumnDescriptor::nullable("story_id"));
    let field = FieldDescriptor::relation("monsters", "monsters", "monsters").force_delete();
    let store = reconcile_set(&schema, field).await;

    assert!(store.find("monsters", "id", &json!(1)).is_none());
}

#[tokio::test]
async fn one_to_many_resubmission_is_idempotent() {
    let schema = support::storybook();
    let writer = RecordWriter::new(&schema, "stories", support::story_fields()).unwrap();
    let mut store = MemoryStore::new();
    let monsters = schema.table("monsters").unwrap();
    for name in ["Ogre", "Imp"] {
        store.insert(monsters, attributes(json!({"name": name}))).await.unwrap();
    }

    let story = writer
        .create(&mut store, attributes(json!({"title": "Fen", "monsters": [1, 2]})))
        .await
        .unwrap();
    let before = store.rows("monsters");
    let stats = store.stats();

    resubmit(&schema, &writer, &mut store, &story, json!({"monsters": [1, 2]})).await;
    resubmit(&schema, &writer, &mut store, &story, json!({"monsters": ["1", "2"]})).await;

    assert_eq!(store.rows("monsters"), before);
    assert_eq!(store.stats().deletes, stats.deletes);
}

#[tokio::test]
async fn many_to_many_sync_matches_submitted_set() {
    let schema = support::storybook();
    let writer = RecordWriter::new(&schema, "stories", support::story_fields()).unwrap();
    let mut store = MemoryStore::new();

    // A, B, C, D are heroes 1..=4.
    let story = writer
        .create(&mut store, attributes(json!({"title": "Crown", "heroes": [1, 2, 3]})))
        .await
        .unwrap();
    let pivot_b = store.rows("hero_story")[1].clone();

    resubmit(&schema, &writer, &mut store, &story, json!({"heroes": [2, 4]})).await;

    let pivots = store.rows("hero_story");
    let linked: Vec<_> = pivots.iter().map(|row| row["hero_id"].clone()).collect();
    assert_eq!(linked, [json!(2), json!(4)]);
    assert_eq!(pivots[0], pivot_b, "B is left untouched");
}

#[tokio::test]
async fn duplicate_pivots_keep_both_rows() {
    let schema = support::storybook();
    let fields = vec![
        FieldDescriptor::column("title"),
        FieldDescriptor::relation("heroes", "heroes", "heroes").allow_duplicate_pivots("id"),
    ];
    let writer = RecordWriter::new(&schema, "stories", fields).unwrap();
    let mut store = MemoryStore::new();

    writer
        .create(
            &mut store,
            attributes(json!({
                "title": "Mirror",
                "heroes": [{"heroes": 5, "role": "hero"}, {"heroes": 5, "role": "villain"}],
            })),
        )
        .await
        .unwrap();

    let pivots = store.rows("hero_story");
    assert_eq!(pivots.len(), 2);
    assert!(pivots.iter().all(|row| row["hero_id"] == json!(5)));
    assert_eq!(pivots[0]["role"], json!("hero"));
    assert_eq!(pivots[1]["role"], json!("villain"));

    // Standard sync collapses the same submission to one row per hero.
    let collapsing = RecordWriter::new(&schema, "stories", support::story_fields()).unwrap();
    let mut store = MemoryStore::new();
    collapsing
        .create(
            &mut store,
            attributes(json!({
                "title": "Mirror",
                "heroes": [{"heroes": 5, "role": "hero"}, {"heroes": 5, "role": "villain"}],
            })),
        )
        .await
        .unwrap();
    let pivots = store.rows("hero_story");
    assert_eq!(pivots.len(), 1);
    assert_eq!(pivots[0]["role"], json!("villain"));
}

fn nested_schema() -> Schema {
    Schema::new()
        .with_table(
            TableDescriptor::new("stories")
                .column(ColumnDescriptor::new("title"))
                .relation(RelationDescriptor::one_to_many("chapters", "chapters", "story_id")),
        )
        .with_table(
            TableDescriptor::new("chapters")
                .column(ColumnDescriptor::new("story_id"))
                .column(ColumnDescriptor::new("title"))
                .relation(RelationDescriptor::one_to_one("epigraph", "epigraphs", "chapter_id")),
        )
        .with_table(
            TableDescriptor::new("epigraphs")
                .column(ColumnDescriptor::new("chapter_id"))
                .column(ColumnDescriptor::new("quote")),
        )
}

fn nested_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::column("title"),
        FieldDescriptor::relation("chapters", "chapters", "chapters").subfields(vec![
            FieldDescriptor::column("title"),
            FieldDescriptor::relation("epigraph_quote", "epigraph.quote", "epigraphs"),
        ]),
    ]
}

#[tokio::test]
async fn nested_one_to_one_inside_one_to_many_entries() {
    let schema = nested_schema();
    let writer = RecordWriter::new(&schema, "stories", nested_fields()).unwrap();
    let mut store = MemoryStore::new();

    let story = writer
        .create(
            &mut store,
            attributes(json!({
                "title": "Tides",
                "chapters": [{"title": "Ebb", "epigraph_quote": "All things return"}],
            })),
        )
        .await
        .unwrap();

    let chapters = store.rows("chapters");
    assert_eq!(chapters.len(), 1);
    let epigraphs = store.rows("epigraphs");
    assert_eq!(epigraphs.len(), 1);
    assert_eq!(epigraphs[0]["chapter_id"], chapters[0]["id"]);

    let (_, relations) = split_input(
        &schema,
        writer.table(),
        writer.create_fields(),
        attributes(json!({
            "chapters": [{"id": chapters[0]["id"], "title": "Ebb", "epigraph_quote": "Nothing returns"}],
        })),
    )
    .unwrap();
    writer.reconcile(&mut store, &story, relations).await.unwrap();

    let epigraphs = store.rows("epigraphs");
    assert_eq!(epigraphs.len(), 1);
    assert_eq!(epigraphs[0]["quote"], json!("Nothing returns"));
}

#[tokio::test]
async fn nesting_beyond_limit_is_rejected() {
    let schema = nested_schema();
    let settings = Settings {
        max_nesting_depth: 0,
        ..Settings::default()
    };
    let writer = RecordWriter::new(&schema, "stories", nested_fields())
        .unwrap()
        .with_settings(settings);
    let mut store = MemoryStore::new();

    let result = writer
        .create(
            &mut store,
            attributes(json!({
                "title": "Tides",
                "chapters": [{"title": "Ebb", "epigraph_quote": "All things return"}],
            })),
        )
        .await;
    assert!(matches!(result, Err(RepoError::NestingTooDeep { limit: 0 })));
}

#[tokio::test]
async fn failing_second_relation_rolls_back_everything() {
    let schema = support::storybook();
    let settings = Settings {
        use_database_transactions: true,
        ..Settings::default()
    };
    let writer = RecordWriter::new(&schema, "stories", support::story_fields())
        .unwrap()
        .with_settings(settings);
    let mut store = MemoryStore::new();

    // The cover reconciles first; the comment without a body then fails.
    let result = writer
        .create(
            &mut store,
            attributes(json!({
                "title": "Sunk",
                "cover_artist": "Ivo",
                "comments": [{"body": null}],
            })),
        )
        .await;

    let err = result.unwrap_err();
    assert!(err.is_storage_failure(), "unexpected error: {err}");
    for table in ["stories", "covers", "comments"] {
        assert!(store.rows(table).is_empty(), "{table} should be rolled back");
    }
    assert!(!store.in_transaction());
}

#[tokio::test]
async fn polymorphic_rows_of_other_owner_types_are_untouched() {
    let schema = support::storybook();
    let writer = RecordWriter::new(&schema, "stories", support::story_fields()).unwrap();
    let mut store = MemoryStore::new();
    let comments = schema.table("comments").unwrap();
    store
        .insert(
            comments,
            attributes(json!({"commentable_id": 1, "commentable_type": "author", "body": "Prolific"})),
        )
        .await
        .unwrap();

    let story = writer
        .create(&mut store, attributes(json!({"title": "Owl", "comments": [{"body": "Neat"}]})))
        .await
        .unwrap();
    assert_eq!(story.key, json!(1));

    resubmit(&schema, &writer, &mut store, &story, json!({"comments": [{"body": "Revised"}]})).await;

    let rows = store.rows("comments");
    let bodies: Vec<_> = rows.iter().map(|row| row["body"].clone()).collect();
    assert_eq!(bodies, [json!("Prolific"), json!("Revised")]);
}

#[tokio::test]
async fn polymorphic_attach_only_scopes_removal_to_owner_type() {
    let schema = support::storybook();
    let writer = RecordWriter::new(&schema, "stories", support::story_fields()).unwrap();
    let mut store = MemoryStore::new();
    let comments = schema.table("comments").unwrap();
    for (commentable_type, body) in [("author", "Prolific"), ("video", "Loud"), ("video", "Quiet")] {
        store
            .insert(
                comments,
                attributes(json!({"commentable_id": 1, "commentable_type": commentable_type, "body": body})),
            )
            .await
            .unwrap();
    }

    let story = writer
        .create(&mut store, attributes(json!({"title": "Owl", "comments": [2, 3]})))
        .await
        .unwrap();
    assert_eq!(story.key, json!(1));
    for key in [2, 3] {
        let row = store.find("comments", "id", &json!(key)).unwrap();
        assert_eq!(row["commentable_id"], json!(1));
        assert_eq!(row["commentable_type"], json!("story"));
    }

    // commentable_id is required with no default, so the dropped comment is deleted.
    resubmit(&schema, &writer, &mut store, &story, json!({"comments": ["3"]})).await;

    assert!(store.find("comments", "id", &json!(2)).is_none());
    let author_comment = store.find("comments", "id", &json!(1)).unwrap();
    assert_eq!(author_comment["commentable_type"], json!("author"));
    assert_eq!(author_comment["body"], json!("Prolific"));
    assert_eq!(store.find("comments", "id", &json!(3)).unwrap()["commentable_type"], json!("story"));
    assert_eq!(store.rows("comments").len(), 2);
}

#[tokio::test]
async fn string_keys_in_entries_advance_the_key_sequence() {
    let schema = support::storybook();
    let writer = RecordWriter::new(&schema, "stories", support::story_fields()).unwrap();
    let mut store = MemoryStore::new();

    writer
        .create(
            &mut store,
            attributes(json!({
                "title": "Owl",
                "chapters": [{"id": "2", "title": "A"}, {"title": "B"}, {"title": "C"}],
            })),
        )
        .await
        .unwrap();

    let keys: Vec<_> = store.rows("chapters").iter().map(|row| row["id"].clone()).collect();
    assert_eq!(keys, [json!("2"), json!(3), json!(4)]);
}

#[tokio::test]
async fn belongs_to_values_stay_on_the_owner() {
    let schema = support::storybook();
    let writer = RecordWriter::new(&schema, "stories", support::story_fields()).unwrap();
    let mut store = MemoryStore::new();

    let story = writer
        .create(&mut store, attributes(json!({"title": "Heir", "author_id": 9})))
        .await
        .unwrap();
    assert_eq!(story.get("author_id"), Some(&json!(9)));
    assert!(store.rows("authors").is_empty());
}

#[tokio::test]
async fn strict_mode_rejects_non_object_entries() {
    let schema = support::storybook();
    let settings = Settings {
        strict_submissions: true,
        ..Settings::default()
    };
    let writer = RecordWriter::new(&schema, "stories", support::story_fields())
        .unwrap()
        .with_settings(settings);
    let mut store = MemoryStore::new();

    let result = writer
        .create(
            &mut store,
            attributes(json!({"title": "Odd", "chapters": [{"title": "One"}, 7]})),
        )
        .await;
    assert!(matches!(result, Err(RepoError::MalformedSubmission { .. })));

    // Lenient mode skips the stray entry.
    let lenient = RecordWriter::new(&schema, "stories", support::story_fields()).unwrap();
    let mut store = MemoryStore::new();
    lenient
        .create(
            &mut store,
            attributes(json!({"title": "Odd", "chapters": [{"title": "One"}, 7]})),
        )
        .await
        .unwrap();
    assert_eq!(store.rows("chapters").len(), 1);
}

#[tokio::test]
async fn undeclared_relation_fails_before_writing() {
    let schema = support::storybook();
    let fields = vec![
        FieldDescriptor::column("title"),
        FieldDescriptor::relation("sequels", "sequels", "stories"),
    ];
    let writer = RecordWriter::new(&schema, "stories", fields).unwrap();
    let mut store = MemoryStore::new();

    let result = writer
        .create(&mut store, attributes(json!({"title": "Lost", "sequels": [1]})))
        .await;
    assert!(matches!(result, Err(RepoError::UnknownRelation { .. })));
    assert!(store.rows("stories").is_empty());
}

#[tokio::test]
async fn pivot_tables_are_registered_like_any_table() {
    let schema = Schema::new()
        .with_table(TableDescriptor::new("tags").column(ColumnDescriptor::new("label")))
        .with_table(
            TableDescriptor::new("posts").relation(RelationDescriptor::many_to_many(
                "tags",
                "tags",
                PivotDescriptor {
                    table: "post_tag".into(),
                    foreign_pivot_key: "post_id".into(),
                    related_pivot_key: "tag_id".into(),
                },
            )),
        );
    let writer = RecordWriter::new(&schema, "posts", vec![FieldDescriptor::relation("tags", "tags", "tags")]).unwrap();
    let mut store = MemoryStore::new();

    let result = writer.create(&mut store, attributes(json!({"tags": [1]}))).await;
    assert!(matches!(result, Err(RepoError::UnknownTable { table }) if table == "post_tag"));
}
