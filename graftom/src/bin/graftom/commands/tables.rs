use anyhow::Result;
use clap::Args;
use graftom::RelationDescriptor;
use serde_json::json;
use std::path::PathBuf;

use crate::context::SchemaFile;
use crate::output::OutputManager;

#[derive(Args, Debug)]
pub struct TablesArgs {
    /// Schema file (JSON) describing tables, relations and form fields
    #[arg(long)]
    pub schema: PathBuf,
}

pub async fn handle_tables(args: TablesArgs, output: &OutputManager) -> Result<()> {
    let schema_file = SchemaFile::load(&args.schema)?;
    let schema = schema_file.schema();

    if output.is_json() {
        let tables: Vec<_> = schema
            .tables()
            .map(|table| json!({ "table": table, "fields": schema_file.fields_for(table) }))
            .collect();
        return output.json(&tables);
    }

    let mut rendered = output.create_table(&["Table", "Relation", "Kind", "Related", "Keys"]);
    for table in schema.tables() {
        if table.relations.is_empty() {
            rendered.add_row(vec![table.name.clone(), String::new(), String::new(), String::new(), String::new()]);
        }
        for relation in &table.relations {
            rendered.add_row(vec![
                table.name.clone(),
                relation.name.clone(),
                format!("{:?}", relation.kind),
                relation.related.clone(),
                describe_keys(relation),
            ]);
        }
    }
    output.table(&rendered);
    Ok(())
}

fn describe_keys(relation: &RelationDescriptor) -> String {
    let mut keys = match &relation.pivot {
        Some(pivot) => format!("{}({}, {})", pivot.table, pivot.foreign_pivot_key, pivot.related_pivot_key),
        None => format!("{} -> {}", relation.foreign_key, relation.local_key),
    };
    if let Some(morph) = &relation.morph {
        keys.push_str(&format!(" [{}={}]", morph.type_column, morph.class));
    }
    keys
}
