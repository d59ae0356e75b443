use anyhow::{Context, Result};
use clap::Args;
use graftom::{Attributes, MemoryStore, RecordWriter, RedisStore, Row, Store, WriteOptions};
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;

use crate::context::{ProjectContext, SchemaFile};
use crate::output::OutputManager;

#[derive(Args, Debug)]
pub struct WriteArgs {
    /// Schema file (JSON) describing tables, relations and form fields
    #[arg(long)]
    pub schema: PathBuf,

    /// Table the record is created in
    #[arg(long)]
    pub table: String,

    /// Submitted record as a JSON object; `-` reads stdin
    #[arg(long, default_value = "-")]
    pub input: String,

    /// Force a transaction around the write
    #[arg(long, conflicts_with = "no_transaction")]
    pub transaction: bool,

    /// Write without a transaction
    #[arg(long)]
    pub no_transaction: bool,

    /// Reject malformed relation values instead of skipping them
    #[arg(long)]
    pub strict: bool,

    /// Run against an empty in-memory store and print every resulting row
    #[arg(long)]
    pub dry_run: bool,
}

impl WriteArgs {
    fn write_options(&self) -> WriteOptions {
        match (self.transaction, self.no_transaction) {
            (true, _) => WriteOptions::transactional(),
            (_, true) => WriteOptions::non_transactional(),
            _ => WriteOptions::default(),
        }
    }
}

pub async fn handle_write(args: WriteArgs, context: &ProjectContext, output: &OutputManager) -> Result<()> {
    let schema_file = SchemaFile::load(&args.schema)?;
    let schema = schema_file.schema();
    let table = schema.table(&args.table)?;
    let fields = schema_file.fields_for(table);

    let mut settings = context.config.graftom.clone();
    settings.strict_submissions |= args.strict;
    let writer = RecordWriter::new(&schema, &args.table, fields)?.with_settings(settings);
    let input = read_input(&args.input)?;
    output.verbose(&format!("{} relation field(s) on {}", writer.relation_fields().len(), args.table));

    if args.dry_run {
        if !output.is_json() {
            output.info("Dry run: writing to an empty in-memory store");
        }
        let mut store = MemoryStore::new();
        let row = writer.create_with(&mut store, input, args.write_options()).await?;
        report_created(&row, output)?;

        let stats = store.stats();
        output.verbose(&format!(
            "{} insert(s), {} update(s), {} delete(s)",
            stats.inserts, stats.updates, stats.deletes
        ));
        for table in schema.tables() {
            let rows = store.rows(&table.name);
            if !rows.is_empty() {
                print_rows(&table.name, &rows, output)?;
            }
        }
        return Ok(());
    }

    let conn = context.redis_connection().await?;
    let mut store = RedisStore::new(conn, context.config.redis.prefix.clone());
    let row = writer.create_with(&mut store, input, args.write_options()).await?;
    report_created(&row, output)?;

    let stored = store.select(table, &graftom::Filter::all().eq(&table.key, row.key.clone())).await?;
    output.verbose(&format!("{} row(s) stored under {}", stored.len(), store.prefix()));
    Ok(())
}

fn read_input(source: &str) -> Result<Attributes> {
    let content = if source == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read input from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read {source}"))?
    };

    match serde_json::from_str::<Value>(&content).context("Input is not valid JSON")? {
        Value::Object(attributes) => Ok(attributes),
        other => anyhow::bail!("Input must be a JSON object, got {other}"),
    }
}

fn report_created(row: &Row, output: &OutputManager) -> Result<()> {
    if output.is_json() {
        return output.json(row);
    }
    output.success(&format!("Created {} {}", row.table, row.key));
    for (column, value) in &row.attributes {
        output.key_value(column, &value.to_string());
    }
    Ok(())
}

pub(crate) fn print_rows(table: &str, rows: &[Attributes], output: &OutputManager) -> Result<()> {
    if output.is_json() {
        return output.json(&serde_json::json!({ "table": table, "rows": rows }));
    }

    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for column in row.keys() {
            if !columns.contains(&column.as_str()) {
                columns.push(column);
            }
        }
    }

    output.heading(table);
    let mut rendered = output.create_table(&columns);
    for row in rows {
        rendered.add_row(
            columns
                .iter()
                .map(|column| row.get(*column).map(Value::to_string).unwrap_or_default())
                .collect::<Vec<_>>(),
        );
    }
    output.table(&rendered);
    Ok(())
}
