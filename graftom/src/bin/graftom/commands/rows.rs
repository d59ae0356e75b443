use anyhow::Result;
use clap::Args;
use graftom::{Attributes, Filter, RedisStore, Store};
use std::path::PathBuf;

use super::write::print_rows;
use crate::context::{ProjectContext, SchemaFile};
use crate::output::OutputManager;

#[derive(Args, Debug)]
pub struct RowsArgs {
    /// Schema file (JSON) describing tables, relations and form fields
    #[arg(long)]
    pub schema: PathBuf,

    /// Table to list
    #[arg(long)]
    pub table: String,

    /// Only rows whose column equals the value, as `column=value`
    #[arg(long = "where", value_name = "COLUMN=VALUE")]
    pub filters: Vec<String>,
}

pub async fn handle_rows(args: RowsArgs, context: &ProjectContext, output: &OutputManager) -> Result<()> {
    let schema = SchemaFile::load(&args.schema)?.schema();
    let table = schema.table(&args.table)?;
    let filter = parse_filters(&args.filters)?;

    let conn = context.redis_connection().await?;
    let mut store = RedisStore::new(conn, context.config.redis.prefix.clone());
    let rows: Vec<Attributes> = store
        .select(table, &filter)
        .await?
        .into_iter()
        .map(|row| row.attributes)
        .collect();

    if rows.is_empty() {
        output.warning(&format!("No rows in {}", table.name));
        return Ok(());
    }
    print_rows(&table.name, &rows, output)
}

/// Values that parse as JSON are compared as JSON, anything else as a string.
fn parse_filters(filters: &[String]) -> Result<Filter> {
    let mut filter = Filter::all();
    for raw in filters {
        let Some((column, value)) = raw.split_once('=') else {
            anyhow::bail!("Invalid filter '{raw}', expected COLUMN=VALUE");
        };
        let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        filter = filter.eq(column.trim(), value);
    }
    Ok(filter)
}
