mod commands;
mod context;
mod output;
mod theme;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{
    rows::{RowsArgs, handle_rows},
    tables::{TablesArgs, handle_tables},
    write::{WriteArgs, handle_write},
};
use context::ProjectContext;
use output::{GlobalOptions, OutputFormat, OutputManager};
use theme::HELP_STYLES;

#[derive(Parser)]
#[command(name = "graftom")]
#[command(version = "0.1.0")]
#[command(
    about = "Create records together with their related records",
    long_about = r#"Graftom writes a submitted record and reconciles everything submitted
for its relations:

• One-to-one relations are created or updated in place
• One-to-many relations attach rows by key or upsert whole entries
• Many-to-many relations sync pivot rows, optionally with duplicates

Environment Variables:
  REDIS_URL   Redis connection URL (used by the default config)
  RUST_LOG    Log filter, e.g. graftom=debug
"#
)]
#[command(subcommand_required = true, arg_required_else_help = true)]
#[command(styles = HELP_STYLES.clone())]
struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Config file (defaults to the nearest .graftom/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Suppress output (only errors will be shown)
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a record and reconcile its relations
    Write(WriteArgs),

    /// List stored rows of a table
    Rows(RowsArgs),

    /// Show the tables and relations declared in a schema file
    Tables(TablesArgs),
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let output = OutputManager::new(GlobalOptions {
        output_format: cli.output.clone(),
        quiet: cli.quiet,
        verbose: cli.verbose,
        no_color: cli.no_color,
    });

    if let Err(err) = execute(cli, &output).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn execute(cli: Cli, output: &OutputManager) -> Result<()> {
    let context = ProjectContext::load(cli.config.as_deref())?;
    if let Some(path) = &context.config_path {
        output.verbose(&format!("using config {}", path.display()));
    }

    match cli.command {
        Commands::Write(args) => handle_write(args, &context, output).await?,
        Commands::Rows(args) => handle_rows(args, &context, output).await?,
        Commands::Tables(args) => handle_tables(args, output).await?,
    }

    Ok(())
}
