use anyhow::{Context, Result};
use graftom::{ConnectionManager, FieldDescriptor, GraftomConfig, RelationKind, Schema, TableDescriptor};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Project context for graftom operations
pub struct ProjectContext {
    /// Path to the config file, when one was found
    pub config_path: Option<PathBuf>,
    /// Loaded configuration (defaults when no file exists)
    pub config: GraftomConfig,
}

impl ProjectContext {
    /// Use an explicit config file, or look for `.graftom/config.toml` in the
    /// current directory and its ancestors.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let current_dir = std::env::current_dir().context("Failed to get current directory")?;
                Self::find_config(&current_dir)
            }
        };

        let config = match &config_path {
            Some(path) => GraftomConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))?,
            None => GraftomConfig::default(),
        };
        Ok(Self { config_path, config })
    }

    fn find_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(".graftom").join("config.toml"))
            .find(|candidate| candidate.exists())
    }

    pub async fn redis_connection(&self) -> Result<ConnectionManager> {
        let url = self.config.redis_url();
        let client = graftom::redis::Client::open(url.as_str()).with_context(|| format!("Invalid Redis URL {url}"))?;
        client
            .get_connection_manager()
            .await
            .with_context(|| format!("Failed to connect to {url}"))
    }
}

/// Schema file: table descriptors plus the create-form fields of each table.
#[derive(Debug, Deserialize)]
pub struct SchemaFile {
    pub tables: Vec<TableDescriptor>,
    #[serde(default)]
    pub fields: HashMap<String, Vec<FieldDescriptor>>,
}

impl SchemaFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn schema(&self) -> Schema {
        Schema::from(self.tables.clone())
    }

    /// Declared fields of `table`, or one field per column and relation when
    /// the file declares none.
    pub fn fields_for(&self, table: &TableDescriptor) -> Vec<FieldDescriptor> {
        if let Some(fields) = self.fields.get(&table.name) {
            return fields.clone();
        }

        let columns = table
            .columns
            .iter()
            .map(|column| FieldDescriptor::column(&column.name));
        let relations = table
            .relations
            .iter()
            .filter(|relation| relation.kind != RelationKind::BelongsTo)
            .map(|relation| FieldDescriptor::relation(&relation.name, &relation.name, &relation.related));
        columns.chain(relations).collect()
    }
}
