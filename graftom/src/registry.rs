use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    errors::RepoError,
    types::{RelationDescriptor, TableDescriptor},
};

/// Registry of table descriptors, resolved before any write runs.
///
/// Writers look relations up here instead of invoking anything by name on a
/// model, so an undeclared relation is a configuration error raised up front.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<TableDescriptor>", into = "Vec<TableDescriptor>")]
pub struct Schema {
    tables: HashMap<String, TableDescriptor>,
    order: Vec<String>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, table: TableDescriptor) -> &mut Self {
        if !self.tables.contains_key(&table.name) {
            self.order.push(table.name.clone());
        }
        self.tables.insert(table.name.clone(), table);
        self
    }

    pub fn with_table(mut self, table: TableDescriptor) -> Self {
        self.register(table);
        self
    }

    pub fn table(&self, name: &str) -> Result<&TableDescriptor, RepoError> {
        self.tables.get(name).ok_or_else(|| RepoError::UnknownTable {
            table: name.to_string(),
        })
    }

    pub fn relation(&self, table: &str, name: &str) -> Result<&RelationDescriptor, RepoError> {
        self.table(table)?
            .find_relation(name)
            .ok_or_else(|| RepoError::UnknownRelation {
                table: table.to_string(),
                relation: name.to_string(),
            })
    }

    /// Tables in registration order.
    pub fn tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.order.iter().filter_map(|name| self.tables.get(name))
    }
}

impl From<Vec<TableDescriptor>> for Schema {
    fn from(tables: Vec<TableDescriptor>) -> Self {
        let mut schema = Schema::new();
        for table in tables {
            schema.register(table);
        }
        schema
    }
}

impl From<Schema> for Vec<TableDescriptor> {
    fn from(schema: Schema) -> Self {
        let Schema { mut tables, order } = schema;
        order.iter().filter_map(|name| tables.remove(name)).collect()
    }
}
