use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::RepoError;

/// Column name/value map for one row or one submitted record.
pub type Attributes = Map<String, Value>;

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

fn default_key() -> String {
    "id".to_string()
}

/// How a store fills the key column when an insert does not supply one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    #[default]
    Increment,
    Nanoid,
    /// Callers always supply the key.
    Manual,
}

/// Cast metadata declared for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastType {
    Integer,
    Float,
    Boolean,
    String,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub cast: Option<CastType>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: false,
            default: None,
            cast: None,
        }
    }

    pub fn nullable(name: impl Into<String>) -> Self {
        Self {
            nullable: true,
            ..Self::new(name)
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_cast(mut self, cast: CastType) -> Self {
        self.cast = Some(cast);
        self
    }
}

/// Relation kinds the dispatcher understands. Polymorphic variants are
/// expressed through [`RelationDescriptor::morph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToMany,
    /// The owner holds the foreign key; submitted values stay direct attributes.
    BelongsTo,
}

/// Type discriminator stored next to the foreign key of a polymorphic relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphDescriptor {
    pub type_column: String,
    pub class: String,
}

/// Association table backing a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotDescriptor {
    pub table: String,
    /// Pivot column pointing at the owner.
    pub foreign_pivot_key: String,
    /// Pivot column pointing at the related row.
    pub related_pivot_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    pub name: String,
    pub kind: RelationKind,
    /// Related table name.
    pub related: String,
    /// Foreign key column. Lives on the related table for one-to-one and
    /// one-to-many relations, on the owner for belongs-to.
    #[serde(default)]
    pub foreign_key: String,
    /// Owner column the foreign key points at.
    #[serde(default = "default_key")]
    pub local_key: String,
    #[serde(default)]
    pub morph: Option<MorphDescriptor>,
    #[serde(default)]
    pub pivot: Option<PivotDescriptor>,
}

impl RelationDescriptor {
    fn new(name: impl Into<String>, kind: RelationKind, related: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            related: related.into(),
            foreign_key: foreign_key.into(),
            local_key: default_key(),
            morph: None,
            pivot: None,
        }
    }

    pub fn one_to_one(name: impl Into<String>, related: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(name, RelationKind::OneToOne, related, foreign_key)
    }

    pub fn one_to_many(name: impl Into<String>, related: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(name, RelationKind::OneToMany, related, foreign_key)
    }

    pub fn belongs_to(name: impl Into<String>, related: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(name, RelationKind::BelongsTo, related, foreign_key)
    }

    pub fn many_to_many(name: impl Into<String>, related: impl Into<String>, pivot: PivotDescriptor) -> Self {
        let mut relation = Self::new(name, RelationKind::ManyToMany, related, pivot.foreign_pivot_key.clone());
        relation.pivot = Some(pivot);
        relation
    }

    pub fn morph(mut self, type_column: impl Into<String>, class: impl Into<String>) -> Self {
        self.morph = Some(MorphDescriptor {
            type_column: type_column.into(),
            class: class.into(),
        });
        self
    }

    pub fn with_local_key(mut self, local_key: impl Into<String>) -> Self {
        self.local_key = local_key.into();
        self
    }

    pub fn is_polymorphic(&self) -> bool {
        self.morph.is_some()
    }
}

/// Table metadata: key handling, column constraints, and declared relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default)]
    pub key_strategy: KeyStrategy,
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub relations: Vec<RelationDescriptor>,
    /// Maintain `created_at` / `updated_at` on writes.
    #[serde(default)]
    pub timestamps: bool,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: default_key(),
            key_strategy: KeyStrategy::default(),
            columns: Vec::new(),
            relations: Vec::new(),
            timestamps: false,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>, strategy: KeyStrategy) -> Self {
        self.key = key.into();
        self.key_strategy = strategy;
        self
    }

    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    pub fn relation(mut self, relation: RelationDescriptor) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn with_timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn find_relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.iter().find(|relation| relation.name == name)
    }

    /// Unknown columns are reported as non-nullable.
    pub fn is_column_nullable(&self, column: &str) -> bool {
        self.find_column(column).is_some_and(|column| column.nullable)
    }

    /// Database default for the column, `Null` when none is declared.
    pub fn column_default(&self, column: &str) -> Value {
        self.find_column(column)
            .and_then(|column| column.default.clone())
            .unwrap_or(Value::Null)
    }

    pub fn cast_type(&self, column: &str) -> Option<CastType> {
        self.find_column(column).and_then(|column| column.cast)
    }

    fn knows_column(&self, name: &str) -> bool {
        name == self.key
            || (self.timestamps && (name == CREATED_AT || name == UPDATED_AT))
            || self.find_column(name).is_some()
    }

    /// Fills declared defaults for columns the insert leaves out.
    pub fn apply_defaults(&self, attributes: &mut Attributes) {
        for column in &self.columns {
            if attributes.contains_key(&column.name) {
                continue;
            }
            if let Some(default) = &column.default {
                attributes.insert(column.name.clone(), default.clone());
            }
        }
    }

    /// Checks a full row image against the declared columns.
    pub fn check_row(&self, attributes: &Attributes) -> Result<(), RepoError> {
        for name in attributes.keys() {
            if !self.knows_column(name) {
                return Err(self.violation(name, "unknown column"));
            }
        }
        if attributes.get(&self.key).is_none_or(Value::is_null) {
            return Err(self.violation(&self.key, "key must not be null"));
        }
        for column in self.columns.iter().filter(|column| !column.nullable) {
            if attributes.get(&column.name).is_none_or(Value::is_null) {
                return Err(self.violation(&column.name, "null value in non-nullable column"));
            }
        }
        Ok(())
    }

    /// Stamps `updated_at`, and `created_at` when creating, on tables that keep timestamps.
    pub fn touch(&self, attributes: &mut Attributes, creating: bool) {
        if !self.timestamps {
            return;
        }
        let now = Value::String(Utc::now().to_rfc3339());
        if creating && !attributes.contains_key(CREATED_AT) {
            attributes.insert(CREATED_AT.to_string(), now.clone());
        }
        attributes.insert(UPDATED_AT.to_string(), now);
    }

    fn violation(&self, column: &str, message: &str) -> RepoError {
        RepoError::ConstraintViolation {
            table: self.name.clone(),
            column: column.to_string(),
            message: message.to_string(),
        }
    }
}

/// One stored row, as handed back by a store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub table: String,
    pub key: Value,
    pub attributes: Attributes,
}

impl Row {
    pub fn new(table: &TableDescriptor, attributes: Attributes) -> Self {
        let key = attributes.get(&table.key).cloned().unwrap_or(Value::Null);
        Self {
            table: table.name.clone(),
            key,
            attributes,
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    /// Column value, `Null` when absent.
    pub fn value(&self, column: &str) -> Value {
        self.get(column).cloned().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn monsters() -> TableDescriptor {
        TableDescriptor::new("monsters")
            .column(ColumnDescriptor::new("name"))
            .column(ColumnDescriptor::nullable("story_id").with_cast(CastType::Integer))
            .column(ColumnDescriptor::new("level").with_default(1))
    }

    #[test]
    fn unknown_columns_are_not_nullable() {
        let table = monsters();
        assert!(table.is_column_nullable("story_id"));
        assert!(!table.is_column_nullable("missing"));
        assert_eq!(table.column_default("missing"), Value::Null);
        assert_eq!(table.column_default("level"), json!(1));
        assert_eq!(table.cast_type("story_id"), Some(CastType::Integer));
    }

    #[test]
    fn check_row_rejects_nulls_and_unknown_columns() {
        let table = monsters();
        let mut row = json!({"id": 1, "name": "Ogre"}).as_object().cloned().unwrap();
        table.apply_defaults(&mut row);
        assert_eq!(row.get("level"), Some(&json!(1)));
        assert!(table.check_row(&row).is_ok());

        row.insert("name".into(), Value::Null);
        assert!(matches!(
            table.check_row(&row),
            Err(RepoError::ConstraintViolation { column, .. }) if column == "name"
        ));

        let unknown = json!({"id": 2, "name": "Imp", "level": 1, "colour": "red"});
        assert!(table.check_row(unknown.as_object().unwrap()).is_err());
    }

    #[test]
    fn touch_only_stamps_timestamped_tables() {
        let mut attributes = Attributes::new();
        monsters().touch(&mut attributes, true);
        assert!(attributes.is_empty());

        monsters().with_timestamps().touch(&mut attributes, true);
        assert!(attributes.contains_key(CREATED_AT));
        assert!(attributes.contains_key(UPDATED_AT));
    }
}
