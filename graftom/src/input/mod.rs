//! Splits a submitted record into direct column values and per-relation payloads.
//!
//! Form fields describe which input keys belong to a relation. A field's
//! `entity` is a dotted path: the first segment names the relation, the rest
//! (if any) names the attribute inside that relation's values. Without a rest
//! the value is stored under the relation name itself, which is how repeatable
//! and select fields hand over whole related records or key lists.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    errors::RepoError,
    registry::Schema,
    types::{Attributes, RelationDescriptor, RelationKind, TableDescriptor},
};

pub const DEFAULT_PIVOT_KEY_NAME: &str = "id";

/// Form field metadata as produced by the panel layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Input key. Comma-separated names mark a field holding multiple inputs.
    pub name: String,
    /// Dotted relation path, `None` for plain columns.
    #[serde(default)]
    pub entity: Option<String>,
    /// Related table, when the field edits a relation.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub subfields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub force_delete: bool,
    #[serde(default)]
    pub fallback_id: Option<Value>,
    #[serde(default)]
    pub allow_duplicate_pivots: bool,
    #[serde(default)]
    pub pivot_key_name: Option<String>,
}

impl FieldDescriptor {
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn relation(name: impl Into<String>, entity: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity: Some(entity.into()),
            model: Some(model.into()),
            ..Self::default()
        }
    }

    pub fn subfields(mut self, subfields: Vec<FieldDescriptor>) -> Self {
        self.subfields = subfields;
        self
    }

    pub fn force_delete(mut self) -> Self {
        self.force_delete = true;
        self
    }

    pub fn fallback_id(mut self, fallback: impl Into<Value>) -> Self {
        self.fallback_id = Some(fallback.into());
        self
    }

    pub fn allow_duplicate_pivots(mut self, pivot_key_name: impl Into<String>) -> Self {
        self.allow_duplicate_pivots = true;
        self.pivot_key_name = Some(pivot_key_name.into());
        self
    }

    /// First segment of the entity path.
    pub fn relation_name(&self) -> Option<&str> {
        let entity = self.entity.as_deref()?;
        entity.split('.').next().filter(|segment| !segment.is_empty())
    }

    /// Key under which this field's value lands in the relation's values.
    fn relation_attribute(&self) -> Option<&str> {
        let entity = self.entity.as_deref()?;
        match entity.split_once('.') {
            Some((_, rest)) if !rest.is_empty() => Some(rest),
            _ => self.relation_name(),
        }
    }

    pub fn holds_multiple_inputs(&self) -> bool {
        self.name.contains(',')
    }
}

/// Removal and pivot policy flags attached to one relation submission.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationOptions {
    pub force_delete: bool,
    pub fallback_id: Option<Value>,
    pub allow_duplicate_pivots: bool,
    pub pivot_key_name: String,
}

impl Default for RelationOptions {
    fn default() -> Self {
        Self {
            force_delete: false,
            fallback_id: None,
            allow_duplicate_pivots: false,
            pivot_key_name: DEFAULT_PIVOT_KEY_NAME.to_string(),
        }
    }
}

impl RelationOptions {
    fn from_field(field: &FieldDescriptor) -> Self {
        Self {
            force_delete: field.force_delete,
            fallback_id: field.fallback_id.clone(),
            allow_duplicate_pivots: field.allow_duplicate_pivots,
            pivot_key_name: field
                .pivot_key_name
                .clone()
                .unwrap_or_else(|| DEFAULT_PIVOT_KEY_NAME.to_string()),
        }
    }

    /// Fallback foreign key; `null` and `false` count as unset.
    pub fn fallback(&self) -> Option<&Value> {
        self.fallback_id
            .as_ref()
            .filter(|value| !matches!(value, Value::Null | Value::Bool(false)))
    }
}

/// Everything submitted for one relation of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSubmission {
    pub name: String,
    pub relation: RelationDescriptor,
    /// Entity path of the field that produced the submission.
    pub entity: String,
    pub values: Attributes,
    pub options: RelationOptions,
    /// Fields describing the related record's own input.
    pub nested_fields: Vec<FieldDescriptor>,
}

impl RelationSubmission {
    pub fn new(relation: RelationDescriptor, values: Attributes) -> Self {
        Self {
            name: relation.name.clone(),
            entity: relation.name.clone(),
            relation,
            values,
            options: RelationOptions::default(),
            nested_fields: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: RelationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_nested_fields(mut self, fields: Vec<FieldDescriptor>) -> Self {
        self.nested_fields = fields;
        self
    }

    /// The value submitted under the relation's own name.
    pub fn own_value(&self) -> Option<&Value> {
        self.values.get(&self.name)
    }

    pub fn kind(&self) -> RelationKind {
        self.relation.kind
    }
}

pub type RelationSubmissions = IndexMap<String, RelationSubmission>;

/// Separates `input` into the table's own columns and its relation submissions.
///
/// Relations appear in the order of the fields that carry them. A submission
/// takes its entity path and options from the first field that contributes to
/// it. Values of belongs-to fields stay direct: they are foreign-key columns of
/// `table`.
pub fn split_input(
    schema: &Schema,
    table: &TableDescriptor,
    fields: &[FieldDescriptor],
    input: Attributes,
) -> Result<(Attributes, RelationSubmissions), RepoError> {
    let mut direct = input;
    let mut relations = RelationSubmissions::new();

    for field in fields {
        let (Some(relation_name), Some(attribute)) = (field.relation_name(), field.relation_attribute()) else {
            continue;
        };
        let relation = schema.relation(&table.name, relation_name)?;
        if relation.kind == RelationKind::BelongsTo {
            continue;
        }
        let Some(value) = direct.remove(&field.name) else {
            continue;
        };

        let submission = relations.entry(relation_name.to_string()).or_insert_with(|| RelationSubmission {
            entity: field.entity.clone().unwrap_or_default(),
            ..RelationSubmission::new(relation.clone(), Attributes::new())
                .with_options(RelationOptions::from_field(field))
        });
        submission.values.insert(attribute.to_string(), value);
        submission.nested_fields.extend(field.subfields.iter().cloned());
    }

    Ok((direct, relations))
}

/// Fields that edit a relation, including model-carrying subfields of
/// multi-input fields.
pub fn relation_fields(fields: &[FieldDescriptor]) -> Vec<FieldDescriptor> {
    let mut related = Vec::new();

    for field in fields {
        if field.model.is_some() && field.entity.is_some() {
            related.push(field.clone());
        }

        if field.holds_multiple_inputs() {
            related.extend(field.subfields.iter().filter(|subfield| subfield.model.is_some()).cloned());
        }
    }

    related
}
