use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dict_struct::DictStruct;

/// A JSON Schema document describing acceptable request payloads.
///
/// `polymorphic_on` names the discriminator field when the model is
/// polymorphic; update views inject the stored value when a payload omits it,
/// and validation keeps it required even when other required fields may be
/// skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSchema {
    pub document: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polymorphic_on: Option<String>,
}

impl InputSchema {
    pub fn new(document: Value) -> Self {
        Self {
            document,
            polymorphic_on: None,
        }
    }

    #[must_use]
    pub fn polymorphic_on(mut self, field: impl Into<String>) -> Self {
        self.polymorphic_on = Some(field.into());
        self
    }

    /// Top-level `properties`, creating the object if absent.
    pub fn properties_mut(&mut self) -> Option<&mut Map<String, Value>> {
        let root = self.document.as_object_mut()?;
        root.entry("properties")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
    }

    /// Top-level required field names.
    pub fn required(&self) -> Vec<String> {
        self.document
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Transforms a clone of a model's default input schema.
pub type SchemaModifier = Arc<dyn Fn(InputSchema) -> InputSchema + Send + Sync>;

/// What the registry remembers about a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SchemaRecord {
    Model {
        input_schema: Value,
        output_schema: Value,
        accepted_data_structure: DictStruct,
    },
    Variant {
        is_a_polymorphically_derived_from: String,
        polymorphic_identity: String,
    },
}

impl SchemaRecord {
    pub fn input_schema(&self) -> Option<&Value> {
        match self {
            Self::Model { input_schema, .. } => Some(input_schema),
            Self::Variant { .. } => None,
        }
    }
}

/// Snapshot of model name → input schema, exposed to validators as `$defs` so
/// a schema can `$ref` another model's schema (`{"$ref": "#/$defs/Article"}`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Value>,
}

impl SchemaRegistry {
    pub fn snapshot(records: &BTreeMap<String, SchemaRecord>) -> Self {
        let schemas = records
            .iter()
            .filter_map(|(name, record)| Some((name.clone(), record.input_schema()?.clone())))
            .collect();
        Self { schemas }
    }

    pub(crate) fn as_defs(&self) -> Map<String, Value> {
        self.schemas
            .iter()
            .map(|(name, schema)| (name.clone(), schema.clone()))
            .collect()
    }
}
