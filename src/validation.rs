//! Payload validation against model input schemas.
//!
//! A [`SchemaValidator`] is compiled once per mounted view. It holds two
//! compiled `jsonschema` validators: the strict one used for creation and a
//! partial one (top-level `required` relaxed) used for updates. The unknown
//! field policy is fixed at compile time.

use jsonschema::{
    ValidationError as JsonSchemaError, Validator as JsonValidator,
    error::{TypeKind, ValidationErrorKind},
    validator_for,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::errors::RegistryError;
use crate::schema::{InputSchema, SchemaRegistry};

/// Field name → messages. Errors that are not tied to a field sit under `_schema`.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

const ROOT_KEY: &str = "_schema";

pub struct SchemaValidator {
    strict: JsonValidator,
    partial: JsonValidator,
    polymorphic_on: Option<String>,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("polymorphic_on", &self.polymorphic_on)
            .finish_non_exhaustive()
    }
}

impl SchemaValidator {
    /// Compile `schema` with the registry snapshot available under `$defs`.
    pub fn compile(
        model: &str,
        schema: &InputSchema,
        registry: &SchemaRegistry,
        allow_unknown_fields: bool,
    ) -> Result<Self, RegistryError> {
        let mut strict = schema.document.clone();
        let Some(root) = strict.as_object_mut() else {
            return Err(RegistryError::InvalidSchema {
                model: model.to_string(),
                message: "schema document must be an object".to_string(),
            });
        };

        if allow_unknown_fields {
            root.insert("additionalProperties".to_string(), Value::Bool(true));
        } else {
            root.entry("additionalProperties")
                .or_insert(Value::Bool(false));
        }

        let defs = root
            .entry("$defs")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(defs) = defs.as_object_mut() {
            for (name, def) in registry.as_defs() {
                defs.entry(name).or_insert(def);
            }
        }

        let mut partial = strict.clone();
        if let Some(root) = partial.as_object_mut() {
            match &schema.polymorphic_on {
                Some(field) if schema.required().contains(field) => {
                    root.insert("required".to_string(), Value::Array(vec![Value::String(field.clone())]));
                }
                _ => {
                    root.remove("required");
                }
            }
        }

        let compile = |document: &Value| {
            validator_for(document).map_err(|e| RegistryError::InvalidSchema {
                model: model.to_string(),
                message: e.to_string(),
            })
        };

        Ok(Self {
            strict: compile(&strict)?,
            partial: compile(&partial)?,
            polymorphic_on: schema.polymorphic_on.clone(),
        })
    }

    pub fn polymorphic_on(&self) -> Option<&str> {
        self.polymorphic_on.as_deref()
    }

    /// Validate one object. With `allow_required_fields_to_be_skipped` the
    /// partial validator is used (the discriminator, if any, stays required).
    pub fn validate_object(&self, data: &Value, allow_required_fields_to_be_skipped: bool) -> Result<(), FieldErrors> {
        let validator = if allow_required_fields_to_be_skipped {
            &self.partial
        } else {
            &self.strict
        };

        let mut errors = FieldErrors::new();
        for error in validator.iter_errors(data) {
            collect_error(&error, &mut errors);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Validate each item independently with the strict validator.
    pub fn validate_list_of_objects(&self, items: &[Value]) -> (bool, Vec<Option<FieldErrors>>) {
        let errors: Vec<_> = items
            .iter()
            .map(|item| self.validate_object(item, false).err())
            .collect();
        (errors.iter().all(Option::is_none), errors)
    }
}

/// File one jsonschema error under the field it concerns.
fn collect_error(error: &JsonSchemaError, errors: &mut FieldErrors) {
    let path = error.instance_path.as_str();
    let field = path
        .trim_start_matches('/')
        .split('/')
        .next()
        .filter(|segment| !segment.is_empty());

    match (&error.kind, field) {
        (ValidationErrorKind::Required { property }, None) => {
            let name = property
                .as_str()
                .map_or_else(|| property.to_string(), str::to_string);
            errors.entry(name).or_default().push("is required".to_string());
        }
        (ValidationErrorKind::AdditionalProperties { unexpected }, None) => {
            for name in unexpected {
                errors
                    .entry(name.clone())
                    .or_default()
                    .push("unknown field".to_string());
            }
        }
        (_, Some(field)) => {
            errors
                .entry(field.to_string())
                .or_default()
                .push(describe(error, path));
        }
        (_, None) => {
            errors
                .entry(ROOT_KEY.to_string())
                .or_default()
                .push(describe(error, path));
        }
    }
}

/// `string`, or `integer or null` for a union.
fn type_names(kind: &TypeKind) -> String {
    match kind {
        TypeKind::Single(primitive) => primitive.to_string(),
        TypeKind::Multiple(types) => types
            .into_iter()
            .map(|primitive| primitive.to_string())
            .collect::<Vec<_>>()
            .join(" or "),
    }
}

fn describe(error: &JsonSchemaError, path: &str) -> String {
    let at = if path.is_empty() || path.matches('/').count() == 1 {
        String::new()
    } else {
        format!(" at '{path}'")
    };
    match &error.kind {
        ValidationErrorKind::Type { kind } => format!("wrong type{at}: expected {}", type_names(kind)),
        ValidationErrorKind::Enum { options } => {
            let options = options
                .as_array()
                .map(|values| {
                    values
                        .iter()
                        .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_else(|| options.to_string());
            format!("must be one of: {options}{at}")
        }
        ValidationErrorKind::MinLength { limit } => format!("too short{at}: minimum {limit} characters"),
        ValidationErrorKind::MaxLength { limit } => format!("too long{at}: maximum {limit} characters"),
        ValidationErrorKind::Minimum { limit } => format!("too small{at}: minimum {limit}"),
        ValidationErrorKind::Maximum { limit } => format!("too large{at}: maximum {limit}"),
        _ => format!("{error}{at}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict_struct::DictStruct;
    use crate::schema::SchemaRecord;
    use serde_json::json;

    fn article_schema() -> InputSchema {
        InputSchema::new(json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "minLength": 1},
                "kind": {"type": "string", "enum": ["news", "opinion"]},
                "word_count": {"type": "integer"}
            },
            "required": ["title", "kind"]
        }))
        .polymorphic_on("kind")
    }

    fn compile(schema: &InputSchema, allow_unknown_fields: bool) -> SchemaValidator {
        SchemaValidator::compile("Article", schema, &SchemaRegistry::default(), allow_unknown_fields).unwrap()
    }

    #[test]
    fn test_valid_object_passes() {
        let validator = compile(&article_schema(), false);
        assert!(validator
            .validate_object(&json!({"title": "Hi", "kind": "news"}), false)
            .is_ok());
    }

    #[test]
    fn test_missing_required_reported_per_field() {
        let validator = compile(&article_schema(), false);
        let errors = validator.validate_object(&json!({"kind": "news"}), false).unwrap_err();
        assert_eq!(errors.get("title"), Some(&vec!["is required".to_string()]));
    }

    #[test]
    fn test_wrong_type_keyed_by_field() {
        let validator = compile(&article_schema(), false);
        let errors = validator
            .validate_object(&json!({"title": "Hi", "kind": "news", "word_count": "many"}), false)
            .unwrap_err();
        assert_eq!(
            errors.get("word_count"),
            Some(&vec!["wrong type: expected integer".to_string()])
        );
    }

    #[test]
    fn test_wrong_type_names_every_allowed_type() {
        let schema = InputSchema::new(json!({
            "type": "object",
            "properties": {"bio": {"type": ["string", "null"]}}
        }));
        let errors = compile(&schema, false)
            .validate_object(&json!({"bio": 7}), false)
            .unwrap_err();
        let message = &errors["bio"][0];
        assert!(message.starts_with("wrong type: expected "));
        assert!(message.contains("string") && message.contains("null"));
        assert!(!message.contains("Multiple"));
    }

    #[test]
    fn test_partial_validation_keeps_discriminator_required() {
        let validator = compile(&article_schema(), false);
        assert!(validator
            .validate_object(&json!({"kind": "opinion"}), true)
            .is_ok());
        let errors = validator
            .validate_object(&json!({"title": "Only title"}), true)
            .unwrap_err();
        assert!(errors.contains_key("kind"));
    }

    #[test]
    fn test_unknown_fields_rejected_unless_allowed() {
        let payload = json!({"title": "Hi", "kind": "news", "color": "red"});
        let errors = compile(&article_schema(), false)
            .validate_object(&payload, false)
            .unwrap_err();
        assert_eq!(errors.get("color"), Some(&vec!["unknown field".to_string()]));
        assert!(compile(&article_schema(), true).validate_object(&payload, false).is_ok());
    }

    #[test]
    fn test_non_object_reported_at_root() {
        let errors = compile(&article_schema(), false)
            .validate_object(&json!(5), false)
            .unwrap_err();
        assert!(errors.contains_key("_schema"));
    }

    #[test]
    fn test_list_validation_reports_per_item() {
        let validator = compile(&article_schema(), false);
        let (valid, errors) = validator.validate_list_of_objects(&[
            json!({"title": "A", "kind": "news"}),
            json!({"kind": "news"}),
        ]);
        assert!(!valid);
        assert!(errors[0].is_none());
        assert!(errors[1].as_ref().unwrap().contains_key("title"));
    }

    #[test]
    fn test_registry_defs_resolve_refs() {
        let mut records = BTreeMap::new();
        records.insert(
            "Article".to_string(),
            SchemaRecord::Model {
                input_schema: article_schema().document,
                output_schema: json!({}),
                accepted_data_structure: DictStruct::all(),
            },
        );
        let registry = SchemaRegistry::snapshot(&records);
        let author = InputSchema::new(json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "articles": {"type": "array", "items": {"$ref": "#/$defs/Article"}}
            },
            "required": ["name"]
        }));
        let validator = SchemaValidator::compile("Author", &author, &registry, false).unwrap();

        assert!(validator
            .validate_object(&json!({"name": "Ada", "articles": [{"title": "A", "kind": "news"}]}), false)
            .is_ok());
        let errors = validator
            .validate_object(&json!({"name": "Ada", "articles": [{"kind": "news"}]}), false)
            .unwrap_err();
        assert!(errors.contains_key("articles"));
    }
}
