//! # Model layer contract
//!
//! The routing layer never talks to a database directly. Every registered
//! resource is backed by a [`ModelLayer`]: an object-safe async trait that
//! knows how to look records up, create and update them, and describe its own
//! input schema and relationships.
//!
//! Records travel through the routing layer as [`Record`] values: the model
//! name plus a JSON object of column values. That keeps handlers, hooks and
//! the renderer independent of concrete entity types; [`crate::orm::SeaOrmModel`]
//! converts at the edge.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::dict_struct::DictStruct;
use crate::errors::ApiError;
use crate::schema::InputSchema;

/// Column values of a record, or of a request payload.
pub type Fields = Map<String, Value>;

// ============================================================================
// Identifiers
// ============================================================================

/// How a model's primary key is represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Integer,
    Uuid,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordId {
    Int(i64),
    Uuid(Uuid),
    Text(String),
}

impl RecordId {
    /// Coerce a raw path or map key to the model's key kind.
    pub fn parse(raw: &str, kind: KeyKind) -> Option<Self> {
        let raw = raw.trim();
        match kind {
            KeyKind::Integer => raw.parse().ok().map(Self::Int),
            KeyKind::Uuid => Uuid::parse_str(raw).ok().map(Self::Uuid),
            KeyKind::Text if raw.is_empty() => None,
            KeyKind::Text => Some(Self::Text(raw.to_string())),
        }
    }

    /// Read an identifier out of a JSON value (a list element or a column value).
    pub fn from_json(value: &Value, kind: KeyKind) -> Option<Self> {
        match (value, kind) {
            (Value::Number(n), KeyKind::Integer) => n.as_i64().map(Self::Int),
            (Value::String(s), _) => Self::parse(s, kind),
            (Value::Number(n), KeyKind::Text) => Some(Self::Text(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// A model instance as seen by handlers, hooks and the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    model: String,
    fields: Fields,
}

impl Record {
    pub fn new(model: impl Into<String>, fields: Fields) -> Self {
        Self {
            model: model.into(),
            fields,
        }
    }

    /// Name of the model this record belongs to.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    pub fn id(&self, descriptor: &ModelDescriptor) -> Option<RecordId> {
        self.get(&descriptor.primary_key)
            .and_then(|v| RecordId::from_json(v, descriptor.key_kind))
    }
}

// ============================================================================
// Descriptors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    One,
    Many,
}

/// A navigable relationship: records of `target` whose `remote_field` equals
/// this record's `local_field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipDescriptor {
    pub name: String,
    pub target: String,
    pub local_field: String,
    pub remote_field: String,
    pub cardinality: Cardinality,
}

impl RelationshipDescriptor {
    /// Many-to-one, e.g. `article.author` via `article.author_id = author.id`.
    pub fn one(
        name: impl Into<String>,
        target: impl Into<String>,
        local_field: impl Into<String>,
        remote_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            local_field: local_field.into(),
            remote_field: remote_field.into(),
            cardinality: Cardinality::One,
        }
    }

    /// One-to-many, e.g. `author.articles` via `author.id = article.author_id`.
    pub fn many(
        name: impl Into<String>,
        target: impl Into<String>,
        local_field: impl Into<String>,
        remote_field: impl Into<String>,
    ) -> Self {
        Self {
            cardinality: Cardinality::Many,
            ..Self::one(name, target, local_field, remote_field)
        }
    }
}

/// A named subtype stored in the base model's table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantDescriptor {
    pub model: String,
    pub identity: String,
}

/// Single-table polymorphism: `discriminator` selects among a closed set of variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolymorphicSpec {
    pub discriminator: String,
    pub base_identity: Option<String>,
    pub variants: Vec<VariantDescriptor>,
}

impl PolymorphicSpec {
    pub fn new(discriminator: impl Into<String>) -> Self {
        Self {
            discriminator: discriminator.into(),
            base_identity: None,
            variants: Vec::new(),
        }
    }

    #[must_use]
    pub fn base_identity(mut self, identity: impl Into<String>) -> Self {
        self.base_identity = Some(identity.into());
        self
    }

    #[must_use]
    pub fn variant(mut self, model: impl Into<String>, identity: impl Into<String>) -> Self {
        self.variants.push(VariantDescriptor {
            model: model.into(),
            identity: identity.into(),
        });
        self
    }

    /// Every discriminator value a payload may carry.
    pub fn identities(&self) -> Vec<String> {
        self.base_identity
            .iter()
            .cloned()
            .chain(self.variants.iter().map(|v| v.identity.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub table_name: String,
    pub primary_key: String,
    pub key_kind: KeyKind,
    pub relationships: Vec<RelationshipDescriptor>,
    pub polymorphic: Option<PolymorphicSpec>,
}

impl ModelDescriptor {
    pub fn new(
        name: impl Into<String>,
        table_name: impl Into<String>,
        primary_key: impl Into<String>,
        key_kind: KeyKind,
    ) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            primary_key: primary_key.into(),
            key_kind,
            relationships: Vec::new(),
            polymorphic: None,
        }
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.iter().find(|r| r.name == name)
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Equality filters narrowing which records a view may see.
///
/// Query constructors receive the base scope and return a narrowed one; every
/// lookup a view performs goes through it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    filters: Vec<(String, Value)>,
}

impl Scope {
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn filters(&self) -> &[(String, Value)] {
        &self.filters
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| record.get(field) == Some(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub scope: Scope,
    pub offset: u64,
    pub limit: Option<u64>,
    pub sort: Option<(String, SortOrder)>,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Record>,
    pub total: u64,
}

// ============================================================================
// Traits
// ============================================================================

/// Updates applied without committing; `commit` makes them visible at once.
///
/// Dropping a unit of work without committing discards its updates.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn update_without_commit(
        &mut self,
        existing: &Record,
        fields: Fields,
    ) -> Result<Record, ApiError>;

    async fn commit(&mut self) -> Result<(), ApiError>;
}

#[async_trait]
pub trait ModelLayer: Send + Sync {
    fn descriptor(&self) -> &ModelDescriptor;

    /// Schema a create payload must satisfy. Update views validate against the
    /// same document with top-level `required` relaxed.
    fn generate_input_data_schema(&self) -> InputSchema;

    fn output_data_schema(&self) -> Value;

    /// The richest shape a client may ask for: every column and every
    /// relationship one level deep.
    fn max_permissible_dict_structure(&self) -> DictStruct {
        let descriptor = self.descriptor();
        let mut shape = DictStruct::all();
        for rel in &descriptor.relationships {
            shape.rels.insert(rel.name.clone(), DictStruct::all());
        }
        shape
    }

    // ---- reads ------------------------------------------------------------

    async fn get(&self, scope: &Scope, id: &RecordId) -> Result<Option<Record>, ApiError>;

    /// Fetch several records at once; the result lines up with `ids`.
    async fn get_all(&self, scope: &Scope, ids: &[RecordId]) -> Result<Vec<Option<Record>>, ApiError> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            found.push(self.get(scope, id).await?);
        }
        Ok(found)
    }

    /// Records whose `field` equals `value`; used to traverse relationships.
    async fn find_by(&self, field: &str, value: &Value) -> Result<Vec<Record>, ApiError>;

    async fn list(&self, query: &ListQuery) -> Result<Page, ApiError>;

    // ---- writes -----------------------------------------------------------

    async fn create(&self, fields: Fields) -> Result<Record, ApiError>;

    /// Create every `Some` item; `None` slots (items that failed validation)
    /// stay `None` in the result so positions line up with the input. A
    /// failed insert is reported in its own slot and the rest still run.
    async fn create_all(&self, items: Vec<Option<Fields>>) -> Result<Vec<Option<Result<Record, ApiError>>>, ApiError> {
        let mut created = Vec::with_capacity(items.len());
        for item in items {
            created.push(match item {
                Some(fields) => Some(self.create(fields).await),
                None => None,
            });
        }
        Ok(created)
    }

    async fn update(&self, existing: &Record, fields: Fields) -> Result<Record, ApiError>;

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, ApiError>;

    async fn delete(&self, existing: &Record) -> Result<(), ApiError>;

    // ---- pre-validation adapters -------------------------------------------
    //
    // Run before schema validation; an `Err` aborts the request and is
    // returned to the client as-is.

    fn pre_validation_adapter(&self, payload: Value, _existing: Option<&Record>) -> Result<Value, ApiError> {
        Ok(payload)
    }

    fn pre_validation_adapter_for_list(&self, payload: Vec<Value>) -> Result<Vec<Value>, ApiError> {
        Ok(payload)
    }

    fn pre_validation_adapter_for_mapped_collection(
        &self,
        payload: Fields,
        _existing: &HashMap<RecordId, Record>,
    ) -> Result<Fields, ApiError> {
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_integer_ids() {
        assert_eq!(RecordId::parse("42", KeyKind::Integer), Some(RecordId::Int(42)));
        assert_eq!(RecordId::parse(" 7 ", KeyKind::Integer), Some(RecordId::Int(7)));
        assert_eq!(RecordId::parse("abc", KeyKind::Integer), None);
    }

    #[test]
    fn test_parse_uuid_ids() {
        let raw = "550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(
            RecordId::parse(raw, KeyKind::Uuid).map(|id| id.to_string()),
            Some(raw.to_string())
        );
        assert_eq!(RecordId::parse("1", KeyKind::Uuid), None);
    }

    #[test]
    fn test_from_json_accepts_numbers_and_strings() {
        assert_eq!(RecordId::from_json(&json!(3), KeyKind::Integer), Some(RecordId::Int(3)));
        assert_eq!(RecordId::from_json(&json!("3"), KeyKind::Integer), Some(RecordId::Int(3)));
        assert_eq!(RecordId::from_json(&json!(null), KeyKind::Integer), None);
        assert_eq!(RecordId::from_json(&json!(1.5), KeyKind::Integer), None);
    }

    #[test]
    fn test_scope_matches_on_equality() {
        let record = Record::new("Article", json!({"id": 1, "kind": "news"}).as_object().cloned().unwrap());
        assert!(Scope::all().matches(&record));
        assert!(Scope::all().filter("kind", "news").matches(&record));
        assert!(!Scope::all().filter("kind", "opinion").matches(&record));
    }

    #[test]
    fn test_polymorphic_identities_include_base() {
        let spec = PolymorphicSpec::new("kind")
            .base_identity("article")
            .variant("NewsArticle", "news");
        assert_eq!(spec.identities(), vec!["article".to_string(), "news".to_string()]);
    }
}
