//! Response-shape descriptors.
//!
//! A [`DictStruct`] says which columns of a record to render and which
//! relationships to expand, recursively:
//!
//! ```json
//! {"attrs": ["id", "name"], "rels": {"articles": {"attrs": ["id", "title"]}}}
//! ```
//!
//! `attrs` absent means every column; `exclude` removes columns after that.
//! Relationships are only rendered when named under `rels`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictStruct {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rels: BTreeMap<String, DictStruct>,
}

impl DictStruct {
    /// Every column, no relationships.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn attrs<I, S>(attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attrs: Some(attrs.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(fields.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn rel(mut self, name: impl Into<String>, shape: DictStruct) -> Self {
        self.rels.insert(name.into(), shape);
        self
    }

    /// Select the scalar part of a record according to `attrs` and `exclude`.
    pub fn project(&self, fields: &Map<String, Value>) -> Map<String, Value> {
        let mut out = match &self.attrs {
            Some(attrs) => attrs
                .iter()
                .filter_map(|name| fields.get(name).map(|v| (name.clone(), v.clone())))
                .collect::<Map<_, _>>(),
            None => fields.clone(),
        };
        for name in &self.exclude {
            out.remove(name);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> Map<String, Value> {
        json!({"id": 1, "name": "Ada", "bio": null})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_default_projects_every_column() {
        assert_eq!(DictStruct::all().project(&fields()), fields());
    }

    #[test]
    fn test_attrs_keep_listed_order_and_skip_unknown() {
        let shape = DictStruct::attrs(["name", "id", "missing"]);
        let projected = shape.project(&fields());
        assert_eq!(Value::Object(projected), json!({"name": "Ada", "id": 1}));
    }

    #[test]
    fn test_exclude_applies_after_attrs() {
        let shape = DictStruct::all().exclude(["bio"]);
        assert_eq!(
            Value::Object(shape.project(&fields())),
            json!({"id": 1, "name": "Ada"})
        );
    }

    #[test]
    fn test_deserializes_nested_rels() {
        let shape: DictStruct = serde_json::from_value(json!({
            "attrs": ["id"],
            "rels": {"articles": {"attrs": ["title"]}}
        }))
        .unwrap();
        assert_eq!(
            shape,
            DictStruct::attrs(["id"]).rel("articles", DictStruct::attrs(["title"]))
        );
    }
}
