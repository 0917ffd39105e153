use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::Arc;

use crate::catalog::ModelCatalog;
use crate::dict_struct::DictStruct;
use crate::errors::ApiError;
use crate::model::{Cardinality, Record};

/// Records reached through one relationship.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    One(Option<Record>),
    Many(Vec<Record>),
}

/// Renders records to JSON according to a [`DictStruct`], loading related
/// records through the catalog as the shape asks for them.
#[derive(Debug, Clone)]
pub struct Renderer {
    catalog: Arc<ModelCatalog>,
}

impl Renderer {
    pub fn new(catalog: Arc<ModelCatalog>) -> Self {
        Self { catalog }
    }

    /// Follow relationship `name` from `record`.
    ///
    /// An unknown relationship is a client error since relationship names
    /// arrive from request arguments (`_ret`).
    pub async fn related(&self, record: &Record, name: &str) -> Result<Related, ApiError> {
        let owner = self.catalog.get(record.model()).ok_or_else(|| {
            ApiError::internal(
                "Model is not registered",
                Some(format!("'{}' missing from catalog", record.model())),
            )
        })?;
        let rel = owner
            .descriptor()
            .relationship(name)
            .cloned()
            .ok_or_else(|| ApiError::bad_request(format!("{} has no relationship '{name}'", record.model())))?;
        let target = self.catalog.get(&rel.target).ok_or_else(|| {
            ApiError::internal(
                "Related model is not registered",
                Some(format!("'{}' missing from catalog", rel.target)),
            )
        })?;

        let key = record.get(&rel.local_field).cloned().unwrap_or(Value::Null);
        let mut found = if key.is_null() {
            Vec::new()
        } else {
            target.find_by(&rel.remote_field, &key).await?
        };

        Ok(match rel.cardinality {
            Cardinality::One if found.is_empty() => Related::One(None),
            Cardinality::One => Related::One(Some(found.swap_remove(0))),
            Cardinality::Many => Related::Many(found),
        })
    }

    pub fn render<'a>(&'a self, record: &'a Record, shape: &'a DictStruct) -> BoxFuture<'a, Result<Value, ApiError>> {
        async move {
            let mut out = shape.project(record.fields());
            let descriptor = self.catalog.get(record.model()).map(|m| m.descriptor());

            for (name, nested) in &shape.rels {
                if descriptor.and_then(|d| d.relationship(name)).is_none() {
                    tracing::warn!(model = record.model(), relationship = %name, "dict_struct names an unknown relationship");
                    continue;
                }
                let value = match self.related(record, name).await? {
                    Related::One(Some(target)) => self.render(&target, nested).await?,
                    Related::One(None) => Value::Null,
                    Related::Many(targets) => Value::Array(self.render_many(&targets, nested).await?),
                };
                out.insert(name.clone(), value);
            }
            Ok(Value::Object(out))
        }
        .boxed()
    }

    pub async fn render_many(&self, records: &[Record], shape: &DictStruct) -> Result<Vec<Value>, ApiError> {
        let mut rendered = Vec::with_capacity(records.len());
        for record in records {
            rendered.push(self.render(record, shape).await?);
        }
        Ok(rendered)
    }

    pub async fn render_related(&self, related: &Related, shape: &DictStruct) -> Result<Value, ApiError> {
        Ok(match related {
            Related::One(Some(record)) => self.render(record, shape).await?,
            Related::One(None) => Value::Null,
            Related::Many(records) => Value::Array(self.render_many(records, shape).await?),
        })
    }
}
