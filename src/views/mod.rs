//! # View constructors
//!
//! Each `construct_*_view_function` closes over a model, its resolved
//! [`ViewConfig`] and (for verbs with a body) a compiled [`SchemaValidator`],
//! and returns an axum [`MethodRouter`] ready to be mounted. The registrar
//! calls them; they are public so a hand-built router can reuse a single view.
//!
//! [`ViewConfig`]: crate::config::ViewConfig
//! [`SchemaValidator`]: crate::validation::SchemaValidator
//! [`MethodRouter`]: axum::routing::MethodRouter

mod batch_put;
mod delete;
mod get;
mod index;
mod patch;
mod post;
mod put;

pub use batch_put::construct_batch_put_view_function;
pub use delete::construct_delete_view_function;
pub use get::construct_get_view_function;
pub use index::construct_index_view_function;
pub use patch::construct_patch_view_function;
pub use post::construct_post_view_function;
pub use put::construct_put_view_function;

use axum::body::Bytes;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::catalog::ModelCatalog;
use crate::context::RequestContext;
use crate::dict_struct::DictStruct;
use crate::errors::ApiError;
use crate::hooks::{ObjectGetter, QueryConstructor};
use crate::model::{Fields, ModelLayer, Record, RecordId, Scope};
use crate::render::Renderer;

/// What every view of one resource shares.
#[derive(Clone)]
pub struct ViewState {
    pub(crate) model: Arc<dyn ModelLayer>,
    pub(crate) renderer: Renderer,
    /// Model name → registered response shape, for `_ret` targets.
    pub(crate) shapes: Arc<BTreeMap<String, DictStruct>>,
}

impl ViewState {
    pub fn new(
        model: Arc<dyn ModelLayer>,
        catalog: Arc<ModelCatalog>,
        shapes: Arc<BTreeMap<String, DictStruct>>,
    ) -> Self {
        Self {
            model,
            renderer: Renderer::new(catalog),
            shapes,
        }
    }

    fn name(&self) -> &str {
        &self.model.descriptor().name
    }

    fn scope(&self, query_constructor: Option<&QueryConstructor>, ctx: &RequestContext) -> Scope {
        match query_constructor {
            Some(narrow) => narrow(ctx, Scope::all()),
            None => Scope::all(),
        }
    }

    /// Resolve the record an item view acts on: the permitted-object getter if
    /// configured, else a primary-key lookup inside the request scope.
    async fn resolve(
        &self,
        getter: Option<&Arc<dyn ObjectGetter>>,
        query_constructor: Option<&QueryConstructor>,
        ctx: &RequestContext,
        raw_id: &str,
    ) -> Result<Option<Record>, ApiError> {
        if let Some(getter) = getter {
            return getter.get_object(ctx, self.model.as_ref(), raw_id).await;
        }
        // An id that cannot be coerced to the key type matches nothing.
        let Some(id) = RecordId::parse(raw_id, self.model.descriptor().key_kind) else {
            return Ok(None);
        };
        let scope = self.scope(query_constructor, ctx);
        self.model.get(&scope, &id).await
    }

    fn not_found(&self, raw_id: &str) -> ApiError {
        ApiError::not_found(self.name().to_string(), Some(raw_id.to_string()))
    }
}

fn parse_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::bad_request("Request body is required"));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Request body is not valid JSON: {e}")))
}

fn into_fields(payload: Value) -> Result<Fields, ApiError> {
    match payload {
        Value::Object(fields) => Ok(fields),
        _ => Err(ApiError::bad_request("Expected a JSON object")),
    }
}

/// Copy the stored discriminator into an update payload that omits it, so the
/// payload validates against the record's own variant.
fn inject_discriminator(payload: &mut Value, discriminator: Option<&str>, existing: &Record) {
    let (Some(field), Some(fields)) = (discriminator, payload.as_object_mut()) else {
        return;
    };
    if fields.contains_key(field) {
        return;
    }
    if let Some(current) = existing.get(field) {
        fields.insert(field.to_string(), current.clone());
    }
}

/// Text form of a batch key as sent by the client.
fn key_text(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
