use axum::{
    extract::Path,
    response::Response,
    routing::{MethodRouter, get},
};
use serde_json::Value;
use std::sync::Arc;

use super::{ViewState, key_text};
use crate::config::ViewConfig;
use crate::context::RequestContext;
use crate::dict_struct::DictStruct;
use crate::errors::ApiError;
use crate::hooks::{ObjectGetter, PreProcessor, QueryConstructor, run_pre_processors};
use crate::model::RecordId;
use crate::response::{ItemOutcome, keyed_envelope, success_result};

struct GetView {
    state: ViewState,
    getter: Option<Arc<dyn ObjectGetter>>,
    query_constructor: Option<QueryConstructor>,
    pre_processors: Vec<Arc<dyn PreProcessor>>,
    shape: DictStruct,
}

/// `GET /<slug>/{id}` and the batch form `GET /<slug>/[1,2,3]`.
pub fn construct_get_view_function(state: ViewState, config: &ViewConfig) -> MethodRouter {
    let view = Arc::new(GetView {
        state,
        getter: config.permitted_object_getter.clone(),
        query_constructor: config.query_constructor.clone(),
        pre_processors: config.pre_processors.clone(),
        shape: config.dict_struct.clone().unwrap_or_default(),
    });
    get(move |Path(raw_id): Path<String>, ctx: RequestContext| {
        let view = Arc::clone(&view);
        async move { view.handle(&raw_id, &ctx).await }
    })
}

impl GetView {
    async fn handle(&self, raw_id: &str, ctx: &RequestContext) -> Result<Response, ApiError> {
        run_pre_processors(&self.pre_processors, ctx, None).await?;

        let raw_id = raw_id.trim();
        if let Some(inner) = raw_id.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            return self.handle_batch(inner, ctx).await;
        }

        let record = self
            .state
            .resolve(self.getter.as_ref(), self.query_constructor.as_ref(), ctx, raw_id)
            .await?
            .ok_or_else(|| self.state.not_found(raw_id))?;
        let rendered = self.state.renderer.render(&record, &self.shape).await?;
        Ok(success_result(rendered))
    }

    async fn handle_batch(&self, inner: &str, ctx: &RequestContext) -> Result<Response, ApiError> {
        // A permitted-object getter decides on its own what the bracket text means.
        if let Some(getter) = &self.getter {
            let outcome = match getter.get_object(ctx, self.state.model.as_ref(), inner).await? {
                Some(record) => ItemOutcome::Success(self.state.renderer.render(&record, &self.shape).await?),
                None => ItemOutcome::not_found(),
            };
            return Ok(keyed_envelope(vec![(inner.to_string(), outcome)]));
        }

        let requested: Vec<Value> = serde_json::from_str(&format!("[{inner}]"))
            .map_err(|_| ApiError::bad_request("Batch identifiers must be a JSON list"))?;
        let kind = self.state.model.descriptor().key_kind;
        let ids: Vec<Option<RecordId>> = requested.iter().map(|raw| RecordId::from_json(raw, kind)).collect();
        let lookup: Vec<RecordId> = ids.iter().flatten().cloned().collect();

        let scope = self.state.scope(self.query_constructor.as_ref(), ctx);
        let mut found = self.state.model.get_all(&scope, &lookup).await?.into_iter();

        let mut outcomes = Vec::with_capacity(requested.len());
        for (raw, id) in requested.iter().zip(ids) {
            let record = if id.is_some() { found.next().flatten() } else { None };
            let outcome = match record {
                Some(record) => ItemOutcome::Success(self.state.renderer.render(&record, &self.shape).await?),
                None => ItemOutcome::not_found(),
            };
            outcomes.push((key_text(raw), outcome));
        }
        Ok(keyed_envelope(outcomes))
    }
}
