use axum::{
    body::Bytes,
    response::Response,
    routing::{MethodRouter, put},
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::{ViewState, inject_discriminator, parse_body};
use crate::config::ViewConfig;
use crate::context::RequestContext;
use crate::dict_struct::DictStruct;
use crate::errors::ApiError;
use crate::hooks::{BatchPostProcessor, PreProcessor, QueryConstructor, run_pre_processors};
use crate::model::{Record, RecordId};
use crate::response::{ItemOutcome, keyed_envelope};
use crate::validation::SchemaValidator;

struct BatchPutView {
    state: ViewState,
    validator: SchemaValidator,
    query_constructor: Option<QueryConstructor>,
    pre_processors: Vec<Arc<dyn PreProcessor>>,
    post_processors: Vec<Arc<dyn BatchPostProcessor>>,
    shape: DictStruct,
}

/// Per-key state while the batch is processed; successes are rendered after commit.
enum Pending {
    Updated(RecordId),
    Failed(ItemOutcome),
}

/// `PUT /<slug>` with `{"<id>": {..fields..}, ...}`.
///
/// Every item is validated and updated on its own; failures are reported per
/// key. Successful updates are committed together once batch post-processors
/// have run.
pub fn construct_batch_put_view_function(
    state: ViewState,
    config: &ViewConfig,
    validator: SchemaValidator,
) -> MethodRouter {
    let view = Arc::new(BatchPutView {
        state,
        validator,
        query_constructor: config.query_constructor.clone(),
        pre_processors: config.pre_processors.clone(),
        post_processors: config.batch_post_processors.clone(),
        shape: config.dict_struct.clone().unwrap_or_default(),
    });
    put(move |ctx: RequestContext, body: Bytes| {
        let view = Arc::clone(&view);
        async move { view.handle(&ctx, &body).await }
    })
}

impl BatchPutView {
    async fn handle(&self, ctx: &RequestContext, body: &Bytes) -> Result<Response, ApiError> {
        run_pre_processors(&self.pre_processors, ctx, None).await?;

        let Value::Object(payload) = parse_body(body)? else {
            return Err(ApiError::bad_request("Expected an object mapping identifiers to updates"));
        };
        let kind = self.state.model.descriptor().key_kind;
        let mut ids = Vec::with_capacity(payload.len());
        for key in payload.keys() {
            let id = RecordId::parse(key, kind)
                .ok_or_else(|| ApiError::bad_request(format!("'{key}' is not a valid identifier")))?;
            ids.push(id);
        }

        let scope = self.state.scope(self.query_constructor.as_ref(), ctx);
        let existing: HashMap<RecordId, Record> = self
            .state
            .model
            .get_all(&scope, &ids)
            .await?
            .into_iter()
            .zip(&ids)
            .filter_map(|(record, id)| Some((id.clone(), record?)))
            .collect();

        let input = self
            .state
            .model
            .pre_validation_adapter_for_mapped_collection(payload, &existing)?;

        let mut unit = self.state.model.begin().await?;
        let mut pending = Vec::with_capacity(input.len());
        let mut updated: Vec<(RecordId, Record)> = Vec::new();

        for (key, data) in &input {
            let Some((id, target)) = RecordId::parse(key, kind).and_then(|id| {
                let target = existing.get(&id)?;
                Some((id, target))
            }) else {
                pending.push((key.clone(), Pending::Failed(ItemOutcome::not_found())));
                continue;
            };

            let mut data = data.clone();
            inject_discriminator(&mut data, self.validator.polymorphic_on(), target);
            if let Err(errors) = self.validator.validate_object(&data, true) {
                tracing::debug!(model = %self.state.name(), key = %key, "batch item failed validation");
                pending.push((key.clone(), Pending::Failed(ItemOutcome::Failure(serde_json::json!(errors)))));
                continue;
            }
            let Value::Object(fields) = data else {
                pending.push((key.clone(), Pending::Failed(ItemOutcome::Failure(Value::from("Expected a JSON object")))));
                continue;
            };

            match unit.update_without_commit(target, fields).await {
                Ok(record) => {
                    updated.push((id.clone(), record));
                    pending.push((key.clone(), Pending::Updated(id)));
                }
                Err(error) => {
                    tracing::debug!(model = %self.state.name(), key = %key, error = %error, "batch item update failed");
                    pending.push((key.clone(), Pending::Failed(ItemOutcome::Failure(error.client_error()))));
                }
            }
        }

        for hook in &self.post_processors {
            hook.process(ctx, &updated, &input).await?;
        }
        unit.commit().await?;

        let rendered: HashMap<RecordId, Value> = {
            let mut rendered = HashMap::with_capacity(updated.len());
            for (id, record) in &updated {
                rendered.insert(id.clone(), self.state.renderer.render(record, &self.shape).await?);
            }
            rendered
        };
        let outcomes = pending
            .into_iter()
            .map(|(key, item)| {
                let outcome = match item {
                    Pending::Updated(id) => rendered
                        .get(&id)
                        .cloned()
                        .map_or_else(ItemOutcome::not_found, ItemOutcome::Success),
                    Pending::Failed(outcome) => outcome,
                };
                (key, outcome)
            })
            .collect();
        Ok(keyed_envelope(outcomes))
    }
}
