use axum::{
    body::Bytes,
    response::Response,
    routing::{MethodRouter, post},
};
use serde_json::{Value, json};
use std::sync::Arc;

use super::{ViewState, into_fields, parse_body};
use crate::config::ViewConfig;
use crate::context::RequestContext;
use crate::dict_struct::DictStruct;
use crate::errors::ApiError;
use crate::hooks::{PostProcessor, PreProcessor, run_post_processors, run_pre_processors};
use crate::model::{Fields, Record};
use crate::render::Related;
use crate::response::{ItemOutcome, list_envelope, success_result};
use crate::validation::SchemaValidator;

/// Query argument selecting a related object to return instead of the created one.
const RETURN_PATH_ARG: &str = "_ret";

struct PostView {
    state: ViewState,
    validator: SchemaValidator,
    pre_processors: Vec<Arc<dyn PreProcessor>>,
    post_processors: Vec<Arc<dyn PostProcessor>>,
    shape: DictStruct,
}

/// `POST /<slug>` with either one object or a list of objects.
pub fn construct_post_view_function(
    state: ViewState,
    config: &ViewConfig,
    validator: SchemaValidator,
) -> MethodRouter {
    let view = Arc::new(PostView {
        state,
        validator,
        pre_processors: config.pre_processors.clone(),
        post_processors: config.post_processors.clone(),
        shape: config.dict_struct.clone().unwrap_or_default(),
    });
    post(move |ctx: RequestContext, body: Bytes| {
        let view = Arc::clone(&view);
        async move { view.handle(&ctx, &body).await }
    })
}

impl PostView {
    async fn handle(&self, ctx: &RequestContext, body: &Bytes) -> Result<Response, ApiError> {
        run_pre_processors(&self.pre_processors, ctx, None).await?;

        match parse_body(body)? {
            Value::Array(items) => self.create_many(ctx, items).await,
            payload => self.create_one(ctx, payload).await,
        }
    }

    async fn create_one(&self, ctx: &RequestContext, payload: Value) -> Result<Response, ApiError> {
        let input = self.state.model.pre_validation_adapter(payload, None)?;
        self.validator
            .validate_object(&input, false)
            .map_err(ApiError::validation_failed)?;

        let record = self.state.model.create(into_fields(input.clone())?).await?;
        run_post_processors(&self.post_processors, ctx, &record, &input).await?;

        let result = match ctx.query(RETURN_PATH_ARG).map(str::trim) {
            Some(path) if !path.is_empty() => self.follow_return_path(record, path).await?,
            _ => self.state.renderer.render(&record, &self.shape).await?,
        };
        Ok(success_result(result))
    }

    /// Items that fail validation or insertion are reported but do not stop
    /// the others from being created.
    async fn create_many(&self, ctx: &RequestContext, items: Vec<Value>) -> Result<Response, ApiError> {
        let items = self.state.model.pre_validation_adapter_for_list(items)?;
        let (_, errors) = self.validator.validate_list_of_objects(&items);

        let inputs: Vec<Option<Fields>> = items
            .iter()
            .zip(&errors)
            .map(|(item, error)| match error {
                None => item.as_object().cloned(),
                Some(_) => None,
            })
            .collect();
        let created = self.state.model.create_all(inputs).await?;

        let mut outcomes = Vec::with_capacity(items.len());
        for ((item, error), record) in items.iter().zip(errors).zip(created) {
            let outcome = match (record, error) {
                (Some(Ok(record)), _) => {
                    run_post_processors(&self.post_processors, ctx, &record, item).await?;
                    ItemOutcome::Success(self.state.renderer.render(&record, &self.shape).await?)
                }
                (Some(Err(error)), _) => {
                    tracing::debug!(model = %self.state.name(), error = %error, "list item could not be created");
                    ItemOutcome::Failure(error.client_error())
                }
                (None, Some(errors)) => ItemOutcome::Failure(json!(errors)),
                (None, None) => ItemOutcome::Failure(json!("Resource could not be created")),
            };
            outcomes.push(outcome);
        }
        Ok(list_envelope(outcomes))
    }

    /// Walk a dotted relationship path (`author.publisher`) from the created
    /// record and render whatever it lands on with that model's registered shape.
    async fn follow_return_path(&self, record: Record, path: &str) -> Result<Value, ApiError> {
        let mut current = Related::One(Some(record));
        for segment in path.split('.').map(str::trim).filter(|s| !s.is_empty()) {
            current = match current {
                Related::One(Some(record)) => self.state.renderer.related(&record, segment).await?,
                Related::One(None) => return Ok(Value::Null),
                Related::Many(_) => {
                    return Err(ApiError::bad_request(format!(
                        "Cannot follow '{segment}' through a collection"
                    )));
                }
            };
        }

        let target = match &current {
            Related::One(Some(record)) => Some(record.model()),
            Related::Many(records) => records.first().map(Record::model),
            Related::One(None) => None,
        };
        let shape = target
            .and_then(|model| self.state.shapes.get(model))
            .cloned()
            .unwrap_or_default();
        self.state.renderer.render_related(&current, &shape).await
    }
}
