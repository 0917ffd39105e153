use axum::{
    body::Bytes,
    extract::Path,
    response::Response,
    routing::{MethodRouter, put},
};
use std::sync::Arc;

use super::{ViewState, inject_discriminator, into_fields, parse_body};
use crate::config::ViewConfig;
use crate::context::RequestContext;
use crate::dict_struct::DictStruct;
use crate::errors::ApiError;
use crate::hooks::{ObjectGetter, PostProcessor, PreProcessor, QueryConstructor, run_post_processors, run_pre_processors};
use crate::response::success_result;
use crate::validation::SchemaValidator;

struct PutView {
    state: ViewState,
    validator: SchemaValidator,
    getter: Option<Arc<dyn ObjectGetter>>,
    query_constructor: Option<QueryConstructor>,
    pre_processors: Vec<Arc<dyn PreProcessor>>,
    post_processors: Vec<Arc<dyn PostProcessor>>,
    shape: DictStruct,
}

/// `PUT /<slug>/{id}`: update the fields present in the payload.
pub fn construct_put_view_function(
    state: ViewState,
    config: &ViewConfig,
    validator: SchemaValidator,
) -> MethodRouter {
    let view = Arc::new(PutView {
        state,
        validator,
        getter: config.permitted_object_getter.clone(),
        query_constructor: config.query_constructor.clone(),
        pre_processors: config.pre_processors.clone(),
        post_processors: config.post_processors.clone(),
        shape: config.dict_struct.clone().unwrap_or_default(),
    });
    put(move |Path(raw_id): Path<String>, ctx: RequestContext, body: Bytes| {
        let view = Arc::clone(&view);
        async move { view.handle(&raw_id, &ctx, &body).await }
    })
}

impl PutView {
    async fn handle(&self, raw_id: &str, ctx: &RequestContext, body: &Bytes) -> Result<Response, ApiError> {
        let target = self
            .state
            .resolve(self.getter.as_ref(), self.query_constructor.as_ref(), ctx, raw_id)
            .await?
            .ok_or_else(|| self.state.not_found(raw_id))?;
        run_pre_processors(&self.pre_processors, ctx, Some(&target)).await?;

        let payload = parse_body(body)?;
        let mut input = self.state.model.pre_validation_adapter(payload, Some(&target))?;
        inject_discriminator(&mut input, self.validator.polymorphic_on(), &target);
        self.validator
            .validate_object(&input, true)
            .map_err(ApiError::validation_failed)?;

        let updated = self.state.model.update(&target, into_fields(input.clone())?).await?;
        run_post_processors(&self.post_processors, ctx, &updated, &input).await?;

        let rendered = self.state.renderer.render(&updated, &self.shape).await?;
        Ok(success_result(rendered))
    }
}
