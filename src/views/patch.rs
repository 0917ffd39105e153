use axum::{
    body::Bytes,
    extract::Path,
    response::Response,
    routing::{MethodRouter, patch},
};
use std::sync::Arc;

use super::{ViewState, inject_discriminator, into_fields, parse_body};
use crate::config::ViewConfig;
use crate::context::RequestContext;
use crate::dict_struct::DictStruct;
use crate::errors::ApiError;
use crate::hooks::{PreProcessor, QueryConstructor, run_pre_processors};
use crate::response::success_result;
use crate::validation::SchemaValidator;

struct PatchView {
    state: ViewState,
    validator: SchemaValidator,
    query_constructor: Option<QueryConstructor>,
    pre_processors: Vec<Arc<dyn PreProcessor>>,
    shape: DictStruct,
}

/// `PATCH /<slug>/{id}`: a lighter PUT. Always resolves through the scoped
/// lookup, skips the pre-validation adapter and runs no post-processors.
pub fn construct_patch_view_function(
    state: ViewState,
    config: &ViewConfig,
    validator: SchemaValidator,
) -> MethodRouter {
    let view = Arc::new(PatchView {
        state,
        validator,
        query_constructor: config.query_constructor.clone(),
        pre_processors: config.pre_processors.clone(),
        shape: config.dict_struct.clone().unwrap_or_default(),
    });
    patch(move |Path(raw_id): Path<String>, ctx: RequestContext, body: Bytes| {
        let view = Arc::clone(&view);
        async move { view.handle(&raw_id, &ctx, &body).await }
    })
}

impl PatchView {
    async fn handle(&self, raw_id: &str, ctx: &RequestContext, body: &Bytes) -> Result<Response, ApiError> {
        run_pre_processors(&self.pre_processors, ctx, None).await?;

        let target = self
            .state
            .resolve(None, self.query_constructor.as_ref(), ctx, raw_id)
            .await?
            .ok_or_else(|| self.state.not_found(raw_id))?;

        let mut input = parse_body(body)?;
        inject_discriminator(&mut input, self.validator.polymorphic_on(), &target);
        self.validator
            .validate_object(&input, true)
            .map_err(ApiError::validation_failed)?;

        let updated = self.state.model.update(&target, into_fields(input)?).await?;
        let rendered = self.state.renderer.render(&updated, &self.shape).await?;
        Ok(success_result(rendered))
    }
}
