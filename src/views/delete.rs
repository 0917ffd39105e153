use axum::{
    extract::Path,
    response::Response,
    routing::{MethodRouter, delete},
};
use std::sync::Arc;

use super::ViewState;
use crate::config::ViewConfig;
use crate::context::RequestContext;
use crate::errors::ApiError;
use crate::hooks::{PreProcessor, QueryConstructor, run_pre_processors};
use crate::response::success_json;

struct DeleteView {
    state: ViewState,
    query_constructor: Option<QueryConstructor>,
    pre_processors: Vec<Arc<dyn PreProcessor>>,
}

/// `DELETE /<slug>/{id}`
pub fn construct_delete_view_function(state: ViewState, config: &ViewConfig) -> MethodRouter {
    let view = Arc::new(DeleteView {
        state,
        query_constructor: config.query_constructor.clone(),
        pre_processors: config.pre_processors.clone(),
    });
    delete(move |Path(raw_id): Path<String>, ctx: RequestContext| {
        let view = Arc::clone(&view);
        async move { view.handle(&raw_id, &ctx).await }
    })
}

impl DeleteView {
    async fn handle(&self, raw_id: &str, ctx: &RequestContext) -> Result<Response, ApiError> {
        run_pre_processors(&self.pre_processors, ctx, None).await?;

        let target = self
            .state
            .resolve(None, self.query_constructor.as_ref(), ctx, raw_id)
            .await?
            .ok_or_else(|| self.state.not_found(raw_id))?;
        self.state.model.delete(&target).await?;
        Ok(success_json())
    }
}
