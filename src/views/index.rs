use axum::{
    http::HeaderMap,
    response::Response,
    routing::{MethodRouter, get},
};
use std::sync::Arc;

use super::ViewState;
use crate::config::ViewConfig;
use crate::context::RequestContext;
use crate::dict_struct::DictStruct;
use crate::errors::ApiError;
use crate::hooks::{PreProcessor, QueryConstructor, run_pre_processors};
use crate::models::ListOptions;
use crate::pagination::calculate_content_range;
use crate::response::listing;

struct IndexView {
    state: ViewState,
    query_constructor: Option<QueryConstructor>,
    pre_processors: Vec<Arc<dyn PreProcessor>>,
    shape: DictStruct,
}

/// `GET /<slug>`: every record in scope, optionally paginated and sorted.
pub fn construct_index_view_function(state: ViewState, config: &ViewConfig) -> MethodRouter {
    let view = Arc::new(IndexView {
        state,
        query_constructor: config.query_constructor.clone(),
        pre_processors: config.pre_processors.clone(),
        shape: config.dict_struct.clone().unwrap_or_default(),
    });
    get(move |ctx: RequestContext| {
        let view = Arc::clone(&view);
        async move { view.handle(&ctx).await }
    })
}

impl IndexView {
    async fn handle(&self, ctx: &RequestContext) -> Result<Response, ApiError> {
        run_pre_processors(&self.pre_processors, ctx, None).await?;

        let options = ListOptions::from_query(&ctx.query)?;
        let query = options.to_list_query(self.state.scope(self.query_constructor.as_ref(), ctx))?;
        let page = self.state.model.list(&query).await?;
        let items = self.state.renderer.render_many(&page.items, &self.shape).await?;

        let headers = match query.limit {
            Some(limit) => calculate_content_range(
                query.offset,
                limit,
                page.total,
                &self.state.model.descriptor().table_name,
            ),
            None => HeaderMap::new(),
        };
        Ok(listing(items, page.total, headers))
    }
}
