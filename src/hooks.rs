//! # Per-view hooks
//!
//! Hooks customise generated views without replacing them:
//!
//! - [`PreProcessor`]: runs before any work; return an error to reject the request.
//! - [`PostProcessor`]: runs after each created or updated record.
//! - [`BatchPostProcessor`]: runs once after a batch update, over every record
//!   that was updated successfully, before the batch is committed.
//! - [`ObjectGetter`]: replaces the default lookup of the target record,
//!   typically to enforce ownership.
//! - [`QueryConstructor`]: narrows the [`Scope`] every lookup goes through.
//!
//! Closures implement the synchronous hooks directly:
//!
//! ```rust,ignore
//! ViewConfig::new().pre_processor(|ctx: &RequestContext, _target: Option<&Record>| {
//!     match ctx.header("x-role") {
//!         Some("editor") => Ok(()),
//!         _ => Err(ApiError::forbidden("Editors only")),
//!     }
//! })
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::errors::ApiError;
use crate::model::{Fields, ModelLayer, Record, RecordId, Scope};

#[async_trait]
pub trait PreProcessor: Send + Sync {
    /// `target` is the resolved record for PUT; `None` for every other verb.
    async fn process(&self, ctx: &RequestContext, target: Option<&Record>) -> Result<(), ApiError>;
}

#[async_trait]
impl<F> PreProcessor for F
where
    F: Fn(&RequestContext, Option<&Record>) -> Result<(), ApiError> + Send + Sync,
{
    async fn process(&self, ctx: &RequestContext, target: Option<&Record>) -> Result<(), ApiError> {
        self(ctx, target)
    }
}

#[async_trait]
pub trait PostProcessor: Send + Sync {
    async fn process(&self, ctx: &RequestContext, record: &Record, input: &Value) -> Result<(), ApiError>;
}

#[async_trait]
impl<F> PostProcessor for F
where
    F: Fn(&RequestContext, &Record, &Value) -> Result<(), ApiError> + Send + Sync,
{
    async fn process(&self, ctx: &RequestContext, record: &Record, input: &Value) -> Result<(), ApiError> {
        self(ctx, record, input)
    }
}

#[async_trait]
pub trait BatchPostProcessor: Send + Sync {
    async fn process(
        &self,
        ctx: &RequestContext,
        updated: &[(RecordId, Record)],
        input: &Fields,
    ) -> Result<(), ApiError>;
}

#[async_trait]
impl<F> BatchPostProcessor for F
where
    F: Fn(&RequestContext, &[(RecordId, Record)], &Fields) -> Result<(), ApiError> + Send + Sync,
{
    async fn process(
        &self,
        ctx: &RequestContext,
        updated: &[(RecordId, Record)],
        input: &Fields,
    ) -> Result<(), ApiError> {
        self(ctx, updated, input)
    }
}

/// Resolves the record a view acts on, replacing the scoped primary-key lookup.
///
/// `raw_id` is the path segment as received (for bracketed GETs, the text
/// between the brackets). Returning `Ok(None)` produces a 404.
#[async_trait]
pub trait ObjectGetter: Send + Sync {
    async fn get_object(
        &self,
        ctx: &RequestContext,
        model: &dyn ModelLayer,
        raw_id: &str,
    ) -> Result<Option<Record>, ApiError>;
}

/// Narrows the base scope for a request.
pub type QueryConstructor = Arc<dyn Fn(&RequestContext, Scope) -> Scope + Send + Sync>;

/// Run pre-processors in order, stopping at the first rejection.
pub(crate) async fn run_pre_processors(
    hooks: &[Arc<dyn PreProcessor>],
    ctx: &RequestContext,
    target: Option<&Record>,
) -> Result<(), ApiError> {
    for hook in hooks {
        hook.process(ctx, target).await?;
    }
    Ok(())
}

pub(crate) async fn run_post_processors(
    hooks: &[Arc<dyn PostProcessor>],
    ctx: &RequestContext,
    record: &Record,
    input: &Value,
) -> Result<(), ApiError> {
    for hook in hooks {
        hook.process(ctx, record, input).await?;
    }
    Ok(())
}
