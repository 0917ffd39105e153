//! # Registration tables
//!
//! A [`Registration`] lists the resources to expose. Each [`ResourceConfig`]
//! names a model, its URL slug and resource-wide defaults; per-verb
//! [`ViewConfig`]s override those defaults for a single view.
//!
//! ```rust,ignore
//! let registration = Registration::new()
//!     .resource(
//!         ResourceConfig::new(authors, "authors")
//!             .dict_struct(DictStruct::attrs(["id", "name"]))
//!             .forbid(Verb::Delete),
//!     )
//!     .resource(
//!         ResourceConfig::new(articles, "articles")
//!             .view(Verb::Post, ViewConfig::new().post_processor(notify_editors)),
//!     );
//! ```

use axum::http::Method;
use axum::routing::MethodRouter;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::catalog::ModelCatalog;
use crate::context::RequestContext;
use crate::dict_struct::DictStruct;
use crate::hooks::{BatchPostProcessor, ObjectGetter, PostProcessor, PreProcessor, QueryConstructor};
use crate::model::{ModelLayer, Scope};
use crate::schema::{InputSchema, SchemaModifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    Index,
    Get,
    Post,
    Put,
    BatchPut,
    Patch,
    Delete,
}

impl Verb {
    pub const ALL: [Verb; 7] = [
        Verb::Index,
        Verb::Get,
        Verb::Post,
        Verb::Put,
        Verb::BatchPut,
        Verb::Patch,
        Verb::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::BatchPut => "batch_put",
            Self::Patch => "patch",
            Self::Delete => "delete",
        }
    }

    pub fn method(self) -> Method {
        match self {
            Self::Index | Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put | Self::BatchPut => Method::PUT,
            Self::Patch => Method::PATCH,
            Self::Delete => Method::DELETE,
        }
    }

    /// Item views take the record identifier from the URL.
    pub fn is_item_view(self) -> bool {
        matches!(self, Self::Get | Self::Put | Self::Patch | Self::Delete)
    }

    pub fn default_url(self, slug: &str) -> String {
        let slug = slug.trim_matches('/');
        if self.is_item_view() {
            format!("/{slug}/{{id}}")
        } else {
            format!("/{slug}")
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overrides for a single view. Settings that a verb does not use are ignored
/// (PATCH has no object getter or post-processors; only batch PUT runs batch
/// post-processors).
#[derive(Clone, Default)]
pub struct ViewConfig {
    pub(crate) url: Option<String>,
    pub(crate) view_func: Option<MethodRouter>,
    pub(crate) query_constructor: Option<QueryConstructor>,
    pub(crate) permitted_object_getter: Option<Arc<dyn ObjectGetter>>,
    pub(crate) dict_struct: Option<DictStruct>,
    pub(crate) input_schema_modifier: Option<SchemaModifier>,
    pub(crate) pre_processors: Vec<Arc<dyn PreProcessor>>,
    pub(crate) post_processors: Vec<Arc<dyn PostProcessor>>,
    pub(crate) batch_post_processors: Vec<Arc<dyn BatchPostProcessor>>,
}

impl ViewConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount at `url` instead of the default. Item views need exactly one
    /// path parameter, e.g. `/writers/{writer_id}`.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Mount `router` in place of the generated handler.
    #[must_use]
    pub fn view_func(mut self, router: MethodRouter) -> Self {
        self.view_func = Some(router);
        self
    }

    #[must_use]
    pub fn query_constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, Scope) -> Scope + Send + Sync + 'static,
    {
        self.query_constructor = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn permitted_object_getter(mut self, getter: impl ObjectGetter + 'static) -> Self {
        self.permitted_object_getter = Some(Arc::new(getter));
        self
    }

    #[must_use]
    pub fn dict_struct(mut self, shape: DictStruct) -> Self {
        self.dict_struct = Some(shape);
        self
    }

    #[must_use]
    pub fn input_schema_modifier<F>(mut self, f: F) -> Self
    where
        F: Fn(InputSchema) -> InputSchema + Send + Sync + 'static,
    {
        self.input_schema_modifier = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn pre_processor(mut self, hook: impl PreProcessor + 'static) -> Self {
        self.pre_processors.push(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn post_processor(mut self, hook: impl PostProcessor + 'static) -> Self {
        self.post_processors.push(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn batch_post_processor(mut self, hook: impl BatchPostProcessor + 'static) -> Self {
        self.batch_post_processors.push(Arc::new(hook));
        self
    }
}

/// One exposed model and its resource-wide defaults.
#[derive(Clone)]
pub struct ResourceConfig {
    pub(crate) model: Arc<dyn ModelLayer>,
    pub(crate) url_slug: String,
    pub(crate) forbidden_views: BTreeSet<Verb>,
    pub(crate) query_constructor: Option<QueryConstructor>,
    pub(crate) permitted_object_getter: Option<Arc<dyn ObjectGetter>>,
    pub(crate) dict_struct: Option<DictStruct>,
    pub(crate) input_schema_modifier: Option<SchemaModifier>,
    pub(crate) views: BTreeMap<Verb, ViewConfig>,
}

impl ResourceConfig {
    pub fn new(model: Arc<dyn ModelLayer>, url_slug: impl Into<String>) -> Self {
        Self {
            model,
            url_slug: url_slug.into(),
            forbidden_views: BTreeSet::new(),
            query_constructor: None,
            permitted_object_getter: None,
            dict_struct: None,
            input_schema_modifier: None,
            views: BTreeMap::new(),
        }
    }

    pub fn model(&self) -> &Arc<dyn ModelLayer> {
        &self.model
    }

    pub fn url_slug(&self) -> &str {
        &self.url_slug
    }

    /// Do not mount `verb` for this resource.
    #[must_use]
    pub fn forbid(mut self, verb: Verb) -> Self {
        self.forbidden_views.insert(verb);
        self
    }

    #[must_use]
    pub fn query_constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, Scope) -> Scope + Send + Sync + 'static,
    {
        self.query_constructor = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn permitted_object_getter(mut self, getter: impl ObjectGetter + 'static) -> Self {
        self.permitted_object_getter = Some(Arc::new(getter));
        self
    }

    /// Default response shape for every view of this resource, and the shape
    /// `_ret` uses when it lands on this model.
    #[must_use]
    pub fn dict_struct(mut self, shape: DictStruct) -> Self {
        self.dict_struct = Some(shape);
        self
    }

    /// Applied to the generated input schema before it is recorded for this model.
    #[must_use]
    pub fn input_schema_modifier<F>(mut self, f: F) -> Self
    where
        F: Fn(InputSchema) -> InputSchema + Send + Sync + 'static,
    {
        self.input_schema_modifier = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn view(mut self, verb: Verb, config: ViewConfig) -> Self {
        self.views.insert(verb, config);
        self
    }

    pub(crate) fn is_forbidden(&self, verb: Verb) -> bool {
        self.forbidden_views.contains(&verb)
    }

    /// The per-verb config with resource defaults filled in.
    pub(crate) fn resolved_view(&self, verb: Verb) -> ViewConfig {
        let mut view = self.views.get(&verb).cloned().unwrap_or_default();
        if view.query_constructor.is_none() {
            view.query_constructor.clone_from(&self.query_constructor);
        }
        if view.permitted_object_getter.is_none() {
            view.permitted_object_getter.clone_from(&self.permitted_object_getter);
        }
        if view.dict_struct.is_none() {
            view.dict_struct.clone_from(&self.dict_struct);
        }
        view
    }
}

/// The full set of resources to mount, plus models that are only reachable
/// through relationships.
#[derive(Clone, Default)]
pub struct Registration {
    resources: Vec<ResourceConfig>,
    related_models: Vec<Arc<dyn ModelLayer>>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn resource(mut self, resource: ResourceConfig) -> Self {
        self.resources.push(resource);
        self
    }

    /// A model that has no routes of its own but can be rendered, traversed
    /// with `_ret`, and gets a schema record.
    #[must_use]
    pub fn related_model(mut self, model: Arc<dyn ModelLayer>) -> Self {
        self.related_models.push(model);
        self
    }

    pub fn resources(&self) -> &[ResourceConfig] {
        &self.resources
    }

    pub(crate) fn catalog(&self) -> ModelCatalog {
        let mut catalog = ModelCatalog::new();
        for resource in &self.resources {
            catalog.insert(Arc::clone(&resource.model));
        }
        for model in &self.related_models {
            catalog.insert(Arc::clone(model));
        }
        catalog
    }

    /// Model name → registered response shape.
    pub(crate) fn shapes(&self) -> BTreeMap<String, DictStruct> {
        let mut shapes = BTreeMap::new();
        for resource in &self.resources {
            if let Some(shape) = &resource.dict_struct {
                shapes
                    .entry(resource.model.descriptor().name.clone())
                    .or_insert_with(|| shape.clone());
            }
        }
        shapes
    }

    pub(crate) fn input_schema_modifier(&self, model: &str) -> Option<&SchemaModifier> {
        self.resources
            .iter()
            .find(|r| r.model.descriptor().name == model)
            .and_then(|r| r.input_schema_modifier.as_ref())
    }
}

/// Registrar-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrarOptions {
    /// Accept payload fields the schema does not declare.
    pub allow_unknown_fields: bool,
    /// Serve the registry (models, schemas, mounted views) as JSON.
    pub register_schema_structure: bool,
    pub schema_structure_url: String,
}

impl Default for RegistrarOptions {
    fn default() -> Self {
        Self {
            allow_unknown_fields: false,
            register_schema_structure: true,
            schema_structure_url: "/_schemas".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_urls() {
        assert_eq!(Verb::Index.default_url("authors"), "/authors");
        assert_eq!(Verb::BatchPut.default_url("/authors/"), "/authors");
        assert_eq!(Verb::Get.default_url("authors"), "/authors/{id}");
        assert_eq!(Verb::Delete.default_url("authors"), "/authors/{id}");
    }

    #[test]
    fn test_verb_methods() {
        assert_eq!(Verb::BatchPut.method(), Method::PUT);
        assert_eq!(Verb::Index.method(), Method::GET);
        assert_eq!(Verb::Patch.method(), Method::PATCH);
    }
}
