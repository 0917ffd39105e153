//! # Route registration
//!
//! [`RouteRegistrar`] turns a [`Registration`] into axum routes. For each
//! resource it
//!
//! 1. records the model as registered (once, however often it is registered),
//! 2. populates schema records for the model and everything reachable from it
//!    through relationships and polymorphic variants,
//! 3. mounts one view per non-forbidden verb at `/<slug>` (index, post,
//!    batch_put) or `/<slug>/{id}` (get, put, patch, delete), unless a view
//!    overrides its URL, and
//! 4. records each mounted view under the endpoint name `<verb>_<table>`.
//!
//! Everything recorded is exposed read-only through [`CrudRegistry`] once
//! [`RouteRegistrar::into_router`] is called.

use axum::{
    Json, Router,
    routing::{MethodRouter, get},
};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use crate::catalog::ModelCatalog;
use crate::config::{Registration, RegistrarOptions, ResourceConfig, Verb, ViewConfig};
use crate::errors::RegistryError;
use crate::model::ModelLayer;
use crate::schema::{InputSchema, SchemaRecord, SchemaRegistry};
use crate::validation::SchemaValidator;
use crate::views::{
    ViewState, construct_batch_put_view_function, construct_delete_view_function, construct_get_view_function,
    construct_index_view_function, construct_patch_view_function, construct_post_view_function,
    construct_put_view_function,
};

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MountedView {
    pub endpoint: String,
    pub url: String,
    pub method: String,
    /// Present when the view modified its input schema.
    pub input_schema: Option<Value>,
}

/// What has been registered: models, their schema records, and mounted views.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrudRegistry {
    pub models_registered_for_views: Vec<String>,
    pub model_schemas: BTreeMap<String, SchemaRecord>,
    /// Model name → verb → mounted view.
    pub views: BTreeMap<String, BTreeMap<Verb, MountedView>>,
}

impl CrudRegistry {
    pub fn view(&self, model: &str, verb: Verb) -> Option<&MountedView> {
        self.views.get(model)?.get(&verb)
    }
}

pub struct RouteRegistrar {
    options: RegistrarOptions,
    registry: CrudRegistry,
    routes: BTreeMap<String, MethodRouter>,
    mounted: BTreeSet<(String, String)>,
}

impl RouteRegistrar {
    pub fn new(options: RegistrarOptions) -> Self {
        Self {
            options,
            registry: CrudRegistry::default(),
            routes: BTreeMap::new(),
            mounted: BTreeSet::new(),
        }
    }

    pub fn registry(&self) -> &CrudRegistry {
        &self.registry
    }

    /// Mount every resource in `registration`. May be called repeatedly to
    /// add more registrations to the same router.
    pub fn register_crud_routes_for_models(&mut self, registration: &Registration) -> Result<(), RegistryError> {
        let catalog = Arc::new(registration.catalog());
        let shapes = Arc::new(registration.shapes());

        for resource in registration.resources() {
            let model = resource.model();
            let name = model.descriptor().name.clone();
            if !self.registry.models_registered_for_views.contains(&name) {
                self.registry.models_registered_for_views.push(name.clone());
            }

            self.populate_model_schema(&name, &catalog, registration);
            let schemas_registry = SchemaRegistry::snapshot(&self.registry.model_schemas);
            let default_input = model_input_schema(model.as_ref(), registration);
            let state = ViewState::new(Arc::clone(model), Arc::clone(&catalog), Arc::clone(&shapes));

            for verb in Verb::ALL {
                if resource.is_forbidden(verb) {
                    tracing::debug!(model = %name, verb = %verb, "view forbidden, not mounted");
                    continue;
                }
                self.mount_view(resource, verb, &state, &default_input, &schemas_registry)?;
            }
        }

        tracing::info!(
            models = registration.resources().len(),
            routes = self.mounted.len(),
            schemas = self.registry.model_schemas.len(),
            "registered CRUD routes"
        );
        Ok(())
    }

    /// Build the router and freeze the registry.
    pub fn into_router(mut self) -> (Router, Arc<CrudRegistry>) {
        let registry = Arc::new(std::mem::take(&mut self.registry));
        if self.options.register_schema_structure {
            self.mount_schema_structure(&registry);
        }
        let router = self
            .routes
            .into_iter()
            .fold(Router::new(), |router, (url, method_router)| router.route(&url, method_router));
        (router, registry)
    }

    /// Record `root` and every model reachable from it. A visited set keyed by
    /// model name keeps cyclic relationship graphs finite.
    fn populate_model_schema(&mut self, root: &str, catalog: &ModelCatalog, registration: &Registration) {
        let mut visited = HashSet::new();
        let mut pending = VecDeque::from([root.to_string()]);

        while let Some(name) = pending.pop_front() {
            if !visited.insert(name.clone()) || self.registry.model_schemas.contains_key(&name) {
                continue;
            }
            let Some(model) = catalog.get(&name) else {
                tracing::warn!(model = %name, "related model is not registered, no schema recorded");
                continue;
            };

            let input = model_input_schema(model.as_ref(), registration);
            self.registry.model_schemas.insert(
                name.clone(),
                SchemaRecord::Model {
                    input_schema: input.document,
                    output_schema: model.output_data_schema(),
                    accepted_data_structure: model.max_permissible_dict_structure(),
                },
            );

            let descriptor = model.descriptor();
            if let Some(spec) = &descriptor.polymorphic {
                for variant in &spec.variants {
                    self.registry
                        .model_schemas
                        .entry(variant.model.clone())
                        .or_insert_with(|| SchemaRecord::Variant {
                            is_a_polymorphically_derived_from: name.clone(),
                            polymorphic_identity: variant.identity.clone(),
                        });
                }
            }
            for rel in &descriptor.relationships {
                if !visited.contains(&rel.target) {
                    pending.push_back(rel.target.clone());
                }
            }
        }
    }

    fn mount_view(
        &mut self,
        resource: &ResourceConfig,
        verb: Verb,
        state: &ViewState,
        default_input: &InputSchema,
        schemas_registry: &SchemaRegistry,
    ) -> Result<(), RegistryError> {
        let descriptor = resource.model().descriptor();
        let config = resource.resolved_view(verb);
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| verb.default_url(resource.url_slug()));
        validate_url(&url, verb)?;

        let method = verb.method().to_string();
        let key = (url.clone(), method.clone());
        if self.mounted.contains(&key) {
            return Err(RegistryError::RouteConflict { method, url });
        }

        let schema = match &config.input_schema_modifier {
            Some(modify) => modify(default_input.clone()),
            None => default_input.clone(),
        };
        let router = match &config.view_func {
            Some(router) => router.clone(),
            None => self.construct_view(verb, state.clone(), &config, &descriptor.name, &schema, schemas_registry)?,
        };

        let merged = match self.routes.remove(&url) {
            Some(existing) => existing.merge(router),
            None => router,
        };
        self.routes.insert(url.clone(), merged);
        self.mounted.insert(key);

        let endpoint = format!("{}_{}", verb.as_str(), descriptor.table_name);
        tracing::debug!(endpoint = %endpoint, method = %method, url = %url, "mounted CRUD view");
        self.registry
            .views
            .entry(descriptor.name.clone())
            .or_default()
            .insert(
                verb,
                MountedView {
                    endpoint,
                    url,
                    method,
                    input_schema: config
                        .input_schema_modifier
                        .is_some()
                        .then(|| schema.document.clone()),
                },
            );
        Ok(())
    }

    fn construct_view(
        &self,
        verb: Verb,
        state: ViewState,
        config: &ViewConfig,
        model_name: &str,
        schema: &InputSchema,
        schemas_registry: &SchemaRegistry,
    ) -> Result<MethodRouter, RegistryError> {
        let validator =
            || SchemaValidator::compile(model_name, schema, schemas_registry, self.options.allow_unknown_fields);
        Ok(match verb {
            Verb::Index => construct_index_view_function(state, config),
            Verb::Get => construct_get_view_function(state, config),
            Verb::Delete => construct_delete_view_function(state, config),
            Verb::Post => construct_post_view_function(state, config, validator()?),
            Verb::Put => construct_put_view_function(state, config, validator()?),
            Verb::BatchPut => construct_batch_put_view_function(state, config, validator()?),
            Verb::Patch => construct_patch_view_function(state, config, validator()?),
        })
    }

    fn mount_schema_structure(&mut self, registry: &Arc<CrudRegistry>) {
        let url = self.options.schema_structure_url.clone();
        let key = (url.clone(), "GET".to_string());
        if self.mounted.contains(&key) {
            tracing::warn!(url = %url, "schema structure url is taken by a CRUD view, not mounted");
            return;
        }

        let snapshot = Arc::clone(registry);
        let router = get(move || {
            let snapshot = Arc::clone(&snapshot);
            async move { Json(CrudRegistry::clone(&snapshot)) }
        });
        let merged = match self.routes.remove(&url) {
            Some(existing) => existing.merge(router),
            None => router,
        };
        self.routes.insert(url, merged);
        self.mounted.insert(key);
    }
}

/// Build routes for `registration` on a fresh registrar.
///
/// # Example
/// ```rust,ignore
/// let (router, registry) = register_crud_routes_for_models(&registration, RegistrarOptions::default())?;
/// let app = Router::new().nest("/api", router);
/// ```
pub fn register_crud_routes_for_models(
    registration: &Registration,
    options: RegistrarOptions,
) -> Result<(Router, Arc<CrudRegistry>), RegistryError> {
    let mut registrar = RouteRegistrar::new(options);
    registrar.register_crud_routes_for_models(registration)?;
    Ok(registrar.into_router())
}

fn model_input_schema(model: &dyn ModelLayer, registration: &Registration) -> InputSchema {
    let schema = model.generate_input_data_schema();
    match registration.input_schema_modifier(&model.descriptor().name) {
        Some(modify) => modify(schema),
        None => schema,
    }
}

fn validate_url(url: &str, verb: Verb) -> Result<(), RegistryError> {
    let invalid = |reason: &str| RegistryError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };
    if !url.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    let params = url
        .split('/')
        .filter(|segment| segment.starts_with('{') && segment.ends_with('}'))
        .count();
    if verb.is_item_view() && params != 1 {
        return Err(invalid("item views need exactly one path parameter"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::errors::ApiError;
    use crate::model::{
        Fields, KeyKind, ListQuery, ModelDescriptor, Page, PolymorphicSpec, Record, RecordId,
        RelationshipDescriptor, Scope, UnitOfWork,
    };
    use async_trait::async_trait;
    use serde_json::json;

    /// Schema-only model; its data methods are never reached by these tests.
    struct StaticModel {
        descriptor: ModelDescriptor,
    }

    impl StaticModel {
        fn new(name: &str, table: &str) -> Self {
            Self {
                descriptor: ModelDescriptor::new(name, table, "id", KeyKind::Integer),
            }
        }

        fn with_relationship(mut self, rel: RelationshipDescriptor) -> Self {
            self.descriptor.relationships.push(rel);
            self
        }

        fn with_polymorphic(mut self, spec: PolymorphicSpec) -> Self {
            self.descriptor.polymorphic = Some(spec);
            self
        }
    }

    #[async_trait]
    impl ModelLayer for StaticModel {
        fn descriptor(&self) -> &ModelDescriptor {
            &self.descriptor
        }

        fn generate_input_data_schema(&self) -> InputSchema {
            InputSchema::new(json!({
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"]
            }))
        }

        fn output_data_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn get(&self, _scope: &Scope, _id: &RecordId) -> Result<Option<Record>, ApiError> {
            Ok(None)
        }

        async fn find_by(&self, _field: &str, _value: &Value) -> Result<Vec<Record>, ApiError> {
            Ok(Vec::new())
        }

        async fn list(&self, _query: &ListQuery) -> Result<Page, ApiError> {
            Ok(Page::default())
        }

        async fn create(&self, fields: Fields) -> Result<Record, ApiError> {
            Ok(Record::new(self.descriptor.name.clone(), fields))
        }

        async fn update(&self, _existing: &Record, fields: Fields) -> Result<Record, ApiError> {
            Ok(Record::new(self.descriptor.name.clone(), fields))
        }

        async fn begin(&self) -> Result<Box<dyn UnitOfWork>, ApiError> {
            Err(ApiError::internal("not supported", None))
        }

        async fn delete(&self, _existing: &Record) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn cyclic_registration() -> Registration {
        let authors = StaticModel::new("Author", "authors")
            .with_relationship(RelationshipDescriptor::many("articles", "Article", "id", "author_id"));
        let articles = StaticModel::new("Article", "articles")
            .with_relationship(RelationshipDescriptor::one("author", "Author", "author_id", "id"))
            .with_relationship(RelationshipDescriptor::many("tags", "Tag", "id", "article_id"))
            .with_polymorphic(PolymorphicSpec::new("kind").variant("NewsArticle", "news"));
        let tags = StaticModel::new("Tag", "tags")
            .with_relationship(RelationshipDescriptor::one("article", "Article", "article_id", "id"));
        Registration::new()
            .resource(ResourceConfig::new(Arc::new(authors), "authors"))
            .related_model(Arc::new(articles))
            .related_model(Arc::new(tags))
    }

    #[test]
    fn test_schema_population_terminates_on_cycles() {
        let mut registrar = RouteRegistrar::new(RegistrarOptions::default());
        registrar
            .register_crud_routes_for_models(&cyclic_registration())
            .unwrap();

        let names: Vec<_> = registrar.registry().model_schemas.keys().cloned().collect();
        assert_eq!(names, vec!["Article", "Author", "NewsArticle", "Tag"]);
        assert_eq!(
            registrar.registry().model_schemas["NewsArticle"],
            SchemaRecord::Variant {
                is_a_polymorphically_derived_from: "Article".to_string(),
                polymorphic_identity: "news".to_string(),
            }
        );
        assert_eq!(registrar.registry().models_registered_for_views, vec!["Author"]);
    }

    #[test]
    fn test_unknown_relationship_target_is_skipped() {
        let lonely = StaticModel::new("Author", "authors")
            .with_relationship(RelationshipDescriptor::many("awards", "Award", "id", "author_id"));
        let registration = Registration::new().resource(ResourceConfig::new(Arc::new(lonely), "authors"));
        let mut registrar = RouteRegistrar::new(RegistrarOptions::default());
        registrar.register_crud_routes_for_models(&registration).unwrap();
        assert!(registrar.registry().model_schemas.contains_key("Author"));
        assert!(!registrar.registry().model_schemas.contains_key("Award"));
    }

    #[test]
    fn test_endpoints_and_urls_recorded() {
        let mut registrar = RouteRegistrar::new(RegistrarOptions::default());
        registrar
            .register_crud_routes_for_models(&cyclic_registration())
            .unwrap();
        let registry = registrar.registry();

        let get = registry.view("Author", Verb::Get).unwrap();
        assert_eq!(get.endpoint, "get_authors");
        assert_eq!(get.url, "/authors/{id}");
        assert_eq!(get.method, "GET");
        assert_eq!(registry.view("Author", Verb::BatchPut).unwrap().url, "/authors");
        assert_eq!(registry.views["Author"].len(), Verb::ALL.len());
        assert!(get.input_schema.is_none());
    }

    #[test]
    fn test_forbidden_views_are_not_recorded() {
        let registration = Registration::new().resource(
            ResourceConfig::new(Arc::new(StaticModel::new("Author", "authors")), "authors")
                .forbid(Verb::Delete)
                .forbid(Verb::BatchPut),
        );
        let mut registrar = RouteRegistrar::new(RegistrarOptions::default());
        registrar.register_crud_routes_for_models(&registration).unwrap();
        assert!(registrar.registry().view("Author", Verb::Delete).is_none());
        assert!(registrar.registry().view("Author", Verb::BatchPut).is_none());
        assert!(registrar.registry().view("Author", Verb::Put).is_some());
    }

    #[test]
    fn test_modifiers_apply_and_view_schema_is_recorded() {
        let registration = Registration::new().resource(
            ResourceConfig::new(Arc::new(StaticModel::new("Author", "authors")), "authors")
                .input_schema_modifier(|mut schema| {
                    if let Some(properties) = schema.properties_mut() {
                        properties.insert("nickname".to_string(), json!({"type": "string"}));
                    }
                    schema
                })
                .view(
                    Verb::Post,
                    ViewConfig::new().input_schema_modifier(|mut schema| {
                        schema.document["required"] = json!(["name", "nickname"]);
                        schema
                    }),
                ),
        );
        let mut registrar = RouteRegistrar::new(RegistrarOptions::default());
        registrar.register_crud_routes_for_models(&registration).unwrap();
        let registry = registrar.registry();

        let recorded = registry.model_schemas["Author"].input_schema().unwrap();
        assert_eq!(recorded["properties"]["nickname"], json!({"type": "string"}));
        assert_eq!(recorded["required"], json!(["name"]));

        let post_schema = registry.view("Author", Verb::Post).unwrap().input_schema.clone().unwrap();
        assert_eq!(post_schema["required"], json!(["name", "nickname"]));
        assert_eq!(post_schema["properties"]["nickname"], json!({"type": "string"}));
    }

    #[test]
    fn test_registering_twice_conflicts_but_membership_is_idempotent() {
        let registration = cyclic_registration();
        let mut registrar = RouteRegistrar::new(RegistrarOptions::default());
        registrar.register_crud_routes_for_models(&registration).unwrap();
        let err = registrar.register_crud_routes_for_models(&registration).unwrap_err();
        assert!(matches!(err, RegistryError::RouteConflict { .. }));
        assert_eq!(registrar.registry().models_registered_for_views, vec!["Author"]);
    }

    #[test]
    fn test_item_url_override_needs_one_parameter() {
        let registration = Registration::new().resource(
            ResourceConfig::new(Arc::new(StaticModel::new("Author", "authors")), "authors")
                .view(Verb::Get, ViewConfig::new().url("/writers/all")),
        );
        let mut registrar = RouteRegistrar::new(RegistrarOptions::default());
        let err = registrar.register_crud_routes_for_models(&registration).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidUrl { .. }));
    }

    #[test]
    fn test_url_override_is_recorded() {
        let registration = Registration::new().resource(
            ResourceConfig::new(Arc::new(StaticModel::new("Author", "authors")), "authors")
                .view(Verb::Get, ViewConfig::new().url("/writers/{writer_id}")),
        );
        let mut registrar = RouteRegistrar::new(RegistrarOptions::default());
        registrar.register_crud_routes_for_models(&registration).unwrap();
        assert_eq!(
            registrar.registry().view("Author", Verb::Get).unwrap().url,
            "/writers/{writer_id}"
        );
    }

    #[test]
    fn test_invalid_schema_is_a_registration_error() {
        let registration = Registration::new().resource(
            ResourceConfig::new(Arc::new(StaticModel::new("Author", "authors")), "authors")
                .input_schema_modifier(|_| InputSchema::new(json!({"type": 12}))),
        );
        let mut registrar = RouteRegistrar::new(RegistrarOptions::default());
        let err = registrar.register_crud_routes_for_models(&registration).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSchema { .. }));
    }
}
