//! # crudmount
//!
//! Declarative CRUD route generation for axum. Describe each model once with a
//! [`ResourceConfig`], hand the [`Registration`] to
//! [`register_crud_routes_for_models`], and mount the returned router.
//!
//! ```rust,ignore
//! let authors = Arc::new(SeaOrmModel::<author::Entity>::new(db.clone(), "Author"));
//! let registration = Registration::new().resource(ResourceConfig::new(authors, "authors"));
//! let (router, registry) = register_crud_routes_for_models(&registration, RegistrarOptions::default())?;
//! ```

pub mod catalog;
pub mod config;
pub mod context;
pub mod dict_struct;
pub mod errors;
pub mod hooks;
pub mod model;
pub mod models;
pub mod orm;
pub mod pagination;
pub mod registry;
pub mod render;
pub mod response;
pub mod schema;
pub mod validation;
pub mod views;

pub use config::{Registration, RegistrarOptions, ResourceConfig, Verb, ViewConfig};
pub use context::RequestContext;
pub use dict_struct::DictStruct;
pub use errors::{ApiError, RegistryError};
pub use hooks::{BatchPostProcessor, ObjectGetter, PostProcessor, PreProcessor};
pub use model::{ModelLayer, Record, RecordId, RelationshipDescriptor, Scope};
pub use orm::SeaOrmModel;
pub use registry::{CrudRegistry, MountedView, RouteRegistrar, register_crud_routes_for_models};
pub use schema::InputSchema;
