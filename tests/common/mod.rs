#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use crudmount::model::PolymorphicSpec;
use crudmount::{
    DictStruct, Registration, RegistrarOptions, RelationshipDescriptor, ResourceConfig, SeaOrmModel,
    Verb, ViewConfig, register_crud_routes_for_models,
};
use sea_orm::{Database, DatabaseConnection, DbErr};
use sea_orm_migration::prelude::*;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub mod article_entity;
pub mod author_entity;

/// Route `tracing` output through the test harness; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    init_tracing();
    let db = Database::connect("sqlite::memory:").await?;

    // Run migrations
    Migrator::up(&db, None).await?;

    Ok(db)
}

pub fn author_model(db: &DatabaseConnection) -> Arc<SeaOrmModel<author_entity::Entity>> {
    Arc::new(
        SeaOrmModel::<author_entity::Entity>::new(db.clone(), "Author")
            .with_relationship(RelationshipDescriptor::many("articles", "Article", "id", "author_id")),
    )
}

pub fn article_model(db: &DatabaseConnection) -> Arc<SeaOrmModel<article_entity::Entity>> {
    Arc::new(
        SeaOrmModel::<article_entity::Entity>::new(db.clone(), "Article")
            .with_relationship(RelationshipDescriptor::one("author", "Author", "author_id", "id"))
            .with_polymorphic(
                PolymorphicSpec::new("kind")
                    .variant("NewsArticle", "news")
                    .variant("OpinionArticle", "opinion"),
            ),
    )
}

/// Authors expose every verb; `GET /authors/{id}` also expands articles.
/// Articles cannot be deleted.
pub fn default_registration(db: &DatabaseConnection) -> Registration {
    Registration::new()
        .resource(
            ResourceConfig::new(author_model(db), "authors").view(
                Verb::Get,
                ViewConfig::new().dict_struct(
                    DictStruct::all().rel("articles", DictStruct::attrs(["id", "title"])),
                ),
            ),
        )
        .resource(ResourceConfig::new(article_model(db), "articles").forbid(Verb::Delete))
}

pub fn mount(registration: &Registration) -> Router {
    let (api, _registry) = register_crud_routes_for_models(registration, RegistrarOptions::default())
        .expect("registration should succeed");
    Router::new().nest("/api/v1", api)
}

pub fn setup_test_app(db: &DatabaseConnection) -> Router {
    mount(&default_registration(db))
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> TestResponse {
    send_with_headers(app, method, uri, body, &[]).await
}

pub async fn send_with_headers(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> TestResponse {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder
        .body(match body {
            Some(body) => Body::from(serde_json::to_string(&body).unwrap()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    TestResponse { status, headers, body }
}

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(CreateAuthorTable), Box::new(CreateArticleTable)]
    }
}

pub struct CreateAuthorTable;

#[async_trait::async_trait]
impl MigrationName for CreateAuthorTable {
    fn name(&self) -> &'static str {
        "m20240101_000001_create_author_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for CreateAuthorTable {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let table = Table::create()
            .table(AuthorEntity)
            .if_not_exists()
            .col(
                ColumnDef::new(AuthorColumn::Id)
                    .integer()
                    .not_null()
                    .auto_increment()
                    .primary_key(),
            )
            .col(ColumnDef::new(AuthorColumn::Name).string().not_null())
            .col(ColumnDef::new(AuthorColumn::Bio).text().null())
            .to_owned();

        manager.create_table(table).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuthorEntity).to_owned())
            .await?;
        Ok(())
    }
}

pub struct CreateArticleTable;

#[async_trait::async_trait]
impl MigrationName for CreateArticleTable {
    fn name(&self) -> &'static str {
        "m20240101_000002_create_article_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for CreateArticleTable {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let table = Table::create()
            .table(ArticleEntity)
            .if_not_exists()
            .col(
                ColumnDef::new(ArticleColumn::Id)
                    .integer()
                    .not_null()
                    .auto_increment()
                    .primary_key(),
            )
            .col(ColumnDef::new(ArticleColumn::Title).string().not_null())
            .col(ColumnDef::new(ArticleColumn::Kind).string().not_null())
            .col(ColumnDef::new(ArticleColumn::AuthorId).integer().not_null())
            .col(
                ColumnDef::new(ArticleColumn::WordCount)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .to_owned();

        manager.create_table(table).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ArticleEntity).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum AuthorColumn {
    Id,
    Name,
    Bio,
}

impl Iden for AuthorColumn {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(
            s,
            "{}",
            match self {
                Self::Id => "id",
                Self::Name => "name",
                Self::Bio => "bio",
            }
        )
        .unwrap();
    }
}

#[derive(Debug)]
pub struct AuthorEntity;

impl Iden for AuthorEntity {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "authors").unwrap();
    }
}

#[derive(Debug)]
pub enum ArticleColumn {
    Id,
    Title,
    Kind,
    AuthorId,
    WordCount,
}

impl Iden for ArticleColumn {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(
            s,
            "{}",
            match self {
                Self::Id => "id",
                Self::Title => "title",
                Self::Kind => "kind",
                Self::AuthorId => "author_id",
                Self::WordCount => "word_count",
            }
        )
        .unwrap();
    }
}

#[derive(Debug)]
pub struct ArticleEntity;

impl Iden for ArticleEntity {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "articles").unwrap();
    }
}
