//! # Sea-ORM backed model layer
//!
//! [`SeaOrmModel`] implements [`ModelLayer`] for any Sea-ORM entity whose
//! `Model` derives `Serialize` and `Deserialize`. Records cross the boundary as
//! JSON: reads serialize typed models, writes convert each payload field to a
//! typed column value and set it on an `ActiveModel`, so columns missing from
//! a payload stay `NotSet` (create) or unchanged (update).
//!
//! ```rust,ignore
//! let authors = SeaOrmModel::<author::Entity>::new(db.clone(), "Author")
//!     .with_relationship(RelationshipDescriptor::many("articles", "Article", "id", "author_id"));
//! ```
//!
//! The generated input schema maps column types to JSON Schema types; nullable
//! columns accept `null`; every non-null column except an auto-increment
//! primary key is required on create.

use async_trait::async_trait;
use sea_orm::sea_query::SimpleExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ColumnType, Condition, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, DbErr, EntityTrait, IdenStatic, IntoActiveModel, Iterable, PaginatorTrait,
    PrimaryKeyToColumn, PrimaryKeyTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    TryIntoModel,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::marker::PhantomData;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::model::{
    Fields, KeyKind, ListQuery, ModelDescriptor, ModelLayer, Page, PolymorphicSpec, Record, RecordId,
    RelationshipDescriptor, Scope, SortOrder, UnitOfWork,
};
use crate::schema::InputSchema;

pub struct SeaOrmModel<E> {
    db: DatabaseConnection,
    descriptor: ModelDescriptor,
    entity: PhantomData<fn() -> E>,
}

impl<E: EntityTrait> SeaOrmModel<E> {
    /// `name` is the model name used in the registry, relationships and `_ret`.
    pub fn new(db: DatabaseConnection, name: impl Into<String>) -> Self {
        let (primary_key, key_kind) = primary_key_column::<E>()
            .map_or_else(|| (String::new(), KeyKind::Text), |col| (col.as_str().to_string(), key_kind_of(&col)));
        let table_name = E::default().table_name().to_string();
        Self {
            db,
            descriptor: ModelDescriptor::new(name, table_name, primary_key, key_kind),
            entity: PhantomData,
        }
    }

    #[must_use]
    pub fn with_relationship(mut self, relationship: RelationshipDescriptor) -> Self {
        self.descriptor.relationships.push(relationship);
        self
    }

    #[must_use]
    pub fn with_polymorphic(mut self, spec: PolymorphicSpec) -> Self {
        self.descriptor.polymorphic = Some(spec);
        self
    }

    fn pk_column(&self) -> Result<E::Column, ApiError> {
        primary_key_column::<E>().ok_or_else(|| {
            ApiError::internal(
                "Model has no primary key",
                Some(format!("entity for '{}' declares no primary key", self.descriptor.name)),
            )
        })
    }
}

impl<E> SeaOrmModel<E>
where
    E: EntityTrait,
    E::Model: Serialize + DeserializeOwned + IntoActiveModel<E::ActiveModel> + Sync,
    E::ActiveModel: TryIntoModel<E::Model> + Send + Sync,
{
    async fn fetch(&self, condition: Condition) -> Result<Vec<Record>, ApiError> {
        let models = E::find()
            .filter(condition)
            .all(&self.db)
            .await
            .map_err(ApiError::database)?;
        models
            .iter()
            .map(|model| to_record::<E>(&self.descriptor.name, model))
            .collect()
    }

    fn key_condition(&self, id: &RecordId) -> Result<SimpleExpr, ApiError> {
        let pk = self.pk_column()?;
        Ok(match id {
            RecordId::Int(n) => pk.eq(*n),
            RecordId::Uuid(u) => pk.eq(*u),
            RecordId::Text(s) => pk.eq(s.clone()),
        })
    }
}

#[async_trait]
impl<E> ModelLayer for SeaOrmModel<E>
where
    E: EntityTrait,
    E::Model: Serialize + DeserializeOwned + IntoActiveModel<E::ActiveModel> + Sync,
    E::ActiveModel: TryIntoModel<E::Model> + Send + Sync,
{
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    fn generate_input_data_schema(&self) -> InputSchema {
        let auto_increment = <E::PrimaryKey as PrimaryKeyTrait>::auto_increment();
        let polymorphic = self.descriptor.polymorphic.as_ref();
        let mut properties = Map::new();
        let mut required = Vec::new();

        for col in E::Column::iter() {
            let def = col.def();
            let name = col.as_str();
            let mut property = column_schema(def.get_column_type(), def.is_null());

            if let Some(spec) = polymorphic.filter(|spec| spec.discriminator == name) {
                let mut identities: Vec<Value> = spec.identities().into_iter().map(Value::String).collect();
                if !identities.is_empty() {
                    if def.is_null() {
                        identities.push(Value::Null);
                    }
                    property["enum"] = Value::Array(identities);
                }
            }
            properties.insert(name.to_string(), property);

            let generated_key = auto_increment && name == self.descriptor.primary_key;
            if !def.is_null() && !generated_key {
                required.push(Value::String(name.to_string()));
            }
        }

        let schema = InputSchema::new(json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }));
        match polymorphic {
            Some(spec) => schema.polymorphic_on(spec.discriminator.clone()),
            None => schema,
        }
    }

    fn output_data_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for col in E::Column::iter() {
            let def = col.def();
            properties.insert(col.as_str().to_string(), column_schema(def.get_column_type(), def.is_null()));
            required.push(Value::String(col.as_str().to_string()));
        }
        json!({"type": "object", "properties": properties, "required": required})
    }

    async fn get(&self, scope: &Scope, id: &RecordId) -> Result<Option<Record>, ApiError> {
        let condition = scope_condition::<E>(scope)?.add(self.key_condition(id)?);
        Ok(self.fetch(condition).await?.into_iter().next())
    }

    async fn get_all(&self, scope: &Scope, ids: &[RecordId]) -> Result<Vec<Option<Record>>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut any = Condition::any();
        for id in ids {
            any = any.add(self.key_condition(id)?);
        }
        let condition = scope_condition::<E>(scope)?.add(any);

        let by_id: HashMap<RecordId, Record> = self
            .fetch(condition)
            .await?
            .into_iter()
            .filter_map(|record| Some((record.id(&self.descriptor)?, record)))
            .collect();
        Ok(ids.iter().map(|id| by_id.get(id).cloned()).collect())
    }

    async fn find_by(&self, field: &str, value: &Value) -> Result<Vec<Record>, ApiError> {
        let col = column_by_name::<E>(field).ok_or_else(|| unknown_column(&self.descriptor.name, field))?;
        self.fetch(Condition::all().add(equals(col, value))).await
    }

    async fn list(&self, query: &ListQuery) -> Result<Page, ApiError> {
        let mut select = E::find().filter(scope_condition::<E>(&query.scope)?);
        let total = select
            .clone()
            .count(&self.db)
            .await
            .map_err(ApiError::database)?;

        select = match &query.sort {
            Some((field, order)) => {
                let col = column_by_name::<E>(field)
                    .ok_or_else(|| ApiError::bad_request(format!("Cannot sort by unknown field '{field}'")))?;
                match order {
                    SortOrder::Asc => select.order_by_asc(col),
                    SortOrder::Desc => select.order_by_desc(col),
                }
            }
            None => match primary_key_column::<E>() {
                Some(pk) => select.order_by_asc(pk),
                None => select,
            },
        };
        match (query.limit, query.offset) {
            (Some(limit), offset) => select = select.limit(limit).offset(offset),
            (None, 0) => {}
            // OFFSET needs a LIMIT on some backends.
            (None, offset) => select = select.limit(i64::MAX.unsigned_abs()).offset(offset),
        }

        let models = select.all(&self.db).await.map_err(ApiError::database)?;
        let items = models
            .iter()
            .map(|model| to_record::<E>(&self.descriptor.name, model))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page { items, total })
    }

    async fn create(&self, fields: Fields) -> Result<Record, ApiError> {
        let mut active = <E::ActiveModel as ActiveModelTrait>::default();
        apply_fields::<E>(&mut active, &fields, false)?;
        let model = active.insert(&self.db).await.map_err(ApiError::database)?;
        to_record::<E>(&self.descriptor.name, &model)
    }

    async fn update(&self, existing: &Record, fields: Fields) -> Result<Record, ApiError> {
        update_record::<E, _>(&self.db, &self.descriptor.name, existing, fields).await
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, ApiError> {
        let txn = self.db.begin().await.map_err(ApiError::database)?;
        Ok(Box::new(SeaOrmUnitOfWork::<E> {
            txn: Some(txn),
            model_name: self.descriptor.name.clone(),
            entity: PhantomData,
        }))
    }

    async fn delete(&self, existing: &Record) -> Result<(), ApiError> {
        let id = existing
            .id(&self.descriptor)
            .ok_or_else(|| ApiError::internal("Record has no usable primary key", None))?;
        let result = E::delete_many()
            .filter(self.key_condition(&id)?)
            .exec(&self.db)
            .await
            .map_err(ApiError::database)?;
        if result.rows_affected == 0 {
            return Err(ApiError::not_found(self.descriptor.name.clone(), Some(id.to_string())));
        }
        Ok(())
    }
}

/// A database transaction; updates become visible on `commit`.
pub struct SeaOrmUnitOfWork<E> {
    txn: Option<DatabaseTransaction>,
    model_name: String,
    entity: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E> UnitOfWork for SeaOrmUnitOfWork<E>
where
    E: EntityTrait,
    E::Model: Serialize + DeserializeOwned + IntoActiveModel<E::ActiveModel> + Sync,
    E::ActiveModel: TryIntoModel<E::Model> + Send + Sync,
{
    async fn update_without_commit(&mut self, existing: &Record, fields: Fields) -> Result<Record, ApiError> {
        let txn = self
            .txn
            .as_ref()
            .ok_or_else(|| ApiError::internal("Unit of work already committed", None))?;
        // Each item gets its own savepoint so a failed statement cannot poison
        // the outer transaction on backends that abort it (PostgreSQL).
        let savepoint = txn.begin().await.map_err(ApiError::database)?;
        let updated = update_record::<E, _>(&savepoint, &self.model_name, existing, fields).await;
        match updated {
            Ok(record) => {
                savepoint.commit().await.map_err(ApiError::database)?;
                Ok(record)
            }
            Err(error) => {
                if let Err(rollback) = savepoint.rollback().await {
                    tracing::warn!(model = %self.model_name, error = %rollback, "savepoint rollback failed");
                }
                Err(error)
            }
        }
    }

    async fn commit(&mut self) -> Result<(), ApiError> {
        match self.txn.take() {
            Some(txn) => txn.commit().await.map_err(ApiError::database),
            None => Ok(()),
        }
    }
}

async fn update_record<E, C>(conn: &C, model_name: &str, existing: &Record, fields: Fields) -> Result<Record, ApiError>
where
    E: EntityTrait,
    E::Model: Serialize + DeserializeOwned + IntoActiveModel<E::ActiveModel> + Sync,
    E::ActiveModel: TryIntoModel<E::Model> + Send + Sync,
    C: ConnectionTrait,
{
    let current: E::Model = serde_json::from_value(Value::Object(existing.fields().clone()))
        .map_err(|e| ApiError::internal("Stored record could not be decoded", Some(e.to_string())))?;
    let mut active = current.into_active_model();
    apply_fields::<E>(&mut active, &fields, true)?;
    let model = active.update(conn).await.map_err(ApiError::database)?;
    to_record::<E>(model_name, &model)
}

/// Set every column named in `fields`; other columns keep their state.
/// With `skip_primary_key` the key is left alone so an update cannot retarget
/// its own `WHERE` clause.
fn apply_fields<E: EntityTrait>(active: &mut E::ActiveModel, fields: &Fields, skip_primary_key: bool) -> Result<(), ApiError> {
    let primary_key_col = primary_key_column::<E>();
    let primary_key = primary_key_col.as_ref().map(|col| col.as_str());
    for col in E::Column::iter() {
        let name = col.as_str();
        let Some(raw) = fields.get(name) else {
            continue;
        };
        if skip_primary_key && primary_key == Some(name) {
            continue;
        }
        let value = column_value(name, col.def().get_column_type(), raw)?;
        active.try_set(col, value).map_err(|e| match e {
            DbErr::Type(detail) => ApiError::bad_request(format!("'{name}' has an unsupported value: {detail}")),
            other => ApiError::database(other),
        })?;
    }
    Ok(())
}

/// Convert a JSON payload value into the database value a column of
/// `column_type` stores. `null` becomes the typed null of the column.
fn column_value(name: &str, column_type: &ColumnType, raw: &Value) -> Result<sea_orm::Value, ApiError> {
    use sea_orm::Value as Db;

    let mismatch = |expected: &str| ApiError::bad_request(format!("'{name}' must be {expected}"));
    let integer = |raw: &Value| raw.as_i64().ok_or_else(|| mismatch("an integer"));
    let unsigned = |raw: &Value| raw.as_u64().ok_or_else(|| mismatch("a non-negative integer"));
    let out_of_range = |_: std::num::TryFromIntError| mismatch("an integer in range");
    let is_null = raw.is_null();

    Ok(match column_type {
        ColumnType::TinyInteger if is_null => Db::TinyInt(None),
        ColumnType::TinyInteger => Db::TinyInt(Some(i8::try_from(integer(raw)?).map_err(out_of_range)?)),
        ColumnType::SmallInteger if is_null => Db::SmallInt(None),
        ColumnType::SmallInteger => Db::SmallInt(Some(i16::try_from(integer(raw)?).map_err(out_of_range)?)),
        ColumnType::Integer if is_null => Db::Int(None),
        ColumnType::Integer => Db::Int(Some(i32::try_from(integer(raw)?).map_err(out_of_range)?)),
        ColumnType::BigInteger if is_null => Db::BigInt(None),
        ColumnType::BigInteger => Db::BigInt(Some(integer(raw)?)),
        ColumnType::TinyUnsigned if is_null => Db::TinyUnsigned(None),
        ColumnType::TinyUnsigned => Db::TinyUnsigned(Some(u8::try_from(unsigned(raw)?).map_err(out_of_range)?)),
        ColumnType::SmallUnsigned if is_null => Db::SmallUnsigned(None),
        ColumnType::SmallUnsigned => Db::SmallUnsigned(Some(u16::try_from(unsigned(raw)?).map_err(out_of_range)?)),
        ColumnType::Unsigned if is_null => Db::Unsigned(None),
        ColumnType::Unsigned => Db::Unsigned(Some(u32::try_from(unsigned(raw)?).map_err(out_of_range)?)),
        ColumnType::BigUnsigned if is_null => Db::BigUnsigned(None),
        ColumnType::BigUnsigned => Db::BigUnsigned(Some(unsigned(raw)?)),
        ColumnType::Float => Db::Float(raw.as_f64().map(narrow)),
        ColumnType::Double | ColumnType::Decimal(_) | ColumnType::Money(_) => Db::Double(raw.as_f64()),
        ColumnType::Boolean if is_null => Db::Bool(None),
        ColumnType::Boolean => Db::Bool(Some(raw.as_bool().ok_or_else(|| mismatch("a boolean"))?)),
        ColumnType::Json | ColumnType::JsonBinary if is_null => Db::Json(None),
        ColumnType::Json | ColumnType::JsonBinary => Db::Json(Some(Box::new(raw.clone()))),
        ColumnType::Uuid if is_null => Db::Uuid(None),
        ColumnType::Uuid => {
            let text = raw.as_str().ok_or_else(|| mismatch("a UUID string"))?;
            Db::Uuid(Some(Box::new(Uuid::parse_str(text).map_err(|_| mismatch("a UUID string"))?)))
        }
        _ if is_null => Db::String(None),
        _ => match raw {
            Value::String(text) => Db::String(Some(Box::new(text.clone()))),
            _ => return Err(mismatch("a string")),
        },
    })
}

#[allow(clippy::cast_possible_truncation)]
fn narrow(value: f64) -> f32 {
    value as f32
}

fn to_record<E>(model_name: &str, model: &E::Model) -> Result<Record, ApiError>
where
    E: EntityTrait,
    E::Model: Serialize,
{
    match serde_json::to_value(model) {
        Ok(Value::Object(fields)) => Ok(Record::new(model_name, fields)),
        Ok(other) => Err(ApiError::internal(
            "Record did not serialize to an object",
            Some(format!("{model_name}: {other}")),
        )),
        Err(e) => Err(ApiError::internal("Record could not be serialized", Some(e.to_string()))),
    }
}

fn primary_key_column<E: EntityTrait>() -> Option<E::Column> {
    E::PrimaryKey::iter().next().map(PrimaryKeyToColumn::into_column)
}

fn column_by_name<E: EntityTrait>(name: &str) -> Option<E::Column> {
    E::Column::iter().find(|col| col.as_str() == name)
}

fn unknown_column(model: &str, field: &str) -> ApiError {
    ApiError::internal(
        "Unknown field",
        Some(format!("'{model}' has no column '{field}'")),
    )
}

fn key_kind_of<C: ColumnTrait>(col: &C) -> KeyKind {
    match col.def().get_column_type() {
        ColumnType::TinyInteger
        | ColumnType::SmallInteger
        | ColumnType::Integer
        | ColumnType::BigInteger
        | ColumnType::TinyUnsigned
        | ColumnType::SmallUnsigned
        | ColumnType::Unsigned
        | ColumnType::BigUnsigned => KeyKind::Integer,
        ColumnType::Uuid => KeyKind::Uuid,
        _ => KeyKind::Text,
    }
}

/// JSON Schema fragment for one column.
fn column_schema(column_type: &ColumnType, nullable: bool) -> Value {
    let json_type = match column_type {
        ColumnType::TinyInteger
        | ColumnType::SmallInteger
        | ColumnType::Integer
        | ColumnType::BigInteger
        | ColumnType::TinyUnsigned
        | ColumnType::SmallUnsigned
        | ColumnType::Unsigned
        | ColumnType::BigUnsigned => Some("integer"),
        ColumnType::Float | ColumnType::Double | ColumnType::Decimal(_) | ColumnType::Money(_) => {
            Some("number")
        }
        ColumnType::Boolean => Some("boolean"),
        ColumnType::Array(_) => Some("array"),
        ColumnType::Json | ColumnType::JsonBinary => None,
        _ => Some("string"),
    };

    let mut schema = match (json_type, nullable) {
        (Some(t), false) => json!({"type": t}),
        (Some(t), true) => json!({"type": [t, "null"]}),
        (None, _) => json!({}),
    };
    if matches!(column_type, ColumnType::Uuid) {
        schema["format"] = Value::String("uuid".to_string());
    }
    schema
}

/// Equality between a column and a JSON value.
fn equals<C: ColumnTrait>(col: C, value: &Value) -> SimpleExpr {
    let is_uuid = matches!(col.def().get_column_type(), ColumnType::Uuid);
    match value {
        Value::Null => col.is_null(),
        Value::Bool(b) => col.eq(*b),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => col.eq(i),
            (None, Some(f)) => col.eq(f),
            (None, None) => col.eq(n.to_string()),
        },
        Value::String(s) => match Uuid::parse_str(s) {
            Ok(uuid) if is_uuid => col.eq(uuid),
            _ => col.eq(s.clone()),
        },
        other => col.eq(other.clone()),
    }
}

fn scope_condition<E: EntityTrait>(scope: &Scope) -> Result<Condition, ApiError> {
    let mut condition = Condition::all();
    for (field, value) in scope.filters() {
        let col = column_by_name::<E>(field)
            .ok_or_else(|| unknown_column(E::default().table_name(), field))?;
        condition = condition.add(equals(col, value));
    }
    Ok(condition)
}
