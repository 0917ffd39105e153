use axum::{
    Json,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

/// Per-item error text for identifiers that resolve to nothing.
pub const RESOURCE_NOT_FOUND: &str = "Resource not found";

/// Envelope status; batch operations aggregate it over their items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    PartialSuccess,
    Failure,
}

impl Status {
    /// `Success` when every item succeeded (or there were none), `Failure` when
    /// none did, `PartialSuccess` otherwise.
    pub fn aggregate<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let (mut succeeded, mut failed) = (0usize, 0usize);
        for ok in outcomes {
            if ok {
                succeeded += 1;
            } else {
                failed += 1;
            }
        }
        match (succeeded, failed) {
            (_, 0) => Self::Success,
            (0, _) => Self::Failure,
            _ => Self::PartialSuccess,
        }
    }
}

/// The outcome of one item inside a batch response.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Success(Value),
    Failure(Value),
}

impl ItemOutcome {
    pub fn not_found() -> Self {
        Self::Failure(Value::String(RESOURCE_NOT_FOUND.to_string()))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn into_json(self) -> Value {
        match self {
            Self::Success(result) => json!({"status": Status::Success, "result": result}),
            Self::Failure(error) => json!({"status": Status::Failure, "error": error}),
        }
    }
}

/// `{"status": "success"}` with no result.
pub fn success_json() -> Response {
    Json(json!({"status": Status::Success})).into_response()
}

/// `{"status": "success", "result": ...}`
pub fn success_result(result: Value) -> Response {
    envelope(Status::Success, result)
}

pub fn envelope(status: Status, result: Value) -> Response {
    Json(json!({"status": status, "result": result})).into_response()
}

/// Aggregate a list of outcomes into `{"status", "result": [..]}`, keeping input order.
pub fn list_envelope(outcomes: Vec<ItemOutcome>) -> Response {
    let status = Status::aggregate(outcomes.iter().map(ItemOutcome::is_success));
    let result = outcomes.into_iter().map(ItemOutcome::into_json).collect();
    envelope(status, Value::Array(result))
}

/// Aggregate keyed outcomes into `{"status", "result": {key: ..}}`, keeping input order.
pub fn keyed_envelope(outcomes: Vec<(String, ItemOutcome)>) -> Response {
    let status = Status::aggregate(outcomes.iter().map(|(_, outcome)| outcome.is_success()));
    let result = outcomes
        .into_iter()
        .map(|(key, outcome)| (key, outcome.into_json()))
        .collect::<serde_json::Map<_, _>>();
    envelope(status, Value::Object(result))
}

/// Index listing with its total and optional pagination headers.
pub fn listing(items: Vec<Value>, total: u64, headers: HeaderMap) -> Response {
    let body = json!({"status": Status::Success, "result": items, "total": total});
    (headers, Json(body)).into_response()
}
