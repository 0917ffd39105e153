//! # Error handling for generated CRUD routes
//!
//! Every handler built by this crate returns `Result<Response, ApiError>`. An
//! `ApiError` renders as the failure envelope
//!
//! ```json
//! {"status": "failure", "error": "..."}
//! ```
//!
//! with a matching HTTP status code. Validation failures carry structured
//! per-field errors in `error` instead of a string.
//!
//! Database errors and internal details are logged with `tracing` and never
//! sent to clients. Hooks and pre-validation adapters short-circuit a request
//! by returning an `ApiError`; use [`ApiError::custom`] when a status code
//! outside the predefined set is needed.
//!
//! Build-time problems (bad URLs, conflicting routes, schemas that do not
//! compile) are reported separately as [`RegistryError`].

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde_json::{Value, json};
use std::fmt;

use crate::validation::FieldErrors;

/// API error type with automatic logging and sanitized responses
#[derive(Debug)]
pub enum ApiError {
    /// 404 Not Found - Resource doesn't exist
    NotFound {
        /// Model name (e.g., "Author")
        resource: String,
        /// Identifier that wasn't found, as received
        id: Option<String>,
    },

    /// 400 Bad Request - Malformed input
    BadRequest { message: String },

    /// 401 Unauthorized - Authentication required or failed
    Unauthorized { message: String },

    /// 403 Forbidden - Caller lacks permission
    Forbidden { message: String },

    /// 409 Conflict - Resource conflict (e.g., duplicate key)
    Conflict { message: String },

    /// 400 Bad Request - Payload rejected by the input schema
    ValidationFailed {
        /// Field name → messages
        errors: FieldErrors,
    },

    /// 500 Internal Server Error - Database error (details logged, not exposed)
    Database {
        message: String,
        /// Internal error (logged, not sent to user)
        internal: DbErr,
    },

    /// 500 Internal Server Error - Generic internal error
    Internal {
        message: String,
        /// Internal error details (logged, not sent to user)
        internal: Option<String>,
    },

    /// Custom error with specific status code
    Custom {
        status: StatusCode,
        message: String,
        /// Internal error details (logged, not sent to user)
        internal: Option<String>,
    },
}

impl ApiError {
    /// Create a 404 Not Found error
    ///
    /// # Example
    /// ```rust,ignore
    /// return Err(ApiError::not_found("Author", Some(raw_id.to_string())));
    /// ```
    pub fn not_found(resource: impl Into<String>, id: Option<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id,
        }
    }

    /// Create a 400 Bad Request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a 401 Unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a 403 Forbidden error
    ///
    /// # Example
    /// ```rust,ignore
    /// // inside a pre-processor
    /// if ctx.header("x-role") != Some("editor") {
    ///     return Err(ApiError::forbidden("Editors only"));
    /// }
    /// ```
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Create a 409 Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a 400 validation error from per-field messages
    pub fn validation_failed(errors: FieldErrors) -> Self {
        Self::ValidationFailed { errors }
    }

    /// Create a 500 Internal Server Error from a database error
    ///
    /// The database error details are logged but NOT sent to the user.
    ///
    /// # Example
    /// ```rust,ignore
    /// let model = active.insert(db).await.map_err(ApiError::database)?;
    /// ```
    pub fn database(err: DbErr) -> Self {
        Self::Database {
            message: "A database error occurred".to_string(),
            internal: err,
        }
    }

    /// Create a 500 Internal Server Error with optional details
    pub fn internal(message: impl Into<String>, internal: Option<String>) -> Self {
        Self::Internal {
            message: message.into(),
            internal,
        }
    }

    /// Create a custom error with specific status code
    ///
    /// # Example
    /// ```rust,ignore
    /// return Err(ApiError::custom(
    ///     StatusCode::TOO_MANY_REQUESTS,
    ///     "Rate limit exceeded",
    ///     None
    /// ));
    /// ```
    pub fn custom(status: StatusCode, message: impl Into<String>, internal: Option<String>) -> Self {
        Self::Custom {
            status,
            message: message.into(),
            internal,
        }
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest { .. } | Self::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Database { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Custom { status, .. } => *status,
        }
    }

    /// Get the user-facing error message (sanitized)
    fn user_message(&self) -> String {
        match self {
            Self::NotFound { resource, id } => match id {
                Some(id) => format!("{resource} with ID '{id}' not found"),
                None => format!("{resource} not found"),
            },
            Self::ValidationFailed { .. } => "Validation failed".to_string(),
            Self::BadRequest { message }
            | Self::Unauthorized { message }
            | Self::Forbidden { message }
            | Self::Conflict { message }
            | Self::Database { message, .. }
            | Self::Internal { message, .. }
            | Self::Custom { message, .. } => message.clone(),
        }
    }

    /// The value placed under `error` in a failure envelope.
    ///
    /// Batch views use this for per-item failures so that an item error looks
    /// exactly like the body a single-item request would have produced.
    #[must_use]
    pub fn client_error(&self) -> Value {
        match self {
            Self::ValidationFailed { errors } => json!(errors),
            _ => Value::String(self.user_message()),
        }
    }

    /// Log internal error details (not sent to user)
    ///
    /// Uses the `tracing` crate - only logs if a subscriber is installed.
    pub(crate) fn log_internal(&self) {
        match self {
            Self::Database { internal, .. } => {
                tracing::error!(error = ?internal, "Database error occurred");
            }
            Self::Internal {
                internal: Some(details),
                ..
            } => {
                tracing::error!(details = %details, "Internal error occurred");
            }
            Self::Custom {
                internal: Some(details),
                status,
                ..
            } => {
                tracing::error!(status = %status, details = %details, "Custom error occurred");
            }
            _ => {
                tracing::debug!(
                    error = %self.user_message(),
                    status = %self.status_code(),
                    "API error"
                );
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log_internal();

        let body = json!({
            "status": "failure",
            "error": self.client_error(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for ApiError {}

/// Convert Sea-ORM `DbErr` to `ApiError`
///
/// - `DbErr::RecordNotFound` and `DbErr::RecordNotUpdated` → 404 Not Found
/// - All other variants → 500 Internal Server Error (logged, sanitized)
impl From<DbErr> for ApiError {
    fn from(err: DbErr) -> Self {
        match &err {
            DbErr::RecordNotFound(msg) => {
                let resource = msg.split_whitespace().next().unwrap_or("Resource");
                Self::NotFound {
                    resource: resource.to_string(),
                    id: None,
                }
            }
            DbErr::RecordNotUpdated => Self::NotFound {
                resource: "Resource".to_string(),
                id: None,
            },
            _ => Self::database(err),
        }
    }
}

/// Errors raised while building routes from a registration table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A URL that axum cannot mount, or an item URL without exactly one path parameter
    InvalidUrl { url: String, reason: String },
    /// Two views claim the same method on the same URL
    RouteConflict { method: String, url: String },
    /// An input schema (after modifiers) is not a valid JSON Schema document
    InvalidSchema { model: String, message: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl { url, reason } => write!(f, "invalid url '{url}': {reason}"),
            Self::RouteConflict { method, url } => {
                write!(f, "{method} {url} is already mounted")
            }
            Self::InvalidSchema { model, message } => {
                write!(f, "input schema for {model} does not compile: {message}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_not_found_with_id() {
        let err = ApiError::not_found("Author", Some("123".to_string()));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.user_message(), "Author with ID '123' not found");
    }

    #[test]
    fn test_not_found_without_id() {
        let err = ApiError::not_found("Author", None);
        assert_eq!(err.user_message(), "Author not found");
    }

    #[test]
    fn test_validation_failed_is_bad_request_with_field_map() {
        let mut errors = BTreeMap::new();
        errors.insert("title".to_string(), vec!["is required".to_string()]);
        let err = ApiError::validation_failed(errors);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.client_error(), json!({"title": ["is required"]}));
    }

    #[test]
    fn test_database_error_is_sanitized() {
        let err = ApiError::database(DbErr::Type("Type mismatch error".to_string()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.client_error(), json!("A database error occurred"));
    }

    #[test]
    fn test_custom_error_keeps_status() {
        let err = ApiError::custom(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded",
            Some("100 req/min".to_string()),
        );
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.user_message(), "Rate limit exceeded");
    }

    #[test]
    fn test_dberr_conversions() {
        let api_err: ApiError = DbErr::RecordNotFound("Author not found".to_string()).into();
        assert_eq!(api_err.status_code(), StatusCode::NOT_FOUND);

        let api_err: ApiError = DbErr::RecordNotUpdated.into();
        assert_eq!(api_err.status_code(), StatusCode::NOT_FOUND);

        for db_err in [
            DbErr::Custom("Any custom error".to_string()),
            DbErr::Type("Type error".to_string()),
            DbErr::Json("JSON error".to_string()),
        ] {
            let api_err: ApiError = db_err.into();
            assert_eq!(api_err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(api_err.user_message(), "A database error occurred");
        }
    }

    #[tokio::test]
    async fn test_into_response_uses_failure_envelope() {
        let response = ApiError::forbidden("Editors only").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"status": "failure", "error": "Editors only"}));
    }

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::RouteConflict {
            method: "GET".to_string(),
            url: "/authors".to_string(),
        };
        assert_eq!(err.to_string(), "GET /authors is already mounted");
    }
}
