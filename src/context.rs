use axum::{
    extract::{FromRequestParts, Query},
    http::{HeaderMap, Method, request::Parts},
};
use std::collections::HashMap;
use std::convert::Infallible;

/// Request data handed to hooks and query constructors.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
}

impl RequestContext {
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Undecodable query strings behave as if empty.
        let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();
        Ok(Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query,
            headers: parts.headers.clone(),
        })
    }
}
