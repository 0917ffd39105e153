use serde::Deserialize;
use std::collections::HashMap;
use utoipa::IntoParams;

use crate::errors::ApiError;
use crate::model::{ListQuery, Scope, SortOrder};

const DEFAULT_PER_PAGE: u64 = 20;

/// Largest offset or limit accepted; SQL binds them as signed 64-bit integers.
const MAX_WINDOW: u64 = i64::MAX.unsigned_abs();

/// Query parameters understood by index views.
///
/// # Pagination
/// Either `offset` + `limit`, or `page` (1-based) + `per_page`. Without any of
/// them every matching record is returned.
///
/// # Sorting
/// `sort=title` sorts ascending, `sort=-title` descending. The default order
/// is by primary key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListOptions {
    /// Number of records to skip.
    #[param(example = 0)]
    pub offset: Option<u64>,
    /// Maximum number of records to return.
    #[param(example = 25)]
    pub limit: Option<u64>,
    /// 1-based page number; takes precedence over `offset`.
    #[param(example = 1)]
    pub page: Option<u64>,
    /// Page size used with `page`.
    #[param(example = 20)]
    pub per_page: Option<u64>,
    /// Column to sort by, prefixed with `-` for descending order.
    #[param(example = "-id")]
    pub sort: Option<String>,
}

impl ListOptions {
    pub fn from_query(query: &HashMap<String, String>) -> Result<Self, ApiError> {
        let number = |name: &str| -> Result<Option<u64>, ApiError> {
            query
                .get(name)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .ok()
                        .filter(|n| *n <= MAX_WINDOW)
                        .ok_or_else(|| ApiError::bad_request(format!("'{name}' must be an integer from 0 to {MAX_WINDOW}")))
                })
                .transpose()
        };
        Ok(Self {
            offset: number("offset")?,
            limit: number("limit")?,
            page: number("page")?,
            per_page: number("per_page")?,
            sort: query.get("sort").map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        })
    }

    /// Resolve to `(offset, limit)`.
    pub fn window(&self) -> Result<(u64, Option<u64>), ApiError> {
        match self.page {
            Some(0) => Err(ApiError::bad_request("'page' starts at 1")),
            Some(page) => {
                let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE);
                let offset = (page - 1)
                    .checked_mul(per_page)
                    .filter(|offset| *offset <= MAX_WINDOW)
                    .ok_or_else(|| ApiError::bad_request("'page' is out of range"))?;
                Ok((offset, Some(per_page)))
            }
            None => Ok((self.offset.unwrap_or(0), self.limit)),
        }
    }

    pub fn sort_key(&self) -> Option<(String, SortOrder)> {
        let sort = self.sort.as_deref()?;
        Some(match sort.strip_prefix('-') {
            Some(field) => (field.to_string(), SortOrder::Desc),
            None => (sort.trim_start_matches('+').to_string(), SortOrder::Asc),
        })
    }

    pub fn to_list_query(&self, scope: Scope) -> Result<ListQuery, ApiError> {
        let (offset, limit) = self.window()?;
        Ok(ListQuery {
            scope,
            offset,
            limit,
            sort: self.sort_key(),
        })
    }
}
