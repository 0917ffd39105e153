use axum::http::header::HeaderMap;

/// Strip characters that are not allowed in header values.
fn sanitize_resource_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .collect()
}

/// Build the `Content-Range` header for a page of an index listing.
///
/// # Arguments
///
/// * `offset` - Index of the first item in the page.
/// * `limit` - Page size requested.
/// * `total_count` - Number of items matching the scope.
/// * `resource_name` - Unit placed before the range, usually the table name.
#[must_use]
pub fn calculate_content_range(offset: u64, limit: u64, total_count: u64, resource_name: &str) -> HeaderMap {
    let last = offset
        .saturating_add(limit.max(1) - 1)
        .min(total_count.saturating_sub(1));
    let safe_name = sanitize_resource_name(resource_name);

    let mut headers = HeaderMap::new();
    let content_range = format!("{safe_name} {offset}-{last}/{total_count}");
    if let Ok(value) = content_range.parse() {
        headers.insert("Content-Range", value);
    } else if let Ok(value) = format!("items {offset}-{last}/{total_count}").parse() {
        headers.insert("Content-Range", value);
    }
    headers
}
