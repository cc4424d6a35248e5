//! HTTP interface
//!
//! Route builders per concern, merged by [`crate::build_router`]. Handlers
//! stay thin: parse the request, call into the store/pipeline, shape the
//! JSON response. Responses always carry `success`; failures go through
//! [`crate::error::ApiError`] and its structured error body.

pub mod chunks;
pub mod health;
pub mod recordings;
pub mod upload;

use axum::http::HeaderMap;

/// Caller-supplied request identity, gathered from headers first and query
/// parameters second.
pub(crate) fn request_identity(
    headers: &HeaderMap,
    query_client_id: Option<&str>,
    query_request_id: Option<&str>,
) -> (Option<String>, Option<String>) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let client_id = header("x-client-id")
        .or_else(|| query_client_id.filter(|v| !v.is_empty()).map(str::to_string));
    let request_id = header("x-request-id")
        .or_else(|| query_request_id.filter(|v| !v.is_empty()).map(str::to_string));
    (client_id, request_id)
}
