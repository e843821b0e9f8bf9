//! Rate-limit response metadata.

use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::SecondsFormat;

use crate::features::rate_limits::dtos::RateLimitExceededDto;
use crate::features::rate_limits::models::Verdict;
use crate::shared::constants::{
    HEADER_RATE_LIMIT_LIMIT, HEADER_RATE_LIMIT_REMAINING, HEADER_RATE_LIMIT_RESET,
    HEADER_RATE_LIMIT_TYPE,
};

fn insert(headers: &mut HeaderMap, name: &'static str, value: String) {
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// Set the `X-RateLimit-*` headers for a verdict
pub fn annotate(headers: &mut HeaderMap, verdict: &Verdict) {
    insert(headers, HEADER_RATE_LIMIT_LIMIT, verdict.limit.to_string());
    insert(
        headers,
        HEADER_RATE_LIMIT_REMAINING,
        verdict.remaining.to_string(),
    );
    insert(
        headers,
        HEADER_RATE_LIMIT_RESET,
        verdict.reset_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    insert(headers, HEADER_RATE_LIMIT_TYPE, verdict.tier.to_string());
}

/// 429 response for a denied request, headers included
pub fn rejection(verdict: &Verdict) -> Response {
    let body = RateLimitExceededDto::from(verdict);
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();

    let headers = response.headers_mut();
    annotate(headers, verdict);
    if let Ok(value) = HeaderValue::from_str(&verdict.retry_after_seconds().to_string()) {
        headers.insert(header::RETRY_AFTER, value);
    }

    response
}
