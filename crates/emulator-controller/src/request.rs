//! Turning an HTTP request into an invocation payload.
//!
//! The body is the function's data argument:
//! - empty body: the query string as an object, or `null` without one
//! - JSON content type: the parsed body (raw text if it does not parse)
//! - anything else: the body as text, left for best-effort decoding

use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use bytes::Bytes;
use serde_json::{Map, Value};

/// Build the payload for an HTTP-triggered invocation.
pub fn payload_from_request(headers: &HeaderMap, query: Option<&str>, body: &Bytes) -> Value {
    if body.is_empty() {
        return query
            .filter(|q| !q.is_empty())
            .map_or(Value::Null, query_to_object);
    }

    if is_json(headers) {
        if let Ok(value) = serde_json::from_slice(body) {
            return value;
        }
    }

    Value::String(String::from_utf8_lossy(body).into_owned())
}

/// Check if the request has a JSON content type.
pub fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"))
}

fn query_to_object(query: &str) -> Value {
    let fields: Map<String, Value> = url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect();
    Value::Object(fields)
}
