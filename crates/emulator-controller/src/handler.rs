//! Request handlers for the serving process.
//!
//! HTTP-triggered functions are reached at `/{project}/{region}/{name}`;
//! everything else here is health reporting.

use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use bytes::Bytes;
use serde_json::json;
use tracing::{debug, instrument};

use crate::request::payload_from_request;
use crate::response::{JsonResponse, error_to_response};
use crate::session::EmulatorState;
use crate::state::AppState;

/// Invoke an HTTP-triggered function.
///
/// The request body is the function's data argument. Responds `200` with
/// the result, or `500` with the failure description when the function
/// fails.
#[instrument(skip(state, headers, query, body), fields(project = %project, region = %region))]
pub async fn invoke_http(
    State(state): State<AppState>,
    Path((project, region, name)): Path<(String, String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> JsonResponse {
    let dispatcher = state.dispatcher();

    let descriptor = match dispatcher.describe(&name) {
        Ok(descriptor) => descriptor,
        Err(e) => return error_to_response(&e),
    };

    let project_matches = state
        .session()
        .options()
        .is_some_and(|options| options.project_id == project);
    if !project_matches || dispatcher.settings().region != region {
        debug!(function = %name, "Endpoint does not match the session");
        return JsonResponse::error(
            StatusCode::NOT_FOUND,
            format!("Function not found: {project}/{region}/{name}"),
        );
    }

    if !descriptor.trigger().is_http() {
        return JsonResponse::error(
            StatusCode::BAD_REQUEST,
            format!(
                "Function '{name}' has a {} trigger and cannot be called over HTTP",
                descriptor.trigger()
            ),
        );
    }

    let payload = payload_from_request(&headers, query.as_deref(), &body);
    match dispatcher.call(&name, payload).await {
        Ok(outcome) => JsonResponse::from_outcome(&outcome),
        Err(e) => error_to_response(&e),
    }
}

/// Health check handler.
///
/// Returns 200 OK while the serving process is up.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler.
///
/// Returns 200 OK with the deployed function count while the session is
/// running, 503 otherwise.
pub async fn readiness_check(State(state): State<AppState>) -> JsonResponse {
    let session = state.session();
    let status = session.state();
    let body = json!({
        "status": status,
        "functions": session.registry().len(),
    });

    match status {
        EmulatorState::Running => JsonResponse::ok(body),
        EmulatorState::Stopped => JsonResponse::json(StatusCode::SERVICE_UNAVAILABLE, body),
    }
}
