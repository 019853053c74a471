//! Admin API handlers for managing deployments over HTTP.
//!
//! # Authentication
//!
//! All Admin API endpoints require the `X-Admin-Token` header
//! to match the configured admin token.
//!
//! # Endpoints
//!
//! - `GET /admin/functions` - List deployed functions
//! - `POST /admin/functions` - Deploy a function
//! - `DELETE /admin/functions` - Remove every deployment
//! - `GET /admin/functions/:name` - Describe a function
//! - `DELETE /admin/functions/:name` - Undeploy a function
//! - `POST /admin/functions/:name/call` - Invoke a function with the request body

use std::path::PathBuf;

use axum::{
    Extension, Json, Router,
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};

use crate::request::payload_from_request;
use crate::response::{JsonResponse, error_to_response};
use crate::state::AppState;
use crate::trigger::TriggerSpec;

/// Header carrying the admin token.
pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

/// Admin API state containing app state and auth token.
#[derive(Clone)]
pub struct AdminState {
    /// Application state (dispatcher and session).
    pub app_state: AppState,
    /// Expected admin token for authentication.
    pub admin_token: String,
}

/// Body of `POST /admin/functions`.
///
/// ```json
/// { "name": "on_upload", "path": "./storage.wasm", "trigger": "storage", "resource": "uploads" }
/// ```
#[derive(Debug, Deserialize)]
pub struct DeployRequest {
    /// Function name (the module export).
    pub name: String,
    /// Module path.
    pub path: PathBuf,
    /// Trigger tag; HTTP when absent.
    #[serde(default, alias = "kind")]
    pub trigger: Option<String>,
    /// Event source for background triggers.
    #[serde(default)]
    pub event: Option<String>,
    /// Bucket or topic the trigger is bound to.
    #[serde(default)]
    pub resource: Option<String>,
}

impl DeployRequest {
    fn trigger_spec(&self) -> TriggerSpec {
        TriggerSpec {
            kind: self.trigger.clone(),
            event: self.event.clone(),
            resource: self.resource.clone(),
        }
    }
}

/// Build the Admin API router.
///
/// Returns a router that uses Extension to pass the admin state,
/// allowing it to be nested into routers with different state types.
pub fn build_admin_router(admin_state: AdminState) -> Router<AppState> {
    Router::new()
        .route(
            "/functions",
            get(list_functions)
                .post(deploy_function)
                .delete(clear_functions),
        )
        .route(
            "/functions/:name",
            get(describe_function).delete(undeploy_function),
        )
        .route("/functions/:name/call", post(call_function))
        .layer(Extension(admin_state))
}

/// Verify the admin token from request headers.
fn verify_token(headers: &HeaderMap, expected: &str) -> Result<(), Response> {
    let unauthorized =
        |message: &str| JsonResponse::error(StatusCode::UNAUTHORIZED, message).into_response();

    let Some(token) = headers.get(ADMIN_TOKEN_HEADER) else {
        return Err(unauthorized("Missing X-Admin-Token header"));
    };

    if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        warn!("Rejected admin request with invalid token");
        Err(unauthorized("Invalid admin token"))
    }
}

/// List deployed functions.
///
/// ```json
/// { "functions": { "hello": { "name": "hello", "path": "...", "type": "http", "url": "..." } }, "count": 1 }
/// ```
#[instrument(skip(admin_state, headers))]
pub async fn list_functions(
    Extension(admin_state): Extension<AdminState>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = verify_token(&headers, &admin_state.admin_token) {
        return e;
    }

    match admin_state.app_state.dispatcher().list() {
        Ok(functions) => {
            let count = functions.len();
            Json(json!({ "functions": functions, "count": count })).into_response()
        }
        Err(e) => error_to_response(&e).into_response(),
    }
}

/// Deploy a function from a module path.
#[instrument(skip(admin_state, headers, request), fields(name = %request.name))]
pub async fn deploy_function(
    Extension(admin_state): Extension<AdminState>,
    headers: HeaderMap,
    Json(request): Json<DeployRequest>,
) -> Response {
    if let Err(e) = verify_token(&headers, &admin_state.admin_token) {
        return e;
    }

    let result = admin_state
        .app_state
        .dispatcher()
        .deploy(&request.path, &request.name, &request.trigger_spec())
        .await;

    match result {
        Ok(descriptor) => (StatusCode::CREATED, Json(descriptor)).into_response(),
        Err(e) => {
            warn!(error = %e, "Deployment rejected");
            error_to_response(&e).into_response()
        }
    }
}

/// Remove every deployment.
#[instrument(skip(admin_state, headers))]
pub async fn clear_functions(
    Extension(admin_state): Extension<AdminState>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = verify_token(&headers, &admin_state.admin_token) {
        return e;
    }

    let removed = admin_state.app_state.session().clear();
    info!(removed, "Registry cleared through admin API");
    Json(json!({ "removed": removed })).into_response()
}

/// Describe one deployed function.
#[instrument(skip(admin_state, headers))]
pub async fn describe_function(
    Extension(admin_state): Extension<AdminState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(e) = verify_token(&headers, &admin_state.admin_token) {
        return e;
    }

    match admin_state.app_state.dispatcher().describe(&name) {
        Ok(descriptor) => Json(descriptor).into_response(),
        Err(e) => error_to_response(&e).into_response(),
    }
}

/// Undeploy a function. Succeeds for names that are not deployed.
#[instrument(skip(admin_state, headers))]
pub async fn undeploy_function(
    Extension(admin_state): Extension<AdminState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(e) = verify_token(&headers, &admin_state.admin_token) {
        return e;
    }

    match admin_state.app_state.dispatcher().undeploy(&name) {
        Ok(()) => Json(json!({ "name": name, "message": "Function undeployed" })).into_response(),
        Err(e) => error_to_response(&e).into_response(),
    }
}

/// Invoke any deployed function, whatever its trigger, with the request
/// body as payload.
#[instrument(skip(admin_state, headers, body))]
pub async fn call_function(
    Extension(admin_state): Extension<AdminState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    if let Err(e) = verify_token(&headers, &admin_state.admin_token) {
        return e;
    }

    let payload = payload_from_request(&headers, None, &body);
    match admin_state.app_state.dispatcher().call(&name, payload).await {
        Ok(outcome) => JsonResponse::from_outcome(&outcome).into_response(),
        Err(e) => error_to_response(&e).into_response(),
    }
}
