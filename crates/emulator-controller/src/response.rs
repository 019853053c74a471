//! HTTP response conversion.
//!
//! Invocation outcomes and controller errors are turned into JSON responses
//! here, so every HTTP surface reports them the same way.

use axum::Json;
use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;
use serde_json::{Value, json};

use emulator_common::EmulatorError;

use crate::fault::InvocationOutcome;

/// JSON response with a status code.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response body
    pub body: Value,
}

impl JsonResponse {
    /// Create a JSON response.
    pub fn json(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    /// `200 OK` with `body`.
    pub fn ok(body: Value) -> Self {
        Self::json(StatusCode::OK, body)
    }

    /// Create an error response with a JSON body.
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self::json(status, json!({ "error": message.into() }))
    }

    /// Response for an invocation: `200` with the result, or `500` with the
    /// failure description.
    pub fn from_outcome(outcome: &InvocationOutcome) -> Self {
        let status = if outcome.is_success() {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self::json(status, outcome.to_json())
    }

    /// Convert to Axum response.
    pub fn into_axum_response(self) -> Response<Body> {
        (self.status, Json(self.body)).into_response()
    }
}

impl IntoResponse for JsonResponse {
    fn into_response(self) -> Response<Body> {
        self.into_axum_response()
    }
}

/// Convert an [`EmulatorError`] to an HTTP response.
pub fn error_to_response(error: &EmulatorError) -> JsonResponse {
    let status = match error {
        EmulatorError::NotRunning => StatusCode::SERVICE_UNAVAILABLE,
        EmulatorError::AlreadyRunning => StatusCode::CONFLICT,
        EmulatorError::ModuleNotFound { .. } | EmulatorError::FunctionNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        EmulatorError::InvalidFunction { .. } | EmulatorError::InvalidTrigger { .. } => {
            StatusCode::BAD_REQUEST
        }
        EmulatorError::Bind { .. } | EmulatorError::Server { .. } | EmulatorError::Runtime(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    JsonResponse::error(status, error.to_string())
}
