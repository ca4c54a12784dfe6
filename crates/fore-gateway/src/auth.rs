use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use crate::app::AppState;

/// True when no gateway token is configured or the request carries it.
pub fn check_auth(state: &AppState, headers: &HeaderMap) -> bool {
    match &state.config.gateway.token {
        None => true,
        Some(expected) => extract_bearer(headers)
            .map(|t| t == expected)
            .unwrap_or(false),
    }
}

pub fn require_auth(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    if check_auth(state, headers) {
        Ok(())
    } else {
        Err(error_response(StatusCode::UNAUTHORIZED, "AUTH_FAILED", "missing or invalid bearer token"))
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": { "code": code, "message": message.into() } })))
}
