//! Error responses produced by the gate itself.
//!
//! Every error body uses the finance API's envelope:
//! `{ "success": false, "error": <message>, "code": <CODE>, "statusCode": <status> }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

/// 429 with the rejecting policy's payload as the body.
pub fn rejection(payload: Value) -> Response {
    (StatusCode::TOO_MANY_REQUESTS, Json(payload)).into_response()
}

/// Error in the standard envelope.
pub fn error(status: StatusCode, code: &str, message: &str) -> Response {
    let body = json!({
        "success": false,
        "error": message,
        "code": code,
        "statusCode": status.as_u16(),
    });
    (status, Json(body)).into_response()
}
