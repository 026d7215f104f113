//! JSON response envelope shared by every service
//!
//! Successful calls answer `{status, message, result?}` and failures answer
//! `{status: false, message, data?}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

/// Envelope for successful (or softly failed) calls
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Successful call carrying a result
    pub fn ok(message: impl Into<String>, result: T) -> Self {
        Self {
            status: true,
            message: message.into(),
            result: Some(result),
        }
    }
}

impl ApiResponse<Value> {
    /// Successful call without a result body
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: true,
            message: message.into(),
            result: None,
        }
    }

    /// A call that was understood but had no effect, e.g. logging out a token
    /// nobody holds. Answered with 200.
    pub fn soft_failure(message: impl Into<String>) -> Self {
        Self {
            status: false,
            message: message.into(),
            result: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Envelope for failed calls
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            status: false,
            message: message.into(),
            data,
        }
    }

    /// Render with the given status code
    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_envelope_carries_result() {
        let body = serde_json::to_value(ApiResponse::ok("done", json!({"id": 1}))).unwrap();
        assert_eq!(body, json!({"status": true, "message": "done", "result": {"id": 1}}));
    }

    #[test]
    fn test_soft_failure_omits_result() {
        let body = serde_json::to_value(ApiResponse::soft_failure("nothing to do")).unwrap();
        assert_eq!(body, json!({"status": false, "message": "nothing to do"}));
    }

    #[test]
    fn test_error_body_shape() {
        let body = serde_json::to_value(ErrorBody::new("bad", Some(json!(["email"])))).unwrap();
        assert_eq!(body, json!({"status": false, "message": "bad", "data": ["email"]}));
    }
}
