//! Error responses.
//!
//! # Design Decisions
//! - Every failure body is `{"error": "<message>"}` so clients can parse
//!   errors without looking at the status first
//! - Gate errors map onto status codes in one place

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::session::GateError;

/// An HTTP error with a JSON body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        let status = match &err {
            GateError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GateError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GateError::NotFound => StatusCode::NOT_FOUND,
            GateError::Conflict(_) => StatusCode::CONFLICT,
            GateError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "Request failed");
        }
        // Internal details stay in the log.
        let message = match err {
            GateError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AuthFailure;

    #[test]
    fn gate_errors_map_to_statuses() {
        let cases = [
            (GateError::Unauthorized(AuthFailure::Missing), StatusCode::UNAUTHORIZED),
            (GateError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (GateError::NotFound, StatusCode::NOT_FOUND),
            (GateError::Conflict("a@b".into()), StatusCode::CONFLICT),
            (GateError::StoreUnavailable("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (GateError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn internal_message_is_hidden() {
        let err = ApiError::from(GateError::Internal("argon2 exploded".into()));
        assert_eq!(err.message, "internal error");
    }
}
