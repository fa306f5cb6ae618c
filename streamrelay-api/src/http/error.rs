// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code.
///
/// Rendered as a plain-text body: the init wire contract promises a
/// plain-text reason on 404, and the remaining errors follow suit.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

/// Convert core errors to HTTP errors
impl From<streamrelay_core::Error> for AppError {
    fn from(err: streamrelay_core::Error) -> Self {
        use streamrelay_core::Error;

        match err {
            // Session payloads that resolve no continuation or token are a
            // 404 by the init wire contract
            Error::NoContinuation | Error::NoToken => Self::not_found(err.to_string()),
            Error::InvalidInput(msg) => Self::bad_request(msg),
            Error::Upstream(_) | Error::UpstreamStatus { .. } => {
                tracing::error!("Upstream error: {err}");
                Self::internal_server_error("Upstream error")
            }
            other => {
                tracing::error!("Internal error: {other}");
                Self::internal_server_error("Internal server error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamrelay_core::Error;

    #[test]
    fn test_no_continuation_maps_to_404() {
        let err: AppError = Error::NoContinuation.into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(err.message.contains("continuation"));
    }

    #[test]
    fn test_no_token_maps_to_404() {
        let err: AppError = Error::NoToken.into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_input_maps_to_400() {
        let err: AppError = Error::InvalidInput("bad payload".to_string()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "bad payload");
    }

    #[test]
    fn test_upstream_maps_to_500_without_leaking_detail() {
        let err: AppError = Error::Upstream("connection refused".to_string()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("refused"));
    }
}
