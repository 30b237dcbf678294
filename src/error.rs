use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

/// The main error type for Floodgate
#[derive(Debug, thiserror::Error)]
pub enum FloodgateError {
    /// A field value could not be coerced during marshalling.
    ///
    /// Carries the offending field name and the original value so callers
    /// can diagnose the data/schema mismatch. Never swallowed internally.
    #[error("marshalling failed for field `{field}`: incompatible value {value}")]
    Marshalling { field: String, value: Value },

    #[error("too many requests")]
    TooManyRequests { retry_after: u64 },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience Result type using FloodgateError
pub type Result<T> = std::result::Result<T, FloodgateError>;

impl FloodgateError {
    pub fn marshalling(field: impl Into<String>, value: Value) -> Self {
        Self::Marshalling {
            field: field.into(),
            value,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Marshalling { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) | Self::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Standard error response body for API errors
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for FloodgateError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match self {
            Self::TooManyRequests { retry_after } => (
                status,
                [("Retry-After", retry_after.to_string())],
                Json(ErrorBody {
                    error: "rate limit exceeded".to_string(),
                    message: Some("Too Many Requests".to_string()),
                }),
            )
                .into_response(),
            // Marshalling and internal errors indicate a server-side
            // data/schema mismatch. The details are logged, not leaked.
            Self::Marshalling { ref field, ref value } => {
                tracing::error!(field = %field, value = %value, "marshalling error");
                (
                    status,
                    Json(ErrorBody {
                        error: "internal server error".to_string(),
                        message: None,
                    }),
                )
                    .into_response()
            }
            other => (
                status,
                Json(ErrorBody {
                    error: other.to_string(),
                    message: None,
                }),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_marshalling_error_carries_field_and_value() {
        let err = FloodgateError::marshalling("age", json!("not-a-number"));
        let msg = err.to_string();
        assert!(msg.contains("age"));
        assert!(msg.contains("not-a-number"));
    }

    #[test]
    fn test_too_many_requests_status() {
        let err = FloodgateError::TooManyRequests { retry_after: 3 };
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_marshalling_error_maps_to_500() {
        let err = FloodgateError::marshalling("id", json!([1, 2]));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
