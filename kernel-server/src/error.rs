//! Error types for the HTTP API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kernel_core::error::KernelError;
use serde::Serialize;
use std::fmt;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Internal server error (500)
    Internal(String),

    /// Service unavailable (503)
    ServiceUnavailable(String),

    /// Kernel-level error
    Kernel(KernelError),
}

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            ApiError::Kernel(e) => write!(f, "Kernel error: {}", e),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<KernelError> for ApiError {
    fn from(err: KernelError) -> Self {
        ApiError::Kernel(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
            ApiError::Kernel(e) => {
                let status = match &e {
                    KernelError::ParseError(_)
                    | KernelError::ValidationError(_)
                    | KernelError::MalformedAtom(_)
                    | KernelError::AtomConversion(_) => StatusCode::BAD_REQUEST,
                    KernelError::RuleRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    KernelError::ConstitutionalDeny { .. } | KernelError::PermissionDenied => {
                        StatusCode::FORBIDDEN
                    }
                    KernelError::KernelFull | KernelError::BudgetOverrun { .. } => {
                        StatusCode::INSUFFICIENT_STORAGE
                    }
                    KernelError::Reentrancy | KernelError::RunawayHalt { .. } => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    KernelError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let message = e.to_string();
                (status, e.user_kind(), message)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}
