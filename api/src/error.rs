use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use recallbridge_core::error::{self, ApiError};

use crate::generation::GenerationError;
use crate::telemetry::StatusTag;

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
    },
    /// Anything but POST or a warmup GET (405)
    MethodNotAllowed,
    /// Sliding-window limit exceeded (429)
    RateLimited { retry_after_ms: u64 },
    /// Human verification rejected the caller (400)
    VerificationFailed { message: String },
    /// Generation upstream failed without a safe degradation path (500)
    Upstream(GenerationError),
    /// Internal error (500)
    Internal(String),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
            received: None,
        }
    }

    /// Telemetry tag recorded when a request ends with this error.
    pub fn status_tag(&self) -> StatusTag {
        match self {
            AppError::RateLimited { .. } => StatusTag::RateLimited,
            AppError::VerificationFailed { .. } => StatusTag::RecaptchaBlocked,
            _ => StatusTag::Error,
        }
    }

    pub fn into_response_with_id(self, request_id: String) -> Response {
        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
            } => (
                StatusCode::BAD_REQUEST,
                with_field(
                    api_error(error::codes::VALIDATION_FAILED, message, request_id),
                    field,
                    received,
                ),
            ),
            AppError::MethodNotAllowed => {
                let mut response = (
                    StatusCode::METHOD_NOT_ALLOWED,
                    Json(api_error(
                        error::codes::METHOD_NOT_ALLOWED,
                        "Method not allowed".to_string(),
                        request_id,
                    )),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static("POST, GET"));
                return response;
            }
            AppError::RateLimited { retry_after_ms } => {
                let retry_after_seconds = retry_after_ms.div_ceil(1000).max(1);
                let mut body = api_error(
                    error::codes::RATE_LIMITED,
                    format!("Too many requests. Retry after {retry_after_seconds} seconds."),
                    request_id,
                );
                body.retry_after_seconds = Some(retry_after_seconds);
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_seconds));
                return response;
            }
            AppError::VerificationFailed { message } => (
                StatusCode::BAD_REQUEST,
                with_field(
                    api_error(error::codes::VERIFICATION_FAILED, message, request_id),
                    Some("recaptchaToken".to_string()),
                    None,
                ),
            ),
            AppError::Upstream(err) => {
                tracing::error!(error = %err, "Generation failed");
                let code = match err {
                    GenerationError::ModelUnavailable { .. }
                    | GenerationError::NoFallbackModel { .. }
                    | GenerationError::Discovery { .. } => error::codes::MODEL_UNAVAILABLE,
                    _ => error::codes::UPSTREAM_ERROR,
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    api_error(code, err.to_string(), request_id),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    api_error(
                        error::codes::INTERNAL_ERROR,
                        "Failed to generate panic-safe cues".to_string(),
                        request_id,
                    ),
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_response_with_id(uuid::Uuid::now_v7().to_string())
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        AppError::Upstream(err)
    }
}

fn api_error(code: &str, message: String, request_id: String) -> ApiError {
    ApiError {
        success: false,
        error: message,
        code: code.to_string(),
        field: None,
        received: None,
        request_id,
        retry_after_seconds: None,
    }
}

fn with_field(
    mut api_error: ApiError,
    field: Option<String>,
    received: Option<serde_json::Value>,
) -> ApiError {
    api_error.field = field;
    api_error.received = received;
    api_error
}
