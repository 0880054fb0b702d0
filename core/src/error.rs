use serde::Serialize;
use utoipa::ToSchema;

/// Structured error response returned on every rejected request.
///
/// `error` is the human-readable message the browser client shows verbatim;
/// `code` is stable and meant for programmatic handling.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Always false for error bodies
    pub success: bool,
    /// Human-readable description of what went wrong
    pub error: String,
    /// Machine-readable error code (e.g. "validation_failed", "rate_limited")
    pub code: String,
    /// Which request field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Whole seconds the client should wait before retrying (429 only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const METHOD_NOT_ALLOWED: &str = "method_not_allowed";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const VERIFICATION_FAILED: &str = "verification_failed";
    pub const MODEL_UNAVAILABLE: &str = "model_unavailable";
    pub const UPSTREAM_ERROR: &str = "upstream_error";
    pub const INTERNAL_ERROR: &str = "internal_error";
}
