use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::{Router, routing::any};
use recallbridge_core::recall::{PanicLevel, StudyMode};
use serde::Serialize;

use crate::middleware::request_id::REQUEST_ID_HEADER;
use crate::state::AppState;

/// Every method reaches the pipeline, whose gate decides between warmup,
/// processing and 405.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", any(generate_panic_cues))
        .route("/generatePanicCues", any(generate_panic_cues))
}

/// Documented shape of the request body. Parsing is lenient and happens in
/// the pipeline, so this type only feeds the OpenAPI document.
#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecallRequestBody {
    /// Study notes, at least 20 characters after trimming
    pub text: String,
    pub panic_level: Option<PanicLevel>,
    pub mode: Option<StudyMode>,
    /// ISO-639-1 code, optionally with a region. Defaults to `en`
    pub language: Option<String>,
    pub one_breath: Option<bool>,
    /// Required when human verification is configured
    pub recaptcha_token: Option<String>,
    /// Model identifier override
    pub model: Option<String>,
    /// Marks the request as a warmup probe
    pub warmup: Option<bool>,
}

/// Turn study notes into five panic-safe recall cues
#[utoipa::path(
    post,
    path = "/generatePanicCues",
    request_body = RecallRequestBody,
    responses(
        (status = 200, description = "Cues, a clarification request, or a warmup acknowledgement", body = recallbridge_core::recall::ResponseEnvelope),
        (status = 400, description = "Invalid input or failed human verification", body = recallbridge_core::error::ApiError),
        (status = 405, description = "Method not allowed", body = recallbridge_core::error::ApiError),
        (status = 429, description = "Rate limited", body = recallbridge_core::error::ApiError),
        (status = 500, description = "Generation failed", body = recallbridge_core::error::ApiError),
        (status = 502, description = "Model output was malformed, safe fallback cues returned", body = recallbridge_core::recall::ResponseEnvelope),
        (status = 504, description = "Generation timed out, safe fallback cues returned", body = recallbridge_core::recall::ResponseEnvelope)
    ),
    tag = "recall"
)]
pub async fn generate_panic_cues(State(state): State<AppState>, request: Request) -> Response {
    let request_id = request_id(request.headers());
    match state.pipeline.handle(request.into()).await {
        Ok(reply) => reply.into_response(),
        Err(err) => err.into_response_with_id(request_id),
    }
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::generation::testing::ScriptedBackend;
    use crate::pipeline::testing::{NOTES, VALID_OUTPUT, harness, harness_with_timeout};

    fn app(backend: ScriptedBackend) -> Router {
        router().with_state(AppState::new(harness(backend).pipeline))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", "203.0.113.9")
            .header(REQUEST_ID_HEADER, "req-123")
            .body(Body::from(body.to_string()))
            .expect("request should build")
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    #[tokio::test]
    async fn both_paths_serve_cues() {
        for uri in ["/", "/generatePanicCues"] {
            let response = app(ScriptedBackend::replying(vec![Ok(VALID_OUTPUT.to_string())]))
                .oneshot(post_json(uri, json!({ "text": NOTES })))
                .await
                .expect("request should succeed");

            assert_eq!(response.status(), StatusCode::OK);
            let body = json_body(response).await;
            assert_eq!(body["success"], true);
            assert_eq!(body["fallbackUsed"], false);
            assert_eq!(body["panicLevel"], "medium");
            assert_eq!(body["mode"], "revise");
            assert_eq!(body["language"], "en");
            assert_eq!(body["data"]["anchors"].as_array().map(Vec::len), Some(5));
            assert!(body["data"]["confidence"].as_f64().is_some());
            assert!(body["data"]["usage"]["tokensEstimated"].as_u64().is_some());
        }
    }

    #[tokio::test]
    async fn put_is_rejected_with_allow_header() {
        let response = app(ScriptedBackend::replying(vec![]))
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/generatePanicCues")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response
                .headers()
                .get(header::ALLOW)
                .expect("allow header should exist"),
            "POST, GET"
        );
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "method_not_allowed");
    }

    #[tokio::test]
    async fn warmup_get_is_acknowledged() {
        let response = app(ScriptedBackend::replying(vec![]))
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/?warmup=1")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["warmup"], true);
        assert!(body["timestamp"].as_str().is_some());
    }

    #[tokio::test]
    async fn plain_get_is_rejected() {
        let response = app(ScriptedBackend::replying(vec![]))
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/generatePanicCues")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn short_text_names_the_field_and_echoes_request_id() {
        let response = app(ScriptedBackend::replying(vec![]))
            .oneshot(post_json("/", json!({ "text": "too short" })))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], "validation_failed");
        assert_eq!(body["field"], "text");
        assert_eq!(body["requestId"], "req-123");
    }

    #[tokio::test]
    async fn rapid_second_request_gets_retry_after() {
        let app = app(ScriptedBackend::replying(vec![Ok(VALID_OUTPUT.to_string())]));
        let first = app
            .clone()
            .oneshot(post_json("/", json!({ "text": NOTES })))
            .await
            .expect("request should succeed");
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(post_json("/", json!({ "text": NOTES })))
            .await
            .expect("request should succeed");
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            second
                .headers()
                .get(header::RETRY_AFTER)
                .expect("retry-after header should exist"),
            "1"
        );
        let body = json_body(second).await;
        assert_eq!(body["code"], "rate_limited");
        assert_eq!(body["retryAfterSeconds"], 1);
    }

    #[tokio::test]
    async fn malformed_model_output_returns_bad_gateway_with_safe_payload() {
        let response = app(ScriptedBackend::replying(vec![Ok("not json at all".to_string())]))
            .oneshot(post_json(
                "/",
                json!({ "text": NOTES, "language": "DE", "oneBreath": "yes" }),
            ))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["fallbackUsed"], true);
        assert_eq!(body["language"], "de");
        assert_eq!(body["data"]["subject"], "General");
        assert!(body["data"]["oneBreathCue"].as_str().is_some());
        assert!(body["note"].as_str().is_some());
    }

    #[tokio::test]
    async fn timeout_returns_gateway_timeout_with_safe_payload() {
        let pipeline =
            harness_with_timeout(ScriptedBackend::hanging(), Duration::from_millis(20)).pipeline;
        let response = router()
            .with_state(AppState::new(pipeline))
            .oneshot(post_json("/", json!({ "text": NOTES, "panicLevel": "high" })))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let body = json_body(response).await;
        assert_eq!(body["model"], "fallback");
        assert_eq!(body["fallbackUsed"], true);
        assert_eq!(body["panicLevel"], "high");
    }

    #[tokio::test]
    async fn oversized_body_is_a_validation_error() {
        let text = "a".repeat(crate::pipeline::MAX_BODY_BYTES + 1);
        let response = app(ScriptedBackend::replying(vec![]))
            .oneshot(post_json("/", json!({ "text": text })))
            .await
            .expect("request should succeed");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["field"], "body");
    }
}
