use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::HeaderName;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod admission;
mod config;
mod error;
mod gate;
mod gemini;
mod generation;
mod input;
mod middleware;
mod pipeline;
mod recaptcha;
mod routes;
mod state;
mod telemetry;

use crate::admission::AdmissionControl;
use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::generation::GenerationOrchestrator;
use crate::pipeline::RecallPipeline;
use crate::recaptcha::HumanVerifier;
use crate::telemetry::TelemetryRecorder;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "RecallBridge API",
        version = "0.1.0",
        description = "Turns study notes into five short recall cues that still work under exam stress."
    ),
    paths(
        routes::health::health_check,
        routes::recall::generate_panic_cues,
    ),
    components(schemas(
        HealthResponse,
        routes::recall::RecallRequestBody,
        recallbridge_core::error::ApiError,
        recallbridge_core::recall::PanicLevel,
        recallbridge_core::recall::StudyMode,
        recallbridge_core::recall::Severity,
        recallbridge_core::recall::CostTier,
        recallbridge_core::recall::Mistake,
        recallbridge_core::recall::GenerationResult,
        recallbridge_core::recall::Usage,
        recallbridge_core::recall::RecallData,
        recallbridge_core::recall::ResponseEnvelope,
        recallbridge_core::recall::VaguenessTrigger,
        recallbridge_core::recall::VaguenessSummary,
        recallbridge_core::recall::ClarificationResponse,
        recallbridge_core::recall::WarmupResponse,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recallbridge_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Config::from_env().expect("Invalid configuration");
    if config.gemini_api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY is not set; generation requests will fail");
    }

    let http = reqwest::Client::new();
    let backend = GeminiClient::new(
        http.clone(),
        config.gemini_api_base.clone(),
        config.gemini_api_key.clone(),
    );
    let verifier = HumanVerifier::new(config.verification.clone(), http);
    tracing::info!(
        verification = verifier.is_enabled(),
        telemetry = config.telemetry.enabled,
        default_model = %config.default_model,
        timeout_ms = config.generation_timeout.as_millis() as u64,
        "Recall pipeline configured"
    );

    let pipeline = RecallPipeline::new(
        config.default_model.clone(),
        AdmissionControl::new(config.rate_windows.clone()),
        verifier,
        GenerationOrchestrator::new(Arc::new(backend), config.generation_timeout),
        TelemetryRecorder::from_config(&config.telemetry),
    );
    let app_state = state::AppState::new(pipeline);

    let request_id_header = HeaderName::from_static(middleware::request_id::REQUEST_ID_HEADER);

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::recall::router())
        .layer(axum::middleware::from_fn(middleware::security_headers::apply))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    request_id_header.clone(),
                    middleware::request_id::MakeRequestUuidV7,
                ))
                .layer(PropagateRequestIdLayer::new(request_id_header))
                .layer(TraceLayer::new_for_http())
                .layer(middleware::cors::build_cors_layer(&config.cors_origins)),
        )
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("RecallBridge API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
