//! The recall pipeline: gate, admission, verification, validation,
//! vagueness check, generation, output validation, estimation.
//!
//! Every run ends in exactly one telemetry sample, whatever the exit.

use std::net::SocketAddr;
use std::time::Instant;

use axum::Json;
use axum::body::{Body, to_bytes};
use axum::extract::{ConnectInfo, Request};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use recallbridge_core::estimate;
use recallbridge_core::output;
use recallbridge_core::prompt::{build_prompt, one_breath_cue};
use recallbridge_core::recall::{
    ClarificationResponse, GenerationResult, RecallData, RecallRequest, ResponseEnvelope,
    WarmupResponse,
};
use recallbridge_core::vagueness;
use serde_json::Value;

use crate::admission::{AdmissionControl, client_key};
use crate::error::AppError;
use crate::gate::{self, WarmupSignals};
use crate::generation::{GenerationError, GenerationOrchestrator};
use crate::input::{self, InputOutcome};
use crate::recaptcha::HumanVerifier;
use crate::telemetry::{StatusTag, TelemetryRecorder};

pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Model label on responses produced without any upstream output.
pub const TIMEOUT_MODEL_LABEL: &str = "fallback";

const PARSE_FALLBACK_NOTE: &str =
    "The model reply did not match the expected format, so safe fallback cues were returned.";
const TIMEOUT_FALLBACK_NOTE: &str =
    "The model took too long to respond, so safe fallback cues were returned.";

/// Transport-level view of an incoming request.
pub struct InboundRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: Option<String>,
    pub body: Body,
    pub peer: Option<SocketAddr>,
}

impl From<Request> for InboundRequest {
    fn from(request: Request) -> Self {
        let (parts, body) = request.into_parts();
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Self {
            method: parts.method,
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body,
            peer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueOutcome {
    Success,
    ParseFallback,
    TimeoutFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecallReply {
    Warmup(WarmupResponse),
    Clarification(ClarificationResponse),
    Cues {
        envelope: ResponseEnvelope,
        outcome: CueOutcome,
    },
}

impl RecallReply {
    pub fn status_tag(&self) -> StatusTag {
        match self {
            RecallReply::Warmup(_) => StatusTag::Warmup,
            RecallReply::Clarification(_) => StatusTag::Clarification,
            RecallReply::Cues { outcome, .. } => match outcome {
                CueOutcome::Success => StatusTag::Success,
                CueOutcome::ParseFallback => StatusTag::ParseFallback,
                CueOutcome::TimeoutFallback => StatusTag::TimeoutFallback,
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RecallReply::Cues {
                outcome: CueOutcome::ParseFallback,
                ..
            } => StatusCode::BAD_GATEWAY,
            RecallReply::Cues {
                outcome: CueOutcome::TimeoutFallback,
                ..
            } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::OK,
        }
    }
}

impl IntoResponse for RecallReply {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            RecallReply::Warmup(body) => (status, Json(body)).into_response(),
            RecallReply::Clarification(body) => (status, Json(body)).into_response(),
            RecallReply::Cues { envelope, .. } => (status, Json(envelope)).into_response(),
        }
    }
}

pub struct RecallPipeline {
    default_model: String,
    admission: AdmissionControl,
    verifier: HumanVerifier,
    generator: GenerationOrchestrator,
    telemetry: TelemetryRecorder,
}

impl RecallPipeline {
    pub fn new(
        default_model: String,
        admission: AdmissionControl,
        verifier: HumanVerifier,
        generator: GenerationOrchestrator,
        telemetry: TelemetryRecorder,
    ) -> Self {
        Self {
            default_model,
            admission,
            verifier,
            generator,
            telemetry,
        }
    }

    pub async fn handle(&self, inbound: InboundRequest) -> Result<RecallReply, AppError> {
        let started = Instant::now();
        let result = self.execute(inbound).await;
        let tag = match &result {
            Ok(reply) => reply.status_tag(),
            Err(err) => err.status_tag(),
        };
        self.telemetry.record(started.elapsed(), tag);
        result
    }

    async fn execute(&self, inbound: InboundRequest) -> Result<RecallReply, AppError> {
        let raw_body = to_bytes(inbound.body, MAX_BODY_BYTES)
            .await
            .map_err(|_| AppError::validation("body", "Request body is too large or unreadable"))?;
        let body: Option<Value> = serde_json::from_slice(&raw_body).ok();

        let signals = WarmupSignals::detect(
            &inbound.headers,
            inbound.query.as_deref(),
            &raw_body,
            body.as_ref(),
        );
        let decision = gate::classify(&inbound.method, signals)?;
        if decision.warmup {
            tracing::debug!(signals = ?decision.signals, "Warmup probe");
            return Ok(warmup_reply());
        }

        let key = client_key(&inbound.headers, inbound.peer);
        let admission = self.admission.admit(&key).await;
        if !admission.admitted {
            tracing::warn!(
                event = "rate_limited",
                client = %key,
                retry_after_ms = admission.retry_after_ms,
                "Rate limit exceeded"
            );
            return Err(AppError::RateLimited {
                retry_after_ms: admission.retry_after_ms,
            });
        }

        let token = body
            .as_ref()
            .and_then(|b| b.get("recaptchaToken"))
            .and_then(Value::as_str);
        let remote_ip = (key != "anonymous").then_some(key.as_str());
        let verification = self.verifier.verify(token, remote_ip).await;
        if !verification.success {
            tracing::warn!(
                event = "verification_failed",
                error = verification.error.as_deref().unwrap_or("unknown"),
                score = ?verification.score,
                "Human verification rejected request"
            );
            return Err(AppError::VerificationFailed {
                message: "reCAPTCHA verification failed. Please complete the check and resubmit."
                    .to_string(),
            });
        }

        let request = match input::validate(body.as_ref(), decision.warmup)? {
            InputOutcome::Valid(request) => request,
            InputOutcome::Warmup => return Ok(warmup_reply()),
        };

        let assessment = vagueness::analyze(&request.text);
        if assessment.needs_clarification {
            tracing::info!(
                score = assessment.score,
                triggers = assessment.triggers.len(),
                "Notes too vague, asking for clarification"
            );
            return Ok(RecallReply::Clarification(assessment.into()));
        }

        let model = request
            .requested_model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let model_label = model.clone();

        match self.generator.generate(build_prompt(&request), model).await {
            Ok(generated) => match output::validate(&generated.text) {
                Ok(result) => {
                    let output_chars = generated.text.chars().count();
                    Ok(RecallReply::Cues {
                        envelope: envelope(&request, generated.model, result, output_chars, None),
                        outcome: CueOutcome::Success,
                    })
                }
                Err(err) => {
                    tracing::warn!(
                        event = "generation_schema_violation",
                        model = %generated.model,
                        error = %err,
                        "Model output failed validation, using safe fallback"
                    );
                    Ok(RecallReply::Cues {
                        envelope: safe_envelope(&request, generated.model, PARSE_FALLBACK_NOTE),
                        outcome: CueOutcome::ParseFallback,
                    })
                }
            },
            Err(GenerationError::Timeout { after_ms }) => {
                tracing::warn!(
                    event = "generation_timeout",
                    after_ms,
                    "Generation timed out, using safe fallback"
                );
                Ok(RecallReply::Cues {
                    envelope: safe_envelope(
                        &request,
                        TIMEOUT_MODEL_LABEL.to_string(),
                        TIMEOUT_FALLBACK_NOTE,
                    ),
                    outcome: CueOutcome::TimeoutFallback,
                })
            }
            Err(err @ (GenerationError::EmptyResponse | GenerationError::InvalidBody(_))) => {
                tracing::warn!(
                    event = "generation_schema_violation",
                    model = %model_label,
                    error = %err,
                    "Model returned no usable output, using safe fallback"
                );
                Ok(RecallReply::Cues {
                    envelope: safe_envelope(&request, model_label, PARSE_FALLBACK_NOTE),
                    outcome: CueOutcome::ParseFallback,
                })
            }
            Err(GenerationError::Task(message)) => Err(AppError::Internal(message)),
            Err(err) => Err(err.into()),
        }
    }
}

fn warmup_reply() -> RecallReply {
    RecallReply::Warmup(WarmupResponse {
        success: true,
        warmup: true,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

fn envelope(
    request: &RecallRequest,
    model: String,
    result: GenerationResult,
    output_chars: usize,
    note: Option<&str>,
) -> ResponseEnvelope {
    let input_chars = request.text.chars().count();
    let confidence = estimate::confidence(input_chars, request.panic_level, &result.anchors);
    let usage = estimate::usage(input_chars, output_chars);
    let one_breath_cue = request.one_breath.then(|| one_breath_cue(&result.anchors));

    ResponseEnvelope {
        success: true,
        model,
        panic_level: request.panic_level,
        mode: request.mode,
        language: request.language.clone(),
        one_breath: request.one_breath,
        fallback_used: note.is_some(),
        data: RecallData {
            result,
            confidence,
            usage,
            language: request.language.clone(),
            one_breath_cue,
        },
        note: note.map(str::to_string),
    }
}

/// Degraded envelope: generic content, but the caller's language, panic
/// level and mode are preserved.
fn safe_envelope(request: &RecallRequest, model: String, note: &str) -> ResponseEnvelope {
    let result = output::safe_fallback();
    let output_chars = serde_json::to_string(&result)
        .map(|raw| raw.chars().count())
        .unwrap_or_default();
    envelope(request, model, result, output_chars, Some(note))
}
