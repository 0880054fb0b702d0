//! Generation orchestration: one call to the upstream under a timeout, with a
//! single fallback attempt when the preferred model is unknown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Known-good model identifiers, most preferred first.
pub const PREFERRED_FALLBACK_MODELS: &[&str] = &[
    "gemini-2.0-flash",
    "gemini-1.5-flash",
    "gemini-1.5-flash-latest",
    "gemini-1.5-pro",
    "gemini-pro",
];

const GENERATE_METHOD: &str = "generateContent";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    #[error("model '{model}' is unavailable: {message}")]
    ModelUnavailable { model: String, message: String },
    #[error("model discovery failed with status {status}: {message}")]
    Discovery { status: u16, message: String },
    #[error("no fallback model available after '{attempted}' was rejected")]
    NoFallbackModel { attempted: String },
    #[error("generation upstream returned status {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("generation upstream unreachable: {0}")]
    Transport(String),
    #[error("generation upstream returned no text")]
    EmptyResponse,
    #[error("generation upstream returned an undecodable body: {0}")]
    InvalidBody(String),
    #[error("generation credential is not configured")]
    MissingCredential,
    #[error("generation task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Bare identifier, without the `models/` prefix
    pub id: String,
    pub supported_methods: Vec<String>,
}

impl ModelDescriptor {
    pub fn supports_generation(&self) -> bool {
        self.supported_methods.iter().any(|m| m == GENERATE_METHOD)
    }
}

/// The external text-generation service.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate_content(&self, model: &str, prompt: &str) -> Result<String, GenerationError>;

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, GenerationError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub text: String,
    pub model: String,
}

/// Pick a replacement model: first preferred identifier that is available,
/// else the first available one. Already-attempted identifiers are skipped.
pub fn pick_fallback_model(models: &[ModelDescriptor], attempted: &[&str]) -> Option<String> {
    let candidates: Vec<&str> = models
        .iter()
        .filter(|model| model.supports_generation())
        .map(|model| model.id.as_str())
        .filter(|id| !attempted.contains(id))
        .collect();

    PREFERRED_FALLBACK_MODELS
        .iter()
        .find(|preferred| candidates.contains(*preferred))
        .copied()
        .or_else(|| candidates.first().copied())
        .map(str::to_string)
}

#[derive(Clone)]
pub struct GenerationOrchestrator {
    backend: Arc<dyn GenerationBackend>,
    timeout: Duration,
}

impl GenerationOrchestrator {
    pub fn new(backend: Arc<dyn GenerationBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Generate raw text for `prompt`, first settled wins against the timer.
    ///
    /// The generation runs as its own task. On timeout the task is detached,
    /// not cancelled: the upstream call has no cancellation primitive, and
    /// its eventual result is ignored.
    pub async fn generate(
        &self,
        prompt: String,
        preferred_model: String,
    ) -> Result<Generated, GenerationError> {
        let backend = self.backend.clone();
        let task = tokio::spawn(generate_with_fallback(backend, prompt, preferred_model));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(GenerationError::Task(join_error.to_string())),
            Err(_) => Err(GenerationError::Timeout {
                after_ms: self.timeout.as_millis().min(u64::MAX as u128) as u64,
            }),
        }
    }
}

async fn generate_with_fallback(
    backend: Arc<dyn GenerationBackend>,
    prompt: String,
    preferred_model: String,
) -> Result<Generated, GenerationError> {
    match backend.generate_content(&preferred_model, &prompt).await {
        Ok(text) => Ok(Generated {
            text,
            model: preferred_model,
        }),
        Err(GenerationError::ModelUnavailable { message, .. }) => {
            let models = backend.list_models().await?;
            let fallback = pick_fallback_model(&models, &[preferred_model.as_str()]).ok_or_else(
                || GenerationError::NoFallbackModel {
                    attempted: preferred_model.clone(),
                },
            )?;
            tracing::warn!(
                event = "model_fallback",
                requested = %preferred_model,
                fallback = %fallback,
                reason = %message,
                "Preferred model unavailable, retrying once with fallback"
            );
            let text = backend.generate_content(&fallback, &prompt).await?;
            Ok(Generated {
                text,
                model: fallback,
            })
        }
        Err(other) => Err(other),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Scripted backend: pops one reply per generate call and records the
    /// model of each call.
    pub struct ScriptedBackend {
        pub replies: Mutex<Vec<Result<String, GenerationError>>>,
        pub models: Result<Vec<ModelDescriptor>, (u16, String)>,
        pub calls: Mutex<Vec<String>>,
        pub hang: bool,
    }

    impl ScriptedBackend {
        pub fn replying(replies: Vec<Result<String, GenerationError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                models: Ok(Vec::new()),
                calls: Mutex::new(Vec::new()),
                hang: false,
            }
        }

        pub fn hanging() -> Self {
            Self {
                hang: true,
                ..Self::replying(Vec::new())
            }
        }

        pub fn with_models(mut self, ids: &[&str]) -> Self {
            self.models = Ok(ids
                .iter()
                .map(|id| ModelDescriptor {
                    id: id.to_string(),
                    supported_methods: vec![GENERATE_METHOD.to_string()],
                })
                .collect());
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        async fn generate_content(
            &self,
            model: &str,
            _prompt: &str,
        ) -> Result<String, GenerationError> {
            self.calls.lock().expect("calls lock").push(model.to_string());
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.replies
                .lock()
                .expect("replies lock")
                .pop()
                .unwrap_or(Err(GenerationError::EmptyResponse))
        }

        async fn list_models(&self) -> Result<Vec<ModelDescriptor>, GenerationError> {
            self.models
                .clone()
                .map_err(|(status, message)| GenerationError::Discovery { status, message })
        }
    }

    pub fn unavailable(model: &str) -> GenerationError {
        GenerationError::ModelUnavailable {
            model: model.to_string(),
            message: "is not found for API version v1beta".to_string(),
        }
    }
}
