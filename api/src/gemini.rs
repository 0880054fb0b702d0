//! Gemini REST client implementing [`GenerationBackend`].

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::generation::{GenerationBackend, GenerationError, ModelDescriptor};

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<RemoteModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteModel {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, base_url: Url, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url,
            api_key,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    fn api_key(&self) -> Result<&str, GenerationError> {
        self.api_key
            .as_deref()
            .ok_or(GenerationError::MissingCredential)
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    async fn generate_content(&self, model: &str, prompt: &str) -> Result<String, GenerationError> {
        let api_key = self.api_key()?;
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 0.4,
                "responseMimeType": "application/json"
            }
        });

        let response = self
            .http
            .post(self.endpoint(&format!("models/{model}:generateContent")))
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            if is_model_unavailable(status, &message) {
                return Err(GenerationError::ModelUnavailable {
                    model: model.to_string(),
                    message,
                });
            }
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let parsed = response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| GenerationError::InvalidBody(e.without_url().to_string()))?;
        extract_text(parsed)
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, GenerationError> {
        let api_key = self.api_key()?;
        let response = self
            .http
            .get(self.endpoint("models"))
            .query(&[("key", api_key), ("pageSize", "1000")])
            .send()
            .await
            .map_err(|e| GenerationError::Discovery {
                status: 0,
                message: e.without_url().to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Discovery {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        let parsed = response
            .json::<ListModelsResponse>()
            .await
            .map_err(|e| GenerationError::Discovery {
                status: status.as_u16(),
                message: e.without_url().to_string(),
            })?;

        Ok(parsed
            .models
            .into_iter()
            .map(|model| ModelDescriptor {
                id: model
                    .name
                    .strip_prefix("models/")
                    .unwrap_or(&model.name)
                    .to_string(),
                supported_methods: model.supported_generation_methods,
            })
            .collect())
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, GenerationError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(text)
}

fn is_model_unavailable(status: StatusCode, message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    status == StatusCode::NOT_FOUND
        || (status == StatusCode::BAD_REQUEST
            && (message.contains("not found") || message.contains("not supported")))
}

async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) => serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .ok()
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| format!("HTTP {status}")),
        Err(_) => format!("HTTP {status}"),
    }
}
