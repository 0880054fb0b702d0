use serde::Deserialize;

use crate::config::VerificationConfig;

#[derive(Debug, Deserialize)]
struct RecaptchaVerifyResponse {
    success: bool,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    action: Option<String>,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub success: bool,
    pub score: Option<f64>,
    pub error: Option<String>,
}

impl Verification {
    fn passed(score: Option<f64>) -> Self {
        Self {
            success: true,
            score,
            error: None,
        }
    }

    fn failed(score: Option<f64>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            score,
            error: Some(error.into()),
        }
    }
}

/// Optional bot check against reCAPTCHA. Without a configured secret every
/// request passes.
#[derive(Clone)]
pub struct HumanVerifier {
    config: Option<VerificationConfig>,
    http: reqwest::Client,
}

impl HumanVerifier {
    pub fn new(config: Option<VerificationConfig>, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self::new(None, reqwest::Client::new())
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Verify `token`. Network and decode failures fail closed and are logged.
    pub async fn verify(&self, token: Option<&str>, remote_ip: Option<&str>) -> Verification {
        let Some(config) = &self.config else {
            return Verification::passed(None);
        };

        let Some(token) = token.map(str::trim).filter(|value| !value.is_empty()) else {
            return Verification::failed(None, "missing-input-response");
        };

        let mut form = vec![("secret", config.secret.as_str()), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let response = match self
            .http
            .post(config.verify_url.clone())
            .form(&form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "reCAPTCHA verification request failed");
                return Verification::failed(None, "verification-unavailable");
            }
        };

        if !response.status().is_success() {
            tracing::warn!(
                status = %response.status(),
                "reCAPTCHA verification request returned non-success status"
            );
            return Verification::failed(None, format!("http-{}", response.status().as_u16()));
        }

        match response.json::<RecaptchaVerifyResponse>().await {
            Ok(verification) => evaluate(verification, config.min_score),
            Err(e) => {
                tracing::warn!(error = %e, "reCAPTCHA verification response was not valid JSON");
                Verification::failed(None, "invalid-verification-response")
            }
        }
    }
}

fn evaluate(verification: RecaptchaVerifyResponse, min_score: f64) -> Verification {
    if !verification.success {
        tracing::warn!(
            error_codes = ?verification.error_codes,
            "reCAPTCHA verification returned unsuccessful response"
        );
        let error = verification
            .error_codes
            .first()
            .cloned()
            .unwrap_or_else(|| "verification-denied".to_string());
        return Verification::failed(verification.score, error);
    }

    if let Some(score) = verification.score {
        if score < min_score {
            tracing::warn!(
                score,
                min_score,
                action = verification.action.as_deref().unwrap_or("<missing>"),
                "reCAPTCHA score below minimum"
            );
            return Verification::failed(Some(score), "low-score");
        }
    }

    Verification::passed(verification.score)
}
