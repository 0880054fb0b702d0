//! Field-level validation of the recall request body.

use std::sync::LazyLock;

use recallbridge_core::recall::{MIN_TEXT_CHARS, PanicLevel, RecallRequest, StudyMode};
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::gate::is_truthy;

static LANGUAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-[a-z]{2})?$").expect("valid language regex"));
static MODEL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9.\-]{0,63}$").expect("valid model id regex"));

const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, PartialEq)]
pub enum InputOutcome {
    Valid(RecallRequest),
    /// Short text on a request already classified as warmup.
    Warmup,
}

/// Validate the parsed body and apply defaults.
///
/// `warmup_classified` turns the short-text failure into a warmup outcome.
pub fn validate(body: Option<&Value>, warmup_classified: bool) -> Result<InputOutcome, AppError> {
    let empty = Map::new();
    let fields = match body {
        Some(Value::Object(map)) => map,
        None if warmup_classified => &empty,
        _ => {
            return Err(AppError::validation(
                "body",
                "Request body must be a JSON object",
            ));
        }
    };

    let text = fields
        .get("text")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if text.chars().count() < MIN_TEXT_CHARS {
        if warmup_classified {
            return Ok(InputOutcome::Warmup);
        }
        return Err(AppError::validation(
            "text",
            "Input text too short for recall generation",
        ));
    }

    let panic_level = match present(fields, "panicLevel") {
        None => PanicLevel::default(),
        Some(value) => value
            .as_str()
            .and_then(PanicLevel::parse)
            .ok_or_else(|| invalid("panicLevel", "panicLevel must be one of low, medium, high", value))?,
    };

    let mode = match present(fields, "mode") {
        None => StudyMode::default(),
        Some(value) => value
            .as_str()
            .and_then(StudyMode::parse)
            .ok_or_else(|| invalid("mode", "mode must be one of study, exam, revise", value))?,
    };

    let language = match present(fields, "language") {
        None => DEFAULT_LANGUAGE.to_string(),
        Some(value) => value
            .as_str()
            .map(|lang| lang.trim().to_ascii_lowercase())
            .filter(|lang| LANGUAGE_RE.is_match(lang))
            .ok_or_else(|| {
                invalid(
                    "language",
                    "language must be an ISO 639-1 code such as \"en\" or \"pt-br\"",
                    value,
                )
            })?,
    };

    let one_breath = fields.get("oneBreath").is_some_and(is_truthy);

    let requested_model = match present(fields, "model") {
        None => None,
        Some(value) => Some(
            value
                .as_str()
                .map(|model| {
                    let model = model.trim().to_ascii_lowercase();
                    model.strip_prefix("models/").map(str::to_string).unwrap_or(model)
                })
                .filter(|model| MODEL_ID_RE.is_match(model))
                .ok_or_else(|| invalid("model", "model is not a valid model identifier", value))?,
        ),
    };

    let verification_token = fields
        .get("recaptchaToken")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    Ok(InputOutcome::Valid(RecallRequest {
        text: text.to_string(),
        panic_level,
        mode,
        language,
        one_breath,
        verification_token,
        requested_model,
    }))
}

/// A field counts as absent only when missing or null. A blank string is
/// present and must pass validation like any other value.
fn present<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|value| !value.is_null())
}

fn invalid(field: &str, message: &str, received: &Value) -> AppError {
    AppError::Validation {
        message: message.to_string(),
        field: Some(field.to_string()),
        received: Some(received.clone()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const NOTES: &str = "Osmosis moves water across a semi-permeable membrane.";

    fn valid(body: Value) -> RecallRequest {
        match validate(Some(&body), false).expect("body should validate") {
            InputOutcome::Valid(request) => request,
            InputOutcome::Warmup => panic!("unexpected warmup outcome"),
        }
    }

    fn rejected_field(body: Value) -> Option<String> {
        match validate(Some(&body), false) {
            Err(AppError::Validation { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn applies_defaults() {
        let request = valid(json!({ "text": NOTES }));
        assert_eq!(request.panic_level, PanicLevel::Medium);
        assert_eq!(request.mode, StudyMode::Revise);
        assert_eq!(request.language, "en");
        assert!(!request.one_breath);
        assert_eq!(request.requested_model, None);
        assert_eq!(request.verification_token, None);
    }

    #[test]
    fn accepts_explicit_fields() {
        let request = valid(json!({
            "text": format!("  {NOTES}  "),
            "panicLevel": "HIGH",
            "mode": "exam",
            "language": "pt-BR",
            "oneBreath": "yes",
            "model": "models/gemini-1.5-pro",
            "recaptchaToken": " tok "
        }));
        assert_eq!(request.text, NOTES);
        assert_eq!(request.panic_level, PanicLevel::High);
        assert_eq!(request.mode, StudyMode::Exam);
        assert_eq!(request.language, "pt-br");
        assert!(request.one_breath);
        assert_eq!(request.requested_model.as_deref(), Some("gemini-1.5-pro"));
        assert_eq!(request.verification_token.as_deref(), Some("tok"));
    }

    #[test]
    fn one_breath_coercion() {
        assert!(valid(json!({ "text": NOTES, "oneBreath": true })).one_breath);
        assert!(valid(json!({ "text": NOTES, "oneBreath": 1 })).one_breath);
        assert!(!valid(json!({ "text": NOTES, "oneBreath": "false" })).one_breath);
        assert!(!valid(json!({ "text": NOTES, "oneBreath": 0 })).one_breath);
    }

    #[test]
    fn rejects_short_or_missing_text() {
        assert_eq!(rejected_field(json!({ "text": "too short" })).as_deref(), Some("text"));
        assert_eq!(rejected_field(json!({})).as_deref(), Some("text"));
        assert_eq!(
            rejected_field(json!({ "text": "                       x" })).as_deref(),
            Some("text")
        );
        assert_eq!(rejected_field(json!({ "text": 12345 })).as_deref(), Some("text"));
    }

    #[test]
    fn rejects_invalid_enums_and_formats() {
        assert_eq!(
            rejected_field(json!({ "text": NOTES, "panicLevel": "extreme" })).as_deref(),
            Some("panicLevel")
        );
        assert_eq!(
            rejected_field(json!({ "text": NOTES, "mode": "cram" })).as_deref(),
            Some("mode")
        );
        assert_eq!(
            rejected_field(json!({ "text": NOTES, "language": "english" })).as_deref(),
            Some("language")
        );
        assert_eq!(
            rejected_field(json!({ "text": NOTES, "model": "../../etc/passwd" })).as_deref(),
            Some("model")
        );
    }

    #[test]
    fn null_fields_fall_back_to_defaults() {
        let request = valid(json!({ "text": NOTES, "panicLevel": null, "language": null }));
        assert_eq!(request.panic_level, PanicLevel::Medium);
        assert_eq!(request.language, "en");
    }

    #[test]
    fn blank_fields_are_rejected() {
        assert_eq!(
            rejected_field(json!({ "text": NOTES, "panicLevel": "" })).as_deref(),
            Some("panicLevel")
        );
        assert_eq!(
            rejected_field(json!({ "text": NOTES, "mode": "  " })).as_deref(),
            Some("mode")
        );
        assert_eq!(
            rejected_field(json!({ "text": NOTES, "language": "" })).as_deref(),
            Some("language")
        );
        assert_eq!(
            rejected_field(json!({ "text": NOTES, "model": "" })).as_deref(),
            Some("model")
        );
    }

    #[test]
    fn short_text_becomes_warmup_when_classified() {
        assert_eq!(
            validate(Some(&json!({ "text": "" })), true).expect("warmup should pass"),
            InputOutcome::Warmup
        );
        assert_eq!(
            validate(None, true).expect("warmup should pass"),
            InputOutcome::Warmup
        );
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(matches!(
            validate(Some(&json!(["text"])), false),
            Err(AppError::Validation { .. })
        ));
        assert!(matches!(validate(None, false), Err(AppError::Validation { .. })));
    }
}
