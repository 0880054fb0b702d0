//! Strict validation of the generation upstream's free-text output.

use serde_json::Value;
use thiserror::Error;

use crate::recall::{ANCHOR_COUNT, GenerationResult, Mistake, Severity};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutputError {
    #[error("model output contains no JSON object")]
    NoJsonObject,
    #[error("model output is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("anchors must be exactly 5 non-empty strings, got {0}")]
    Anchors(String),
    #[error("field '{0}' is missing or blank")]
    MissingField(&'static str),
}

/// Parse and validate raw model text against the output contract.
///
/// Markdown code fences are stripped and the outermost `{...}` is isolated
/// before parsing, since models often wrap JSON in prose or fences.
pub fn validate(raw: &str) -> Result<GenerationResult, OutputError> {
    let stripped = strip_fences(raw);
    let object = isolate_object(&stripped).ok_or(OutputError::NoJsonObject)?;
    let value: Value =
        serde_json::from_str(object).map_err(|e| OutputError::InvalidJson(e.to_string()))?;

    let anchors = parse_anchors(value.get("anchors"))?;
    let fallback = non_blank(value.get("fallback")).ok_or(OutputError::MissingField("fallback"))?;
    let mistake = parse_mistake(value.get("mistake"))?;
    let subject = non_blank(value.get("subject")).ok_or(OutputError::MissingField("subject"))?;

    Ok(GenerationResult {
        anchors,
        fallback,
        mistake,
        subject,
    })
}

/// Hand-authored payload returned whenever upstream output cannot be trusted.
pub fn safe_fallback() -> GenerationResult {
    GenerationResult {
        anchors: vec![
            "Breathe, then name the topic".to_string(),
            "Recall the first key term".to_string(),
            "Link that term to one example".to_string(),
            "State the main rule or cause".to_string(),
            "Finish with the end result".to_string(),
        ],
        fallback: "If blank → breathe out slowly → name the topic → recall one example → rebuild the steps"
            .to_string(),
        mistake: Mistake {
            text: "Writing everything at once before recalling the core idea".to_string(),
            severity: Severity::Medium,
        },
        subject: "General".to_string(),
    }
}

fn strip_fences(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn isolate_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn non_blank(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_anchors(value: Option<&Value>) -> Result<Vec<String>, OutputError> {
    let items = value
        .and_then(Value::as_array)
        .ok_or_else(|| OutputError::Anchors("no array".to_string()))?;
    if items.len() != ANCHOR_COUNT {
        return Err(OutputError::Anchors(items.len().to_string()));
    }
    items
        .iter()
        .map(|item| non_blank(Some(item)))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| OutputError::Anchors("a blank or non-string entry".to_string()))
}

fn parse_mistake(value: Option<&Value>) -> Result<Mistake, OutputError> {
    match value {
        Some(Value::Object(map)) => {
            let text = non_blank(map.get("text")).ok_or(OutputError::MissingField("mistake.text"))?;
            Ok(Mistake {
                text,
                severity: Severity::normalize(map.get("severity").and_then(Value::as_str)),
            })
        }
        // A bare string is accepted as the mistake text.
        Some(other @ Value::String(_)) => non_blank(Some(other))
            .map(|text| Mistake {
                text,
                severity: Severity::Medium,
            })
            .ok_or(OutputError::MissingField("mistake.text")),
        _ => Err(OutputError::MissingField("mistake")),
    }
}
