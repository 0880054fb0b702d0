use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Minimum trimmed length (in characters) of the notes for a real request.
pub const MIN_TEXT_CHARS: usize = 20;

/// Number of anchors every result must carry.
pub const ANCHOR_COUNT: usize = 5;

/// Caller-declared stress intensity. Tunes anchor brevity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PanicLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl PanicLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Caller-declared study phase. Tunes compression style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StudyMode {
    Study,
    Exam,
    #[default]
    Revise,
}

impl StudyMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "study" => Some(Self::Study),
            "exam" => Some(Self::Exam),
            "revise" => Some(Self::Revise),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Study => "study",
            Self::Exam => "exam",
            Self::Revise => "revise",
        }
    }
}

/// Severity of the panic mistake. Unknown values normalize to `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    pub fn normalize(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("low") => Self::Low,
            Some("high") => Self::High,
            _ => Self::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CostTier {
    Low,
    Medium,
    High,
}

/// A validated recall request, after defaults have been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RecallRequest {
    pub text: String,
    pub panic_level: PanicLevel,
    pub mode: StudyMode,
    /// Lowercased ISO-639-1 code, optionally with a region (`en`, `pt-br`)
    pub language: String,
    pub one_breath: bool,
    pub verification_token: Option<String>,
    pub requested_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Mistake {
    pub text: String,
    pub severity: Severity,
}

/// The strict output contract the generation upstream must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GenerationResult {
    /// Exactly five non-empty recall cues
    pub anchors: Vec<String>,
    /// Fallback recall chain for when memory goes blank
    pub fallback: String,
    pub mistake: Mistake,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub tokens_estimated: u64,
    pub cost_tier: CostTier,
}

/// `GenerationResult` plus the derived fields sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecallData {
    #[serde(flatten)]
    pub result: GenerationResult,
    pub confidence: f64,
    pub usage: Usage,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_breath_cue: Option<String>,
}

/// Response body for generated (or safely degraded) cues.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub success: bool,
    pub model: String,
    pub panic_level: PanicLevel,
    pub mode: StudyMode,
    pub language: String,
    pub one_breath: bool,
    pub fallback_used: bool,
    pub data: RecallData,
    /// Present on degraded responses only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// One vagueness finding as exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, ToSchema)]
pub struct VaguenessTrigger {
    pub reason: String,
    pub fragment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaguenessAssessment {
    /// Heuristic score in [0, 1], rounded to 2 decimals
    pub score: f64,
    /// At most four findings, deduplicated by (reason, fragment)
    pub triggers: Vec<VaguenessTrigger>,
    pub needs_clarification: bool,
    pub clarifying_question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct VaguenessSummary {
    pub score: f64,
    pub triggers: Vec<VaguenessTrigger>,
}

/// Response body when the notes are too vague to produce reliable cues.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationResponse {
    pub success: bool,
    pub clarification_needed: bool,
    pub clarifying_question: String,
    pub vagueness: VaguenessSummary,
}

impl From<VaguenessAssessment> for ClarificationResponse {
    fn from(assessment: VaguenessAssessment) -> Self {
        Self {
            success: true,
            clarification_needed: true,
            clarifying_question: assessment.clarifying_question,
            vagueness: VaguenessSummary {
                score: assessment.score,
                triggers: assessment.triggers,
            },
        }
    }
}

/// Response body for warmup probes.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct WarmupResponse {
    pub success: bool,
    pub warmup: bool,
    /// RFC 3339 server time
    pub timestamp: String,
}

/// Round to two decimals, the precision used for every client-facing score.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!(PanicLevel::parse(" HIGH "), Some(PanicLevel::High));
        assert_eq!(StudyMode::parse("Exam"), Some(StudyMode::Exam));
        assert_eq!(PanicLevel::parse("extreme"), None);
        assert_eq!(StudyMode::parse("warmup"), None);
    }

    #[test]
    fn severity_normalizes_unknown_to_medium() {
        assert_eq!(Severity::normalize(Some("HIGH")), Severity::High);
        assert_eq!(Severity::normalize(Some("critical")), Severity::Medium);
        assert_eq!(Severity::normalize(None), Severity::Medium);
    }

    #[test]
    fn envelope_serializes_camel_case_and_flattens_result() {
        let envelope = ResponseEnvelope {
            success: true,
            model: "gemini-1.5-flash".to_string(),
            panic_level: PanicLevel::Low,
            mode: StudyMode::Exam,
            language: "en".to_string(),
            one_breath: false,
            fallback_used: false,
            data: RecallData {
                result: GenerationResult {
                    anchors: vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into()],
                    fallback: "If blank → a → b → c".into(),
                    mistake: Mistake {
                        text: "Skipping units".into(),
                        severity: Severity::High,
                    },
                    subject: "Physics".into(),
                },
                confidence: 0.7,
                usage: Usage {
                    tokens_estimated: 120,
                    cost_tier: CostTier::Low,
                },
                language: "en".to_string(),
                one_breath_cue: None,
            },
            note: None,
        };

        let value = serde_json::to_value(&envelope).expect("envelope should serialize");
        assert_eq!(value["panicLevel"], json!("low"));
        assert_eq!(value["fallbackUsed"], json!(false));
        assert_eq!(value["data"]["anchors"].as_array().map(Vec::len), Some(5));
        assert_eq!(value["data"]["mistake"]["severity"], json!("high"));
        assert_eq!(value["data"]["usage"]["costTier"], json!("low"));
        assert!(value["data"].get("oneBreathCue").is_none());
        assert!(value.get("note").is_none());
    }

    #[test]
    fn round2_rounds_half_away_from_zero() {
        assert_eq!(round2(0.449_999_999_999_999_96), 0.45);
        assert_eq!(round2(0.444), 0.44);
    }
}
