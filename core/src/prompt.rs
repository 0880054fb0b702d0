use crate::recall::{PanicLevel, RecallRequest, StudyMode};

/// Notes beyond this many characters are not sent upstream.
pub const MAX_PROMPT_NOTES_CHARS: usize = 6000;

const ONE_BREATH_SEPARATOR: &str = " → ";

fn brevity_rule(level: PanicLevel) -> &'static str {
    match level {
        PanicLevel::Low => "Anchors may use up to 8 words; keep one concrete detail in each.",
        PanicLevel::Medium => "Anchors should use 4 to 7 words.",
        PanicLevel::High => "The user is in acute panic: anchors must use 3 to 5 words, no clauses.",
    }
}

fn compression_rule(mode: StudyMode) -> &'static str {
    match mode {
        StudyMode::Study => "Compress concept-first: each anchor names a concept and its key relation.",
        StudyMode::Exam => "Compress for exam answers: lead with the keyword an examiner looks for.",
        StudyMode::Revise => "Compress into memory hooks: vivid, sequential, easy to chain.",
    }
}

/// Build the generation prompt for a validated request.
pub fn build_prompt(request: &RecallRequest) -> String {
    let notes: String = request
        .text
        .trim()
        .chars()
        .take(MAX_PROMPT_NOTES_CHARS)
        .collect();

    format!(
        r#"You are an AI system designed for PANIC-SAFE academic recall.

The user already knows this content but is under stress.
DO NOT explain or teach.

TASK:
1. Generate exactly 5 ultra-short recall anchors (max 8 words each).
2. Generate 1 fallback recall chain: "If blank → remember X → leads to Y → leads to Z".
3. Name 1 common panic mistake to avoid, with a severity of low, medium or high.
4. Name the subject in at most 3 words.

RULES:
- {brevity}
- {compression}
- Write every value in the language with code "{language}".
- Reply with ONLY this JSON object, no markdown, no commentary:
{{"anchors": ["", "", "", "", ""], "fallback": "", "mistake": {{"text": "", "severity": "medium"}}, "subject": ""}}

CONTENT:
{notes}
"#,
        brevity = brevity_rule(request.panic_level),
        compression = compression_rule(request.mode),
        language = request.language,
    )
}

/// Single-line cue: the first word of each anchor, chained.
pub fn one_breath_cue(anchors: &[String]) -> String {
    anchors
        .iter()
        .filter_map(|anchor| {
            anchor
                .split_whitespace()
                .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
                .find(|word| !word.is_empty())
        })
        .collect::<Vec<_>>()
        .join(ONE_BREATH_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> RecallRequest {
        RecallRequest {
            text: text.to_string(),
            panic_level: PanicLevel::High,
            mode: StudyMode::Exam,
            language: "de".to_string(),
            one_breath: false,
            verification_token: None,
            requested_model: None,
        }
    }

    #[test]
    fn prompt_carries_tuning_language_and_notes() {
        let prompt = build_prompt(&request("  Photosynthesis converts light into chemical energy.  "));
        assert!(prompt.contains("acute panic"));
        assert!(prompt.contains("exam answers"));
        assert!(prompt.contains("code \"de\""));
        assert!(prompt.contains("CONTENT:\nPhotosynthesis converts light into chemical energy.\n"));
        assert!(prompt.contains(r#"{"anchors": ["#));
    }

    #[test]
    fn prompt_truncates_long_notes() {
        let prompt = build_prompt(&request(&"x".repeat(MAX_PROMPT_NOTES_CHARS + 500)));
        assert!(prompt.contains(&"x".repeat(MAX_PROMPT_NOTES_CHARS)));
        assert!(!prompt.contains(&"x".repeat(MAX_PROMPT_NOTES_CHARS + 1)));
    }

    #[test]
    fn one_breath_cue_chains_first_words() {
        let anchors = vec![
            "Glycolysis: splits glucose".to_string(),
            "\"Pyruvate\" enters matrix".to_string(),
            "— Krebs makes NADH".to_string(),
            "ETC pumps protons".to_string(),
            "ATP synthase spins".to_string(),
        ];
        assert_eq!(
            one_breath_cue(&anchors),
            "Glycolysis → Pyruvate → Krebs → ETC → ATP"
        );
    }
}
