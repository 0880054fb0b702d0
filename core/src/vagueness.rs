//! Heuristic vagueness scoring for study notes.
//!
//! Each rule is a plain data record iterated uniformly, so new rules only
//! need a new entry in [`RULES`]. The analyzer is deterministic and pure.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::recall::{VaguenessAssessment, VaguenessTrigger, round2};

/// Only the head of the notes is scored.
pub const MAX_ANALYZED_CHARS: usize = 2000;

/// Scores at or above this value ask the user for clarification.
pub const CLARIFICATION_THRESHOLD: f64 = 0.45;

const MAX_COUNTED_MATCHES: usize = 3;
const MAX_REPORTED_TRIGGERS: usize = 4;
const ELLIPSIS_PENALTY: f64 = 0.10;
const SHORT_SENTENCE_PENALTY: f64 = 0.20;
const MIN_MEAN_SENTENCE_CHARS: f64 = 35.0;
const SHORT_FRAGMENT_CHARS: usize = 40;

const GENERIC_QUESTION: &str =
    "Which topic should these cues cover, and what exactly must you remember about it?";

/// A weighted pattern rule.
pub struct VaguenessRule {
    pub reason: &'static str,
    pub pattern: &'static str,
    pub weight: f64,
    /// Builds the clarifying question from the matched (lowercased) fragment.
    pub question: fn(&str) -> String,
}

pub static RULES: &[VaguenessRule] = &[
    VaguenessRule {
        reason: "hedging",
        pattern: r"(?i)\b(?:maybe|perhaps|probably|i think|i guess|sort of|kind of|not sure)\b",
        weight: 0.12,
        question: |fragment| {
            format!("You wrote \"{fragment}\". Which exact fact or definition do you need to recall?")
        },
    },
    VaguenessRule {
        reason: "filler_noun",
        pattern: r"(?i)\b(?:stuff|things?|something|whatever|anything)\b",
        weight: 0.15,
        question: |fragment| format!("Which specific concept does \"{fragment}\" refer to?"),
    },
    VaguenessRule {
        reason: "indefinite_collection",
        pattern: r"(?i)\b(?:various|several|many|some|a few|lots of|a lot of)\s+(?:things|topics|concepts|ideas|stuff|points|details)\b",
        weight: 0.20,
        question: |fragment| format!("Can you name the {fragment} one by one?"),
    },
    VaguenessRule {
        reason: "open_ended_tail",
        pattern: r"(?i)\b(?:and so on|and so forth|and the like|and more|or something)\b",
        weight: 0.18,
        question: |fragment| {
            format!("What belongs after \"{fragment}\"? List the remaining items.")
        },
    },
    VaguenessRule {
        reason: "etcetera",
        pattern: r"(?i)\betc\.",
        weight: 0.15,
        question: |_| "What does \"etc.\" stand for here? List the missing items.".to_string(),
    },
];

static COMPILED_RULES: LazyLock<Vec<(&'static VaguenessRule, Regex)>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|rule| (rule, Regex::new(rule.pattern).expect("valid vagueness rule regex")))
        .collect()
});

struct Finding {
    reason: &'static str,
    fragment: String,
    question: String,
}

/// Score how underspecified `text` is.
pub fn analyze(text: &str) -> VaguenessAssessment {
    let sample: String = text.chars().take(MAX_ANALYZED_CHARS).collect();
    let mut score = 0.0;
    let mut findings: Vec<Finding> = Vec::new();

    for (rule, regex) in COMPILED_RULES.iter() {
        let matches: Vec<&str> = regex.find_iter(&sample).map(|m| m.as_str()).collect();
        if matches.is_empty() {
            continue;
        }
        let counted = matches.len().min(MAX_COUNTED_MATCHES);
        score += (rule.weight * counted as f64).min(1.0);
        for matched in matches.into_iter().take(MAX_COUNTED_MATCHES) {
            let fragment = matched.trim().to_lowercase();
            findings.push(Finding {
                reason: rule.reason,
                question: (rule.question)(&fragment),
                fragment,
            });
        }
    }

    if sample.contains("...") || sample.contains('…') {
        score += ELLIPSIS_PENALTY;
    }

    if mean_sentence_chars(&sample) < MIN_MEAN_SENTENCE_CHARS {
        score += SHORT_SENTENCE_PENALTY;
        findings.push(Finding {
            reason: "too_short_for_context",
            fragment: sample
                .trim()
                .chars()
                .take(SHORT_FRAGMENT_CHARS)
                .collect::<String>()
                .to_lowercase(),
            question: "Add a sentence or two of context: which topic, chapter, or exam are these notes for?"
                .to_string(),
        });
    }

    let findings = dedupe(findings);
    let clarifying_question = findings
        .first()
        .map(|finding| finding.question.clone())
        .filter(|question| !question.trim().is_empty())
        .unwrap_or_else(|| GENERIC_QUESTION.to_string());

    let score = round2(score.clamp(0.0, 1.0));
    VaguenessAssessment {
        score,
        triggers: findings
            .into_iter()
            .take(MAX_REPORTED_TRIGGERS)
            .map(|finding| VaguenessTrigger {
                reason: finding.reason.to_string(),
                fragment: finding.fragment,
            })
            .collect(),
        needs_clarification: score >= CLARIFICATION_THRESHOLD,
        clarifying_question,
    }
}

/// Characters per sentence; sentences are delimited by `.`, `!` or `?`.
fn mean_sentence_chars(sample: &str) -> f64 {
    let trimmed = sample.trim();
    let sentences = trimmed
        .split(['.', '!', '?'])
        .filter(|sentence| !sentence.trim().is_empty())
        .count()
        .max(1);
    trimmed.chars().count() as f64 / sentences as f64
}

fn dedupe(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen: HashSet<(&'static str, String)> = HashSet::new();
    findings
        .into_iter()
        .filter(|finding| seen.insert((finding.reason, finding.fragment.clone())))
        .collect()
}
