use crate::recall::{CostTier, PanicLevel, Usage, round2};

const BASE_CONFIDENCE: f64 = 0.55;
const MIN_CONFIDENCE: f64 = 0.35;
const MAX_CONFIDENCE: f64 = 0.98;

/// Confidence that the anchors will hold up, from input length, panic level
/// and how dense the anchors are.
pub fn confidence(input_chars: usize, panic_level: PanicLevel, anchors: &[String]) -> f64 {
    let mut score = BASE_CONFIDENCE;

    if input_chars > 600 {
        score += 0.25;
    } else if input_chars > 300 {
        score += 0.15;
    } else if input_chars < 120 {
        score -= 0.10;
    }

    match panic_level {
        PanicLevel::Low => score += 0.08,
        PanicLevel::High => score -= 0.05,
        PanicLevel::Medium => {}
    }

    if !anchors.is_empty() {
        let words: usize = anchors
            .iter()
            .map(|anchor| anchor.split_whitespace().count())
            .sum();
        let average = words as f64 / anchors.len() as f64;
        if average <= 6.0 {
            score += 0.05;
        } else if average > 9.0 {
            score -= 0.05;
        }
    }

    round2(score.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE))
}

/// Coarse token and cost estimate (four characters per token).
pub fn usage(input_chars: usize, output_chars: usize) -> Usage {
    let tokens_estimated = (((input_chars + output_chars) as f64) / 4.0).round().max(1.0) as u64;
    let cost_tier = match tokens_estimated {
        0..=800 => CostTier::Low,
        801..=2500 => CostTier::Medium,
        _ => CostTier::High,
    };
    Usage {
        tokens_estimated,
        cost_tier,
    }
}
