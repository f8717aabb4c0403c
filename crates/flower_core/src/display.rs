//! Text rendering of outcomes for observers.

use crate::state::ClassificationOutcome;

/// Uppercase the first letter of every whitespace-separated word and
/// lowercase the rest.
pub fn title_case(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut at_word_start = true;
    for ch in label.chars() {
        if ch.is_whitespace() {
            at_word_start = true;
            out.push(ch);
        } else if at_word_start {
            at_word_start = false;
            out.extend(ch.to_uppercase());
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// Confidence as a percentage with one decimal, e.g. `87.0%`.
pub fn format_confidence(confidence: f32) -> String {
    format!("{:.1}%", confidence * 100.0)
}

/// Placeholder, progress, result or error text for `outcome`.
pub fn render(outcome: &ClassificationOutcome) -> String {
    match outcome {
        ClassificationOutcome::Idle => "Select an image to classify.".to_string(),
        ClassificationOutcome::Running => "Identifying flower...".to_string(),
        ClassificationOutcome::Succeeded {
            display_label,
            confidence,
        } => format!(
            "Flower: {}\nConfidence: {}",
            title_case(display_label),
            format_confidence(*confidence)
        ),
        ClassificationOutcome::Failed { message, .. } => message.clone(),
    }
}
