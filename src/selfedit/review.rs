use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::extract::parse_object_lenient;
use super::types::{ReviewEntry, ReviewFailure, ReviewResult, ReviewScores};
use crate::llm::LanguageModel;

/// Score at or above which a review counts as approved by default.
pub const APPROVAL_THRESHOLD: f64 = 0.70;

pub const ACCURACY_WEIGHT: f64 = 0.5;
pub const CLARITY_WEIGHT: f64 = 0.3;
pub const NOVELTY_WEIGHT: f64 = 0.2;

pub const MAX_REMARKS_LEN: usize = 200;

pub const PARSE_FAILED: &str = "failed to parse JSON from model response";
pub const MALFORMED_FIELDS: &str = "parsed JSON missing numeric fields or wrong type";

/// Stable scoring prompt for one entry. Same entry, same prompt.
pub fn review_prompt(entry: &ReviewEntry) -> String {
    let source = if entry.source.is_empty() {
        "unknown"
    } else {
        entry.source.as_str()
    };
    let created = entry.created_at.as_deref().unwrap_or("");

    format!(
        r#"You are a strict technical reviewer. Evaluate the following Question / Answer pair for quality as a training example.
Respond ONLY with a single JSON object (no extra text) with these keys:
  - accuracy: float between 0.0 and 1.0 (how factually correct the answer is)
  - clarity: float between 0.0 and 1.0 (how clear and unambiguous the Q/A are)
  - novelty: float between 0.0 and 1.0 (how much new factual content this Q/A provides; not the same as wording)
  - score: float between 0.0 and 1.0 (weighted aggregate; weights: accuracy {ACCURACY_WEIGHT:.1}, clarity {CLARITY_WEIGHT:.1}, novelty {NOVELTY_WEIGHT:.1})
  - approved: boolean (true if score >= {APPROVAL_THRESHOLD:.2})
  - remarks: one-sentence justification (max 120 chars)

Important constraints:
  - Produce numeric values with two decimal places (e.g., 0.75).
  - Do NOT include markdown, lists, or explanatory text, only the JSON object.
  - If you cannot judge accuracy due to missing evidence, put accuracy=0.50 and explain briefly in remarks.

Here is the item to evaluate (do not access the web; use the provided data only):
Question: {question}
Answer: {answer}
Source: {source}
Created at: {created}

Output:"#,
        question = entry.question,
        answer = entry.answer,
    )
}

/// Ask the model to score one entry. Never fails: model and parse errors
/// come back as [`ReviewResult::Failed`] so the caller can persist them.
pub async fn review_entry(llm: &dyn LanguageModel, entry: &ReviewEntry) -> ReviewResult {
    let prompt = review_prompt(entry);
    let text = match llm.complete(&prompt).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Review model call failed: {:#}", e);
            return ReviewResult::Failed(ReviewFailure {
                error: format!("LLM invocation failed: {:#}", e),
                parsed: None,
                debug_output: None,
            });
        }
    };
    let result = score_response(&text);
    if let ReviewResult::Failed(failure) = &result {
        warn!(error = %failure.error, "review could not be scored");
    } else {
        debug!("review scored");
    }
    result
}

/// Turn raw model text into a review. The model's own `score` is ignored
/// and recomputed from the three components.
pub fn score_response(text: &str) -> ReviewResult {
    let Some(parsed) = parse_object_lenient(text) else {
        return ReviewResult::Failed(ReviewFailure {
            error: PARSE_FAILED.to_string(),
            parsed: None,
            debug_output: Some(text.to_string()),
        });
    };

    let fields = (
        component(&parsed, "accuracy"),
        component(&parsed, "clarity"),
        component(&parsed, "novelty"),
    );
    let (Some(accuracy), Some(clarity), Some(novelty)) = fields else {
        return ReviewResult::Failed(ReviewFailure {
            error: MALFORMED_FIELDS.to_string(),
            parsed: Some(parsed),
            debug_output: Some(text.to_string()),
        });
    };

    let score = round2(
        accuracy * ACCURACY_WEIGHT + clarity * CLARITY_WEIGHT + novelty * NOVELTY_WEIGHT,
    );
    // an explicit boolean from the model wins, even against the score
    let approved = parsed
        .get("approved")
        .and_then(Value::as_bool)
        .unwrap_or(score >= APPROVAL_THRESHOLD);
    let remarks = truncate_remarks(&remarks_text(parsed.get("remarks")));

    ReviewResult::Scored(ReviewScores {
        accuracy,
        clarity,
        novelty,
        score,
        approved,
        remarks,
        raw_model_output: None,
        parsed_model_json: parsed,
    })
}

/// Numeric (or numeric-string) field, clipped to [0, 1] and rounded.
fn component(parsed: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = match parsed.get(key)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !value.is_finite() {
        return None;
    }
    Some(round2(value.clamp(0.0, 1.0)))
}

/// Two decimals, exact halves to even (`0.125` -> `0.12`).
fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}

fn remarks_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    }
}

fn truncate_remarks(remarks: &str) -> String {
    if remarks.chars().count() <= MAX_REMARKS_LEN {
        return remarks.to_string();
    }
    let head: String = remarks.chars().take(MAX_REMARKS_LEN - 3).collect();
    format!("{}...", head.trim_end())
}
