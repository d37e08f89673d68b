use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A validated question/answer pair, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfEdit {
    pub question: String,
    pub answer: String,
    pub source: String,
}

/// One line of `self_edits.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSelfEdit {
    pub question: String,
    pub answer: String,
    pub source: String,
    /// UTC, ISO-8601 with a `Z` suffix.
    pub created_at: String,
}

impl StoredSelfEdit {
    pub fn stamp(edit: &SelfEdit) -> Self {
        Self {
            question: edit.question.clone(),
            answer: edit.answer.clone(),
            source: edit.source.clone(),
            created_at: utc_timestamp(),
        }
    }
}

/// What the reviewer sees. Built leniently from whatever a log line holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewEntry {
    pub question: String,
    pub answer: String,
    pub source: String,
    pub created_at: Option<String>,
}

impl ReviewEntry {
    pub fn from_json(entry: &Map<String, Value>) -> Self {
        let text = |key: &str| entry.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            question: text("question").unwrap_or_default(),
            answer: text("answer").unwrap_or_default(),
            source: text("source").unwrap_or_default(),
            created_at: text("created_at"),
        }
    }
}

impl From<&StoredSelfEdit> for ReviewEntry {
    fn from(stored: &StoredSelfEdit) -> Self {
        Self {
            question: stored.question.clone(),
            answer: stored.answer.clone(),
            source: stored.source.clone(),
            created_at: Some(stored.created_at.clone()),
        }
    }
}

/// Scores accepted from the model after clipping and recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewScores {
    pub accuracy: f64,
    pub clarity: f64,
    pub novelty: f64,
    pub score: f64,
    pub approved: bool,
    pub remarks: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_model_output: Option<String>,
    pub parsed_model_json: Map<String, Value>,
}

/// A review that could not be scored. Kept for manual triage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewFailure {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Map<String, Value>>,
    pub debug_output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReviewResult {
    Failed(ReviewFailure),
    Scored(ReviewScores),
}

impl ReviewResult {
    pub fn status(&self) -> ReviewStatus {
        match self {
            ReviewResult::Scored(_) => ReviewStatus::Ok,
            ReviewResult::Failed(_) => ReviewStatus::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Ok,
    Error,
}

/// One line of `self_edits_reviewed.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewedRecord {
    pub question: String,
    pub answer: String,
    pub source: String,
    pub created_at: Option<String>,
    pub reviewed_at: String,
    pub review: ReviewResult,
    pub review_status: ReviewStatus,
}

impl ReviewedRecord {
    pub fn new(entry: ReviewEntry, review: ReviewResult) -> Self {
        let source = if entry.source.is_empty() {
            "unknown".to_string()
        } else {
            entry.source
        };
        Self {
            question: entry.question,
            answer: entry.answer,
            source,
            created_at: entry.created_at,
            reviewed_at: utc_timestamp(),
            review_status: review.status(),
            review,
        }
    }
}

pub fn utc_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
