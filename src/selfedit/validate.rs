use serde_json::{Map, Value};
use thiserror::Error;

use super::types::SelfEdit;

pub const MAX_QUESTION_LEN: usize = 240;
pub const MAX_ANSWER_LEN: usize = 4000;
pub const MIN_QUESTION_WORDS: usize = 3;
pub const MIN_ANSWER_WORDS: usize = 2;

pub const DEFAULT_SOURCE: &str = "unknown";

// Accepted keys, highest priority first.
const QUESTION_KEYS: &[&str] = &["question", "q", "Question"];
const ANSWER_KEYS: &[&str] = &["answer", "a", "Answer"];
const SOURCE_KEYS: &[&str] = &["source", "src", "Source"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("{0} is empty after cleaning")]
    EmptyField(&'static str),

    #[error("{field} too short / not informative ({words} words, need {min})")]
    TooShort {
        field: &'static str,
        words: usize,
        min: usize,
    },
}

/// Clean and validate an untrusted candidate into a canonical self-edit.
pub fn validate_self_edit(candidate: &Value) -> Result<SelfEdit, ValidationError> {
    let obj = candidate
        .as_object()
        .ok_or(ValidationError::InvalidInput("self-edit must be a JSON object"))?;

    let (Some(question), Some(answer)) = (lookup(obj, QUESTION_KEYS), lookup(obj, ANSWER_KEYS))
    else {
        return Err(ValidationError::InvalidInput(
            "self-edit missing 'question' or 'answer' fields",
        ));
    };
    let source = lookup(obj, SOURCE_KEYS).unwrap_or_default();

    let question = clean_text(&question);
    let answer = clean_text(&answer);
    let source = match clean_text(&source) {
        s if s.is_empty() => DEFAULT_SOURCE.to_string(),
        s => s,
    };

    if question.is_empty() {
        return Err(ValidationError::EmptyField("question"));
    }
    if answer.is_empty() {
        return Err(ValidationError::EmptyField("answer"));
    }

    let question = truncate_at_word(&question, MAX_QUESTION_LEN);
    let answer = truncate_at_word(&answer, MAX_ANSWER_LEN);

    require_words("question", &question, MIN_QUESTION_WORDS)?;
    require_words("answer", &answer, MIN_ANSWER_WORDS)?;

    Ok(SelfEdit {
        question,
        answer,
        source,
    })
}

/// First alias holding a usable value. Null and empty strings count as absent.
fn lookup(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    })
}

/// Drop C0 control characters and DEL, collapse whitespace runs, trim.
pub fn clean_text(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| !matches!(*c, '\u{0}'..='\u{1f}' | '\u{7f}'))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `text` to at most `max_chars` characters without leaving a partial
/// trailing word. A single word longer than the limit is hard-cut.
pub fn truncate_at_word(text: &str, max_chars: usize) -> String {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let head = &text[..cut];
    let on_boundary = text[cut..].starts_with(char::is_whitespace);

    let kept = if on_boundary {
        head
    } else {
        match head.rfind(char::is_whitespace) {
            Some(i) => &head[..i],
            None => head,
        }
    };
    kept.trim_end().to_string()
}

fn require_words(field: &'static str, text: &str, min: usize) -> Result<(), ValidationError> {
    let words = text.split_whitespace().count();
    if words < min {
        return Err(ValidationError::TooShort { field, words, min });
    }
    Ok(())
}
