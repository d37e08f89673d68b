use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::extract::first_balanced_object;
use crate::llm::LanguageModel;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("model call failed: {0:#}")]
    Model(anyhow::Error),

    #[error("no JSON object in model output")]
    NoJson { raw: String },

    #[error("model output is not valid JSON: {source}")]
    BadJson {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing 'question' or 'answer' in generated JSON")]
    MissingKeys { raw: String },
}

impl GenerationError {
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            GenerationError::Model(_) => None,
            GenerationError::NoJson { raw }
            | GenerationError::BadJson { raw, .. }
            | GenerationError::MissingKeys { raw } => Some(raw),
        }
    }
}

pub fn self_edit_prompt(topic: &str, context: &str) -> String {
    format!(
        r#"You are a research assistant designed to generate a structured 'self-edit' for model improvement.

Topic: {topic}

Relevant context (if any): {context}

Create a concise, factual Q&A pair that represents new knowledge learned from this information.
Respond ONLY in strict JSON format like this:
{{
  "question": "<clear, factual question>",
  "answer": "<accurate answer>",
  "source": "<URL or 'summary' if no URL>"
}}"#
    )
}

/// Ask the model for a raw self-edit candidate. The result is untrusted and
/// still has to go through validation.
pub async fn try_generate(
    llm: &dyn LanguageModel,
    topic: &str,
    context: &str,
) -> Result<Value, GenerationError> {
    let prompt = self_edit_prompt(topic, context);
    let text = llm.complete(&prompt).await.map_err(GenerationError::Model)?;
    let text = text.trim();
    debug!(len = text.len(), "self-edit generator responded");

    let Some(json) = first_balanced_object(text) else {
        return Err(GenerationError::NoJson {
            raw: text.to_string(),
        });
    };
    let candidate: Value =
        serde_json::from_str(json).map_err(|source| GenerationError::BadJson {
            raw: text.to_string(),
            source,
        })?;

    let has_keys = candidate.get("question").is_some() && candidate.get("answer").is_some();
    if !has_keys {
        return Err(GenerationError::MissingKeys {
            raw: text.to_string(),
        });
    }
    Ok(candidate)
}

/// Like [`try_generate`], but failures are logged and become `None`.
pub async fn generate_self_edit(
    llm: &dyn LanguageModel,
    topic: &str,
    context: &str,
) -> Option<Value> {
    match try_generate(llm, topic, context).await {
        Ok(candidate) => Some(candidate),
        Err(e) => {
            warn!("Failed to generate or parse self-edit: {}", e);
            if let Some(raw) = e.raw_output() {
                warn!(raw_output = raw, "generator output");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;

    #[test]
    fn test_prompt_embeds_topic_and_context() {
        let prompt = self_edit_prompt("Hubble constant", "{\"results\": []}");
        assert!(prompt.contains("Topic: Hubble constant"));
        assert!(prompt.contains("Relevant context (if any): {\"results\": []}"));
        assert!(prompt.contains("\"question\": \"<clear, factual question>\""));
        assert_eq!(prompt, self_edit_prompt("Hubble constant", "{\"results\": []}"));
    }

    #[tokio::test]
    async fn test_generate_plain_json() {
        let llm = ScriptedModel::new([Some(
            r#"{"question": "What is the Hubble constant?", "answer": "About 67.4 km/s/Mpc.", "source": "summary"}"#,
        )]);
        let candidate = generate_self_edit(&llm, "Hubble", "").await.unwrap();
        assert_eq!(candidate["source"], "summary");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_generate_json_wrapped_in_prose() {
        let llm = ScriptedModel::new([Some(
            "Sure, here it is:\n```json\n{\"q\": \"x\", \"question\": \"Q one two?\", \"answer\": \"A b\"}\n```\nLet me know {if} you need more.",
        )]);
        let candidate = generate_self_edit(&llm, "t", "").await.unwrap();
        assert_eq!(candidate["question"], "Q one two?");
    }

    #[tokio::test]
    async fn test_generate_model_failure() {
        let llm = ScriptedModel::new([None::<String>]);
        let err = try_generate(&llm, "t", "").await.unwrap_err();
        assert!(matches!(err, GenerationError::Model(_)));
        assert!(err.raw_output().is_none());
    }

    #[tokio::test]
    async fn test_generate_no_json() {
        let llm = ScriptedModel::new([Some("I don't know.")]);
        let err = try_generate(&llm, "t", "").await.unwrap_err();
        assert!(matches!(err, GenerationError::NoJson { .. }));
        assert_eq!(err.raw_output(), Some("I don't know."));
    }

    #[tokio::test]
    async fn test_generate_bad_json() {
        let llm = ScriptedModel::new([Some("{question: unquoted}")]);
        assert!(matches!(
            try_generate(&llm, "t", "").await,
            Err(GenerationError::BadJson { .. })
        ));
    }

    #[tokio::test]
    async fn test_generate_missing_keys() {
        let llm = ScriptedModel::new([Some(r#"{"question": "Only a question?"}"#)]);
        assert!(matches!(
            try_generate(&llm, "t", "").await,
            Err(GenerationError::MissingKeys { .. })
        ));
        let llm = ScriptedModel::new([Some(r#"{"question": "Only a question?"}"#)]);
        assert!(generate_self_edit(&llm, "t", "").await.is_none());
    }
}
