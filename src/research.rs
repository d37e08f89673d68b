use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::llm::LanguageModel;
use crate::search::SearchProvider;
use crate::selfedit::validate::ValidationError;
use crate::selfedit::{
    generate_self_edit, review_entry, validate_self_edit, RecordStore, ReviewEntry, ReviewResult,
};

pub fn answer_prompt(context: &str, question: &str) -> String {
    format!(
        "You are an intelligent research assistant.\n\
         You have access to the following search results:\n\
         {context}\n\n\
         Using these results, write a clear, accurate, and concise answer to the user's question:\n\
         {question}\n"
    )
}

/// What happened to the self-edit derived from one answered question.
#[derive(Debug)]
pub enum SelfEditOutcome {
    NotGenerated,
    Invalid {
        error: ValidationError,
        raw: serde_json::Value,
    },
    Duplicate,
    Saved {
        path: PathBuf,
        review: ReviewResult,
    },
    StoreFailed(String),
}

pub struct ResearchAgent<'a> {
    search: &'a dyn SearchProvider,
    llm: &'a dyn LanguageModel,
}

impl<'a> ResearchAgent<'a> {
    pub fn new(search: &'a dyn SearchProvider, llm: &'a dyn LanguageModel) -> Self {
        Self { search, llm }
    }

    /// Search, then answer from the results.
    pub async fn answer(&self, question: &str) -> Result<(String, serde_json::Value)> {
        info!(question, "Searching web");
        let results = self.search.search(question).await.context("web search failed")?;
        let context = serde_json::to_string(&results).context("serialize search results")?;

        let answer = self
            .llm
            .complete(&answer_prompt(&context, question))
            .await
            .context("answer generation failed")?;
        info!(answer_len = answer.len(), "Answer generated");
        Ok((answer, results))
    }

    /// Turn an answered question into a stored, reviewed self-edit. Nothing
    /// in here is fatal; every failure is reported in the outcome.
    pub async fn derive_self_edit(
        &self,
        store: &mut RecordStore,
        question: &str,
        search_results: &serde_json::Value,
    ) -> SelfEditOutcome {
        let snapshot = serde_json::to_string(search_results).unwrap_or_default();

        let Some(raw) = generate_self_edit(self.llm, question, &snapshot).await else {
            return SelfEditOutcome::NotGenerated;
        };

        let cleaned = match validate_self_edit(&raw) {
            Ok(c) => c,
            Err(error) => {
                warn!("Self-edit validation failed: {}", error);
                return SelfEditOutcome::Invalid { error, raw };
            }
        };

        let outcome = match store.append(&cleaned) {
            Ok(o) => o,
            Err(e) => {
                warn!("Failed to save self-edit: {}", e);
                return SelfEditOutcome::StoreFailed(e.to_string());
            }
        };
        let Some(stored) = outcome.stored else {
            info!("Duplicate self-edit, not appended");
            return SelfEditOutcome::Duplicate;
        };
        info!(path = %outcome.path.display(), "Saved new self-edit");

        let review = review_entry(self.llm, &ReviewEntry::from(&stored)).await;
        SelfEditOutcome::Saved {
            path: outcome.path,
            review,
        }
    }
}
