use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::hash::{edit_id, DedupIndex, EditId};
use super::review::review_entry;
use super::store::{append_json_line, StoreError};
use super::types::{ReviewEntry, ReviewStatus, ReviewedRecord};
use crate::llm::LanguageModel;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Input file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Non-blank input lines seen.
    pub processed: usize,
    /// Rows written with `review_status = ok`.
    pub appended: usize,
    /// Rows already present in the reviewed log.
    pub skipped: usize,
    /// Invalid lines plus rows whose review errored (those are still written).
    pub failed: usize,
}

fn entry_id(entry: &Map<String, Value>) -> EditId {
    let text = |key: &str| entry.get(key).and_then(Value::as_str).unwrap_or("");
    edit_id(text("question"), text("answer"))
}

/// Index of already-reviewed rows, rebuilt from the reviewed log itself.
/// Missing or unreadable files give an empty index; bad lines are ignored.
pub fn load_reviewed_index(path: &Path) -> DedupIndex<Value> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), "Failed to open reviewed log: {}", e);
            }
            return DedupIndex::new();
        }
    };

    let mut index = DedupIndex::new();
    for line in BufReader::new(file).lines() {
        let Ok(line) = line else {
            warn!(path = %path.display(), "Stopped reading reviewed log early");
            break;
        };
        if let Ok(Value::Object(record)) = serde_json::from_str::<Value>(line.trim()) {
            index.insert(entry_id(&record), Value::Object(record));
        }
    }
    index
}

/// Review every not-yet-reviewed entry of `input` and append the results to
/// `output`. Running it again over the same input appends nothing.
pub async fn run_batch_review(
    llm: &dyn LanguageModel,
    input: &Path,
    output: &Path,
) -> Result<BatchSummary, BatchError> {
    if !input.exists() {
        return Err(BatchError::NotFound(input.to_path_buf()));
    }
    let read_err = |source| BatchError::Read {
        path: input.to_path_buf(),
        source,
    };

    let mut reviewed = load_reviewed_index(output);
    info!(
        input = %input.display(),
        output = %output.display(),
        already_reviewed = reviewed.len(),
        "Starting batch review"
    );

    let file = fs::File::open(input).map_err(read_err)?;
    let mut summary = BatchSummary::default();

    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(read_err)?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.processed += 1;

        let entry = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(entry)) => entry,
            _ => {
                summary.failed += 1;
                warn!(line = lineno + 1, "Skipping invalid JSON line");
                continue;
            }
        };

        let id = entry_id(&entry);
        if reviewed.contains(&id) {
            summary.skipped += 1;
            debug!(line = lineno + 1, edit_id = %id, "already reviewed");
            continue;
        }

        let entry = ReviewEntry::from_json(&entry);
        let review = review_entry(llm, &entry).await;
        let record = ReviewedRecord::new(entry, review);

        match record.review_status {
            ReviewStatus::Ok => summary.appended += 1,
            ReviewStatus::Error => summary.failed += 1,
        }

        append_json_line(output, &record)?;
        reviewed.insert(id, serde_json::to_value(&record).map_err(StoreError::from)?);
    }

    info!(
        processed = summary.processed,
        appended = summary.appended,
        skipped = summary.skipped,
        failed = summary.failed,
        "Batch review complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataPaths;
    use crate::llm::testing::ScriptedModel;
    use crate::selfedit::store::RecordStore;
    use crate::selfedit::types::SelfEdit;

    const GOOD_REVIEW: &str =
        r#"{"accuracy": 0.9, "clarity": 0.8, "novelty": 0.5, "remarks": "accurate"}"#;

    fn seed(dir: &Path, pairs: &[(&str, &str)]) -> DataPaths {
        let paths = DataPaths::new(dir);
        let mut store = RecordStore::new(&paths.self_edits, &paths.index);
        for (q, a) in pairs {
            store
                .append(&SelfEdit {
                    question: q.to_string(),
                    answer: a.to_string(),
                    source: "summary".to_string(),
                })
                .unwrap();
        }
        paths
    }

    fn rows(path: &Path) -> Vec<Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_missing_input_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedModel::always(GOOD_REVIEW);
        let err = run_batch_review(&llm, &dir.path().join("nope.jsonl"), &dir.path().join("out.jsonl"))
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::NotFound(_)));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_reviews_and_writes_records() {
        let dir = tempfile::tempdir().unwrap();
        let paths = seed(
            dir.path(),
            &[("What is X really?", "X is Y."), ("What is Z really?", "Z is W.")],
        );
        let llm = ScriptedModel::always(GOOD_REVIEW);

        let summary = run_batch_review(&llm, &paths.self_edits, &paths.reviewed).await.unwrap();
        assert_eq!(
            summary,
            BatchSummary {
                processed: 2,
                appended: 2,
                skipped: 0,
                failed: 0
            }
        );

        let out = rows(&paths.reviewed);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["question"], "What is X really?");
        assert_eq!(out[0]["source"], "summary");
        assert_eq!(out[0]["review_status"], "ok");
        assert_eq!(out[0]["review"]["score"], 0.79);
        assert!(out[0]["created_at"].as_str().unwrap().ends_with('Z'));
        assert!(out[0]["reviewed_at"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_second_run_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        let paths = seed(
            dir.path(),
            &[("What is X really?", "X is Y."), ("What is Z really?", "Z is W.")],
        );
        let llm = ScriptedModel::always(GOOD_REVIEW);

        run_batch_review(&llm, &paths.self_edits, &paths.reviewed).await.unwrap();
        let second = run_batch_review(&llm, &paths.self_edits, &paths.reviewed).await.unwrap();

        assert_eq!(second.appended, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(rows(&paths.reviewed).len(), 2);
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_duplicates_within_one_run_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jsonl");
        let output = dir.path().join("out.jsonl");
        let line = r#"{"question": "What is X really?", "answer": "X is Y.", "source": "a"}"#;
        let other_source = r#"{"question": "What is X really?", "answer": "X is Y.", "source": "b"}"#;
        fs::write(&input, format!("{}\n\n{}\n", line, other_source)).unwrap();

        let llm = ScriptedModel::always(GOOD_REVIEW);
        let summary = run_batch_review(&llm, &input, &output).await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.appended, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_lines_counted_failed() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jsonl");
        let output = dir.path().join("out.jsonl");
        fs::write(
            &input,
            "not json\n[1,2]\n{\"question\": \"What is X really?\", \"answer\": \"X is Y.\"}\n",
        )
        .unwrap();

        let llm = ScriptedModel::always(GOOD_REVIEW);
        let summary = run_batch_review(&llm, &input, &output).await.unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.appended, 1);

        let out = rows(&output);
        assert_eq!(out[0]["source"], "unknown");
        assert!(out[0]["created_at"].is_null());
    }

    #[tokio::test]
    async fn test_review_errors_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let paths = seed(dir.path(), &[("What is X really?", "X is Y.")]);
        let llm = ScriptedModel::new([Some("no idea, sorry")]);

        let summary = run_batch_review(&llm, &paths.self_edits, &paths.reviewed).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.appended, 0);

        let out = rows(&paths.reviewed);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["review_status"], "error");
        assert_eq!(out[0]["review"]["error"], "failed to parse JSON from model response");
        assert_eq!(out[0]["review"]["debug_output"], "no idea, sorry");

        // errored rows are not retried on the next run
        let again = run_batch_review(&llm, &paths.self_edits, &paths.reviewed).await.unwrap();
        assert_eq!(again.skipped, 1);
    }

    #[test]
    fn test_reviewed_index_tolerates_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        fs::write(
            &path,
            "{\"question\": \"Q a b\", \"answer\": \"A b\"}\nnot json\n\n",
        )
        .unwrap();
        let index = load_reviewed_index(&path);
        assert_eq!(index.len(), 1);
        assert!(index.contains(&edit_id("Q a b", "A b")));
        assert_eq!(load_reviewed_index(&dir.path().join("missing.jsonl")).len(), 0);
    }

    #[tokio::test]
    async fn test_unwritable_output_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = seed(dir.path(), &[("What is X really?", "X is Y.")]);
        // the reviewed log path is taken by a directory
        fs::create_dir(&paths.reviewed).unwrap();

        let llm = ScriptedModel::always(GOOD_REVIEW);
        let err = run_batch_review(&llm, &paths.self_edits, &paths.reviewed)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::Store(StoreError::Write { .. })));
    }
}
