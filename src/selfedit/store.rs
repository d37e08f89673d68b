use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use super::hash::{edit_id, DedupIndex};
use super::types::{SelfEdit, StoredSelfEdit};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn write_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    pub path: PathBuf,
    /// The line that was written, `None` when the pair was a duplicate.
    pub stored: Option<StoredSelfEdit>,
}

impl AppendOutcome {
    pub fn appended(&self) -> bool {
        self.stored.is_some()
    }
}

/// Append-only JSON Lines log of canonical self-edits plus a side-car index
/// of identities already written. Single writer; the index is loaded once
/// per store instance and kept in memory from then on.
pub struct RecordStore {
    log_path: PathBuf,
    index_path: PathBuf,
    index: Option<DedupIndex<bool>>,
}

impl RecordStore {
    pub fn new(log_path: impl Into<PathBuf>, index_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            index_path: index_path.into(),
            index: None,
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Store a validated self-edit unless the same question/answer is
    /// already in the log. Idempotent: same text = one line.
    pub fn append(&mut self, edit: &SelfEdit) -> Result<AppendOutcome, StoreError> {
        let id = edit_id(&edit.question, &edit.answer);
        let index_path = self.index_path.clone();
        let index = self.index.get_or_insert_with(|| load_index(&index_path));

        if index.contains(&id) {
            debug!(edit_id = %id, "duplicate self-edit skipped");
            return Ok(AppendOutcome {
                path: self.log_path.clone(),
                stored: None,
            });
        }

        let stored = StoredSelfEdit::stamp(edit);
        append_json_line(&self.log_path, &stored)?;

        index.insert(id.clone(), true);
        save_index(&self.index_path, index)?;

        debug!(edit_id = %id, path = %self.log_path.display(), "self-edit appended");
        Ok(AppendOutcome {
            path: self.log_path.clone(),
            stored: Some(stored),
        })
    }

    /// Stored self-edits, newest first. Unparseable lines are skipped.
    pub fn entries(&self, limit: usize) -> Result<Vec<StoredSelfEdit>, StoreError> {
        let file = match fs::File::open(&self.log_path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.log_path.clone(),
                    source,
                })
            }
        };

        let mut results = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| StoreError::Read {
                path: self.log_path.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredSelfEdit>(&line) {
                Ok(record) => results.push(record),
                Err(e) => warn!(line = lineno + 1, "Skipping unreadable self-edit: {}", e),
            }
        }

        results.reverse();
        results.truncate(limit);
        Ok(results)
    }
}

/// Missing or corrupt index files degrade to an empty index.
fn load_index(path: &Path) -> DedupIndex<bool> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), "Failed to read dedup index: {}", e);
            }
            return DedupIndex::new();
        }
    };
    match serde_json::from_slice::<BTreeMap<String, bool>>(&bytes) {
        Ok(entries) => DedupIndex::from_entries(entries),
        Err(e) => {
            warn!(path = %path.display(), "Corrupt dedup index, starting empty: {}", e);
            DedupIndex::new()
        }
    }
}

/// Full rewrite; the index is small next to the log.
fn save_index(path: &Path, index: &DedupIndex<bool>) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(index.entries())?;
    fs::write(path, json).map_err(write_err(path))
}

/// Append one JSON object as a line, creating the parent directory if needed.
pub fn append_json_line<T: serde::Serialize>(path: &Path, record: &T) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(write_err(path))?;
    file.write_all(line.as_bytes()).map_err(write_err(path))
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir).map_err(write_err(dir)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataPaths;

    fn edit(question: &str, answer: &str, source: &str) -> SelfEdit {
        SelfEdit {
            question: question.to_string(),
            answer: answer.to_string(),
            source: source.to_string(),
        }
    }

    fn store_in(dir: &Path) -> RecordStore {
        let paths = DataPaths::new(dir);
        RecordStore::new(paths.self_edits, paths.index)
    }

    fn line_count(path: &Path) -> usize {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count()
    }

    #[test]
    fn test_append_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let e = edit("What is X really?", "X is Y.", "test");

        let first = store.append(&e).unwrap();
        let second = store.append(&e).unwrap();

        assert!(first.appended());
        assert!(!second.appended());
        assert_eq!(first.path, dir.path().join("self_edits.jsonl"));
        assert_eq!(line_count(&first.path), 1);
    }

    #[test]
    fn test_source_and_timestamp_do_not_affect_identity() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());

        assert!(store.append(&edit("What is X really?", "X is Y.", "a")).unwrap().appended());
        assert!(!store.append(&edit("What is X really?", "X is Y.", "b")).unwrap().appended());
        assert_eq!(line_count(store.log_path()), 1);
    }

    #[test]
    fn test_created_at_assigned_on_append() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let outcome = store.append(&edit("What is X really?", "X is Y.", "t")).unwrap();

        let line = fs::read_to_string(&outcome.path).unwrap();
        let saved: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(saved["question"], "What is X really?");
        assert_eq!(saved["source"], "t");
        assert!(saved["created_at"].as_str().unwrap().ends_with('Z'));
        assert_eq!(outcome.stored.unwrap().created_at, saved["created_at"]);
    }

    #[test]
    fn test_index_persisted_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let e = edit("What is X really?", "X is Y.", "t");
        store_in(dir.path()).append(&e).unwrap();

        let index: BTreeMap<String, bool> = serde_json::from_str(
            &fs::read_to_string(dir.path().join("self_edits_index.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(index.get(&edit_id(&e.question, &e.answer)), Some(&true));

        // a fresh store (new run) sees the persisted identity
        let mut again = store_in(dir.path());
        assert!(!again.append(&e).unwrap().appended());
    }

    #[test]
    fn test_corrupt_index_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("self_edits_index.json"), "{not json").unwrap();

        let mut store = store_in(dir.path());
        let outcome = store.append(&edit("What is X really?", "X is Y.", "t")).unwrap();
        assert!(outcome.appended());
    }

    #[test]
    fn test_creates_missing_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deeper").join("data");
        let mut store = store_in(&nested);
        assert!(store.append(&edit("What is X really?", "X is Y.", "t")).unwrap().appended());
        assert!(nested.join("self_edits.jsonl").exists());
        assert!(nested.join("self_edits_index.json").exists());
    }

    #[test]
    fn test_entries_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.append(&edit("First question asked here?", "first answer", "t")).unwrap();
        store.append(&edit("Second question asked here?", "second answer", "t")).unwrap();

        let mut log = OpenOptions::new().append(true).open(store.log_path()).unwrap();
        writeln!(log, "garbage line").unwrap();

        let entries = store.entries(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].question, "Second question asked here?");
        assert_eq!(store.entries(1).unwrap().len(), 1);
    }

    #[test]
    fn test_entries_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store_in(dir.path()).entries(5).unwrap().is_empty());
    }

    #[test]
    fn test_log_write_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("self_edits.jsonl");
        let index_path = dir.path().join("self_edits_index.json");
        // a directory where the log file should be
        fs::create_dir(&log).unwrap();

        let mut store = RecordStore::new(&log, &index_path);
        let e = edit("What is X really?", "X is Y.", "t");
        let err = store.append(&e).unwrap_err();
        assert!(matches!(err, StoreError::Write { ref path, .. } if *path == log));
        assert!(!index_path.exists());
        // the identity was not remembered in memory either
        assert!(matches!(store.append(&e), Err(StoreError::Write { .. })));
    }

    #[test]
    fn test_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("data");
        fs::write(&blocker, "not a directory").unwrap();

        let mut store = store_in(&blocker);
        let err = store.append(&edit("What is X really?", "X is Y.", "t")).unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));
    }
}
