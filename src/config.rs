use std::path::{Path, PathBuf};

use thiserror::Error;

pub const DEFAULT_LLM_BASE_URL: &str = "http://localhost:11434/v1";
pub const DEFAULT_LLM_MODEL: &str = "llama3.1:8b-instruct-q4_K_M";
pub const DEFAULT_SEARCH_RESULTS: usize = 3;
pub const DEFAULT_DATA_DIR: &str = "./data";

pub const SELF_EDITS_FILE: &str = "self_edits.jsonl";
pub const SELF_EDITS_INDEX_FILE: &str = "self_edits_index.json";
pub const REVIEWED_FILE: &str = "self_edits_reviewed.jsonl";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not found in environment or .env file")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    /// Only the interactive flow needs it, so it is checked there.
    pub tavily_api_key: Option<String>,
    pub search_max_results: usize,
    pub data_dir: PathBuf,
}

impl Config {
    /// Read settings from the process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url =
            dotenv::var("LLM_BASE_URL").unwrap_or_else(|_| DEFAULT_LLM_BASE_URL.to_string());
        let model = dotenv::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string());
        let api_key = dotenv::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());

        let tavily_api_key = dotenv::var("TAVILY_API_KEY").ok().filter(|k| !k.is_empty());

        let search_max_results = match dotenv::var("SEARCH_MAX_RESULTS") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|k| *k > 0)
                .ok_or(ConfigError::Invalid {
                    key: "SEARCH_MAX_RESULTS",
                    value: raw,
                })?,
            Err(_) => DEFAULT_SEARCH_RESULTS,
        };

        let data_dir = dotenv::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));

        Ok(Self {
            llm: LlmConfig {
                base_url,
                model,
                api_key,
            },
            tavily_api_key,
            search_max_results,
            data_dir,
        })
    }

    pub fn require_tavily_key(&self) -> Result<&str, ConfigError> {
        self.tavily_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("TAVILY_API_KEY"))
    }

    pub fn paths(&self) -> DataPaths {
        DataPaths::new(&self.data_dir)
    }
}

/// Locations of the persisted self-edit files under one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub self_edits: PathBuf,
    pub index: PathBuf,
    pub reviewed: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            self_edits: data_dir.join(SELF_EDITS_FILE),
            index: data_dir.join(SELF_EDITS_INDEX_FILE),
            reviewed: data_dir.join(REVIEWED_FILE),
        }
    }
}
