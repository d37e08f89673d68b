use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Research assistant that curates self-edits from its own answers
#[derive(Parser, Debug)]
#[command(name = "research-agent", version)]
#[command(about = "Answer research questions from web search and curate Q/A self-edits", long_about = None)]
pub struct Cli {
    /// Directory holding the self-edit logs (overrides $DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Subcommand (if not provided, asks one research question)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask one research question read from stdin
    Ask,

    /// Score every stored self-edit that has not been reviewed yet
    Review {
        /// Self-edit log to read (default: <data-dir>/self_edits.jsonl)
        #[arg(long, env = "REVIEW_INPUT")]
        input: Option<PathBuf>,

        /// Reviewed log to append to (default: <data-dir>/self_edits_reviewed.jsonl)
        #[arg(long, env = "REVIEW_OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Generate a self-edit candidate for a topic read from stdin (nothing is saved)
    Generate,

    /// Show the most recent stored self-edits
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}
