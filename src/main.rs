mod cli;
mod config;
mod llm;
mod research;
mod search;
mod selfedit;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use config::Config;
use llm::LlmClient;
use research::{ResearchAgent, SelfEditOutcome};
use search::TavilyClient;
use selfedit::{run_batch_review, RecordStore, ReviewResult};

#[tokio::main]
async fn main() -> Result<()> {
    // stderr for logs, stdout for the user
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    match cli.command.unwrap_or(Commands::Ask) {
        Commands::Ask => ask(&config).await,
        Commands::Review { input, output } => review(&config, input, output).await,
        Commands::Generate => generate(&config).await,
        Commands::List { limit } => list(&config, limit),
    }
}

async fn read_line(prompt: &str) -> Result<String> {
    use std::io::Write;
    print!("{}", prompt);
    std::io::stdout().flush()?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read stdin")?;
    let line = line.trim().to_string();
    if line.is_empty() {
        anyhow::bail!("nothing entered");
    }
    Ok(line)
}

async fn ask(config: &Config) -> Result<()> {
    // fail before any work if the search credential is missing
    let tavily_key = config.require_tavily_key()?;
    println!("Environment loaded.");

    let search = TavilyClient::new(tavily_key, config.search_max_results)?;
    let llm = LlmClient::new(&config.llm)?;
    info!(model = llm.model(), "LLM client initialized");

    let paths = config.paths();
    let mut store = RecordStore::new(paths.self_edits, paths.index);
    let agent = ResearchAgent::new(&search, &llm);

    let question = read_line("\n> Enter your research question: ").await?;
    println!("Searching web...");
    let (answer, results) = agent.answer(&question).await?;

    println!("\n--- FINAL RESPONSE ---");
    println!("{}", answer);

    println!("\n[Phase 2] Generating self-edit from the answer...");
    match agent.derive_self_edit(&mut store, &question, &results).await {
        SelfEditOutcome::NotGenerated => {
            println!("[Self-Editor] No structured output from generator. Self-edit not created.");
        }
        SelfEditOutcome::Invalid { error, raw } => {
            println!("[Self-Editor] Validation failed: {}", error);
            println!("Raw output for debugging: {}", raw);
        }
        SelfEditOutcome::Duplicate => {
            println!("[Self-Editor] Duplicate detected, not appended.");
        }
        SelfEditOutcome::StoreFailed(e) => {
            println!("[Self-Editor] Failed to save self-edit: {}", e);
        }
        SelfEditOutcome::Saved { path, review } => {
            println!("[Self-Editor] Saved new self-edit to: {}", path.display());
            print_review(&review)?;
        }
    }
    Ok(())
}

fn print_review(review: &ReviewResult) -> Result<()> {
    println!("\n[Self-Editor Review] ------------------------");
    println!("{}", serde_json::to_string_pretty(review)?);
    println!("[Self-Editor Review] ------------------------\n");
    Ok(())
}

async fn review(
    config: &Config,
    input: Option<std::path::PathBuf>,
    output: Option<std::path::PathBuf>,
) -> Result<()> {
    let paths = config.paths();
    let input = input.unwrap_or(paths.self_edits);
    let output = output.unwrap_or(paths.reviewed);

    let llm = LlmClient::new(&config.llm)?;
    let summary = run_batch_review(&llm, &input, &output).await?;

    println!(
        "Processed: {}, Appended: {}, Skipped(already reviewed): {}, Failed: {}",
        summary.processed, summary.appended, summary.skipped, summary.failed
    );
    println!("Reviewed file: {}", output.display());
    Ok(())
}

async fn generate(config: &Config) -> Result<()> {
    let llm = LlmClient::new(&config.llm)?;
    let topic = read_line("Enter topic for self-edit generation: ").await?;
    let result = selfedit::generate_self_edit(&llm, &topic, "").await;

    println!("\nGenerated Self-Edit:");
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn list(config: &Config, limit: usize) -> Result<()> {
    let paths = config.paths();
    let store = RecordStore::new(paths.self_edits, paths.index);
    let entries = store.entries(limit)?;

    if entries.is_empty() {
        println!("No self-edits stored yet in {}", store.log_path().display());
        return Ok(());
    }
    for entry in &entries {
        println!("[{}] ({})", entry.created_at, entry.source);
        println!("  Q: {}", entry.question);
        println!("  A: {}\n", entry.answer);
    }
    Ok(())
}
