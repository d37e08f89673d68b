use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// Web search backend. Results are opaque JSON forwarded into prompts.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<serde_json::Value>;
}

pub struct TavilyClient {
    client: reqwest::Client,
    api_key: String,
    max_results: usize,
}

impl TavilyClient {
    pub fn new(api_key: &str, max_results: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            max_results,
        })
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(&self, query: &str) -> Result<serde_json::Value> {
        let body = serde_json::json!({
            "query": query,
            "max_results": self.max_results,
        });

        let resp = self
            .client
            .post(TAVILY_ENDPOINT)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("Search request failed")?;
        let status = resp.status();
        let text = resp.text().await.context("Failed to read search response")?;
        if !status.is_success() {
            anyhow::bail!("search endpoint returned {}: {}", status, text);
        }

        let json: serde_json::Value =
            serde_json::from_str(&text).context("Failed to parse search JSON")?;
        debug!(
            results = json["results"].as_array().map(|r| r.len()).unwrap_or(0),
            "search complete"
        );
        Ok(json)
    }
}
