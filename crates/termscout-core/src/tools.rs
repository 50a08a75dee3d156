//! Web research tools available to agents.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::BackendSettings;
use crate::crew::{AgentSpec, SCRAPE_WEBSITE_TOOL, SERPER_SEARCH_TOOL};
use crate::security::SecretValue;

const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";
const SEARCH_RESULT_LIMIT: usize = 5;

/// Upper bound on a single tool request, connect through body.
pub const TOOL_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected response: {0}")]
    Response(String),
}

#[async_trait]
pub trait ResearchTool: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, input: &str) -> Result<String, ToolError>;
}

pub type SharedTool = Arc<dyn ResearchTool>;

fn http_client(timeout: Duration) -> Result<reqwest::Client, ToolError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ToolError::Request(format!("failed to build HTTP client: {e}")))
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SerperResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

/// Google search through the serper.dev API.
pub struct SerperSearchTool {
    client: reqwest::Client,
    api_key: SecretValue,
}

impl SerperSearchTool {
    pub fn new(api_key: SecretValue) -> Result<Self, ToolError> {
        Ok(Self {
            client: http_client(TOOL_REQUEST_TIMEOUT)?,
            api_key,
        })
    }
}

#[async_trait]
impl ResearchTool for SerperSearchTool {
    fn name(&self) -> &str {
        SERPER_SEARCH_TOOL
    }

    async fn run(&self, input: &str) -> Result<String, ToolError> {
        let response = self
            .client
            .post(SERPER_ENDPOINT)
            .header("X-API-KEY", self.api_key.expose())
            .json(&serde_json::json!({ "q": input }))
            .send()
            .await
            .map_err(|e| ToolError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ToolError::Response(format!(
                "serper returned {}",
                response.status()
            )));
        }

        let body: SerperResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Response(e.to_string()))?;

        debug!(query = %input, results = body.organic.len(), "serper search finished");
        Ok(format_search_results(&body.organic))
    }
}

/// Render search hits as `title - link` lines followed by the snippet.
pub fn format_search_results(results: &[SerperResult]) -> String {
    results
        .iter()
        .take(SEARCH_RESULT_LIMIT)
        .map(|hit| {
            if hit.snippet.is_empty() {
                format!("{} - {}", hit.title, hit.link)
            } else {
                format!("{} - {}\n{}", hit.title, hit.link, hit.snippet)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fetch a page and return its visible body text.
pub struct ScrapeWebsiteTool {
    client: reqwest::Client,
    char_limit: usize,
}

impl ScrapeWebsiteTool {
    pub fn new(char_limit: usize) -> Result<Self, ToolError> {
        Self::with_timeout(char_limit, TOOL_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(char_limit: usize, timeout: Duration) -> Result<Self, ToolError> {
        Ok(Self {
            client: http_client(timeout)?,
            char_limit,
        })
    }
}

#[async_trait]
impl ResearchTool for ScrapeWebsiteTool {
    fn name(&self) -> &str {
        SCRAPE_WEBSITE_TOOL
    }

    async fn run(&self, input: &str) -> Result<String, ToolError> {
        let response = self
            .client
            .get(input.trim())
            .send()
            .await
            .map_err(|e| ToolError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ToolError::Response(format!(
                "{} returned {}",
                input.trim(),
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| ToolError::Response(e.to_string()))?;
        extract_page_text(&html, self.char_limit)
    }
}

/// Collapse the text of `<body>` (or the whole document) to single spaces.
pub fn extract_page_text(html: &str, char_limit: usize) -> Result<String, ToolError> {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse("body").map_err(|e| ToolError::Response(format!("{e:?}")))?;

    let raw: String = match document.select(&selector).next() {
        Some(body) => body.text().collect::<Vec<_>>().join(" "),
        None => document.root_element().text().collect::<Vec<_>>().join(" "),
    };

    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(collapsed.chars().take(char_limit).collect())
}

/// The instantiated tools of one agent.
#[derive(Clone, Default)]
pub struct ToolBox {
    tools: Vec<SharedTool>,
}

impl ToolBox {
    pub fn new(tools: Vec<SharedTool>) -> Self {
        Self { tools }
    }

    pub fn for_agent(agent: &AgentSpec, settings: &BackendSettings) -> Self {
        let mut tools: Vec<SharedTool> = Vec::new();
        for name in &agent.tools {
            let built: Result<SharedTool, ToolError> = match name.as_str() {
                SERPER_SEARCH_TOOL => match &settings.serper_api_key {
                    Some(key) => {
                        SerperSearchTool::new(key.clone()).map(|t| Arc::new(t) as SharedTool)
                    }
                    None => {
                        warn!("SERPER_API_KEY not set; web search disabled");
                        continue;
                    }
                },
                SCRAPE_WEBSITE_TOOL => ScrapeWebsiteTool::new(settings.scrape_char_limit)
                    .map(|t| Arc::new(t) as SharedTool),
                other => {
                    warn!(tool = other, "unknown tool requested by agent; skipping");
                    continue;
                }
            };

            match built {
                Ok(tool) => tools.push(tool),
                Err(err) => warn!(tool = %name, error = %err, "tool unavailable; skipping"),
            }
        }
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&SharedTool> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }
}

impl std::fmt::Debug for ToolBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBox").field("tools", &self.names()).finish()
    }
}

/// First `http(s)` link found in formatted search results.
pub fn first_link(search_output: &str) -> Option<&str> {
    search_output
        .split_whitespace()
        .find(|token| token.starts_with("https://") || token.starts_with("http://"))
}
