//! LLM backend abstraction.
//!
//! Agents talk to a [`LlmBackend`]; the default deployment points at a local
//! Ollama server, while [`OfflineBackend`] composes deterministic text for dry
//! runs and tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::{BackendKind, BackendSettings};
use crate::crew::{AgentSpec, TaskSpec};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Empty response")]
    EmptyResponse,
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generate a completion for `user` under the `system` persona.
    async fn generate(&self, system: &str, user: &str) -> Result<String, LlmError>;

    fn model_name(&self) -> &str;
}

/// Thread-safe reference to an LLM backend
pub type SharedBackend = Arc<dyn LlmBackend>;

pub fn create_backend(settings: &BackendSettings) -> Result<SharedBackend, LlmError> {
    match settings.kind {
        BackendKind::Ollama => Ok(Arc::new(OllamaBackend::new(
            &settings.ollama_url,
            &settings.model,
        )?)),
        BackendKind::Offline => Ok(Arc::new(OfflineBackend::new())),
    }
}

/// System/user prompt pair for one agent performing one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPrompt {
    pub system: String,
    pub user: String,
}

impl AgentPrompt {
    pub fn build(agent: &AgentSpec, task: &TaskSpec, context: &str) -> Self {
        let mut system = format!("You are {}.", agent.role.trim());
        if !agent.goal.trim().is_empty() {
            system.push_str(&format!("\nYour goal: {}", agent.goal.trim()));
        }
        if !agent.backstory.trim().is_empty() {
            system.push_str(&format!("\n{}", agent.backstory.trim()));
        }

        let mut user = task.description.trim().to_string();
        if !task.expected_output.trim().is_empty() {
            user.push_str(&format!(
                "\n\nExpected output:\n{}",
                task.expected_output.trim()
            ));
        }
        if !context.trim().is_empty() {
            user.push_str(&format!("\n\nContext:\n{}", context.trim()));
        }

        Self { system, user }
    }
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

/// Local generation can take minutes.
const OLLAMA_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

pub struct OllamaBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(base_url: &str, model: &str) -> Result<Self, LlmError> {
        let base = base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(LlmError::Config("Ollama base URL must not be empty".into()));
        }
        if model.trim().is_empty() {
            return Err(LlmError::Config("Ollama model must not be empty".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(OLLAMA_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{base}/api/generate"),
            model: model.trim().to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn generate(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let request_body = serde_json::json!({
            "model": self.model,
            "system": system,
            "prompt": user,
            "stream": false,
        });

        debug!(endpoint = %self.endpoint, model = %self.model, "calling ollama");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("Ollama error {status}: {text}")));
        }

        let body: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        let text = body.response.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text.to_string())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Deterministic backend that never leaves the process.
#[derive(Debug, Default, Clone)]
pub struct OfflineBackend;

impl OfflineBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LlmBackend for OfflineBackend {
    async fn generate(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let persona = system.lines().next().unwrap_or_default();
        let request = user.lines().next().unwrap_or_default();
        let context = user
            .split_once("\n\nContext:\n")
            .map(|(_, context)| context)
            .unwrap_or_default();

        let mut out = format!("{persona}\nTask: {request}\n");
        if context.is_empty() {
            out.push_str("- No supporting context was available.");
        } else {
            for line in context.lines().filter(|line| !line.trim().is_empty()).take(5) {
                out.push_str(&format!("- {}\n", line.trim()));
            }
        }
        Ok(out.trim_end().to_string())
    }

    fn model_name(&self) -> &str {
        "offline"
    }
}
