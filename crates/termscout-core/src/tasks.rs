use async_trait::async_trait;
use graph_flow::{Context, NextAction, Task, TaskResult};
use tracing::{debug, info, instrument, warn};

use crate::backend::{AgentPrompt, SharedBackend};
use crate::crew::{
    AgentSpec, REPORTING_TASK, RESEARCH_TASK, SCRAPE_WEBSITE_TOOL, SERPER_SEARCH_TOOL, TaskSpec,
};
use crate::tools::{ToolBox, first_link};

pub(crate) const KEY_ENTITY: &str = "entity_name";
pub(crate) const KEY_CURRENT_YEAR: &str = "current_year";
pub(crate) const KEY_RESEARCH_NOTES: &str = "research.notes";
pub(crate) const KEY_REPORT_SUMMARY: &str = "report.summary";
pub(crate) const KEY_ERROR: &str = "crew.error";

/// Researcher: gathers terms & conditions material with its tools, then asks
/// the backend for findings.
pub struct ResearchTask {
    agent: AgentSpec,
    task: TaskSpec,
    backend: SharedBackend,
    tools: ToolBox,
}

impl ResearchTask {
    pub fn new(agent: AgentSpec, task: TaskSpec, backend: SharedBackend, tools: ToolBox) -> Self {
        Self {
            agent,
            task,
            backend,
            tools,
        }
    }

    async fn gather(&self, entity: &str) -> Vec<String> {
        let mut notes = Vec::new();

        let Some(search) = self.tools.get(SERPER_SEARCH_TOOL) else {
            debug!("no search tool configured; researching from model knowledge");
            return notes;
        };

        let query = format!("{entity} terms and conditions");
        let results = match search.run(&query).await {
            Ok(results) => results,
            Err(err) => {
                warn!(error = %err, "web search failed");
                notes.push(format!("Web search failed: {err}"));
                return notes;
            }
        };

        let link = first_link(&results).map(str::to_string);
        notes.push(format!("Search results:\n{results}"));

        if let (Some(scrape), Some(link)) = (self.tools.get(SCRAPE_WEBSITE_TOOL), link) {
            match scrape.run(&link).await {
                Ok(text) if !text.is_empty() => {
                    notes.push(format!("Page excerpt ({link}):\n{text}"));
                }
                Ok(_) => debug!(%link, "scraped page had no text"),
                Err(err) => {
                    warn!(error = %err, %link, "scrape failed");
                    notes.push(format!("Could not read {link}: {err}"));
                }
            }
        }

        notes
    }
}

#[async_trait]
impl Task for ResearchTask {
    fn id(&self) -> &str {
        RESEARCH_TASK
    }

    #[instrument(name = "task.research", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let entity: String = context.get(KEY_ENTITY).await.unwrap_or_default();
        info!(%entity, tools = ?self.tools.names(), "researcher collecting terms");

        let notes = self.gather(&entity).await;
        let prompt = AgentPrompt::build(&self.agent, &self.task, &notes.join("\n\n"));

        match self.backend.generate(&prompt.system, &prompt.user).await {
            Ok(findings) => {
                debug!(chars = findings.len(), "research findings recorded");
                context.set(KEY_RESEARCH_NOTES, findings).await;
                Ok(TaskResult::new(
                    Some(format!("Research completed for \"{entity}\"")),
                    NextAction::ContinueAndExecute,
                ))
            }
            Err(err) => {
                warn!(error = %err, model = self.backend.model_name(), "researcher failed");
                let message = format!("researcher failed: {err}");
                context.set(KEY_ERROR, message.clone()).await;
                Ok(TaskResult::new(Some(message), NextAction::End))
            }
        }
    }
}

/// Reporting analyst: condenses the research notes into the final summary.
pub struct ReportingTask {
    agent: AgentSpec,
    task: TaskSpec,
    backend: SharedBackend,
}

impl ReportingTask {
    pub fn new(agent: AgentSpec, task: TaskSpec, backend: SharedBackend) -> Self {
        Self {
            agent,
            task,
            backend,
        }
    }
}

#[async_trait]
impl Task for ReportingTask {
    fn id(&self) -> &str {
        REPORTING_TASK
    }

    #[instrument(name = "task.reporting", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let notes: String = context.get(KEY_RESEARCH_NOTES).await.unwrap_or_default();
        if notes.trim().is_empty() {
            warn!("reporting analyst received no research notes");
        }

        let prompt = AgentPrompt::build(&self.agent, &self.task, &notes);

        match self.backend.generate(&prompt.system, &prompt.user).await {
            Ok(summary) => {
                info!(chars = summary.len(), "reporting analyst produced summary");
                context.set(KEY_REPORT_SUMMARY, summary.clone()).await;
                Ok(TaskResult::new(Some(summary), NextAction::End))
            }
            Err(err) => {
                warn!(error = %err, model = self.backend.model_name(), "reporting analyst failed");
                let message = format!("reporting analyst failed: {err}");
                context.set(KEY_ERROR, message.clone()).await;
                Ok(TaskResult::new(Some(message), NextAction::End))
            }
        }
    }
}
