use crate::backend::SharedBackend;
use crate::config::{BackendSettings, CrewTemplates};
use crate::crew::{Crew, CrewInputs};
use crate::entity::extract_entity;
use crate::tasks::{
    KEY_CURRENT_YEAR, KEY_ENTITY, KEY_ERROR, KEY_REPORT_SUMMARY, KEY_RESEARCH_NOTES,
    ReportingTask, ResearchTask,
};
use crate::tools::ToolBox;
use crate::TermScoutError;
use graph_flow::{
    ExecutionStatus, FlowRunner, GraphBuilder, InMemorySessionStorage, Session, SessionStorage,
    Task,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Resolve the entity named in a free-form request.
///
/// An empty capture counts as "not identified", so callers can re-prompt.
pub fn resolve_query(text: &str) -> Result<String, TermScoutError> {
    extract_entity(text)
        .filter(|entity| !entity.is_empty())
        .ok_or(TermScoutError::EntityNotIdentified)
}

/// Interpolate the templates with `inputs` and build the crew descriptors.
pub fn prepare_crew(templates: &CrewTemplates, inputs: &CrewInputs) -> Result<Crew, TermScoutError> {
    let rendered = templates.render(&inputs.to_bindings())?;
    Crew::from_templates(&rendered)
}

/// Options for a single crew run.
pub struct CrewOptions {
    pub crew: Crew,
    pub inputs: CrewInputs,
    pub backend: SharedBackend,
    pub research_tools: ToolBox,
    pub session_id: Option<String>,
    pub output_dir: Option<PathBuf>,
}

impl CrewOptions {
    pub fn new(crew: Crew, inputs: CrewInputs, backend: SharedBackend) -> Self {
        Self {
            crew,
            inputs,
            backend,
            research_tools: ToolBox::default(),
            session_id: None,
            output_dir: None,
        }
    }

    /// Render templates for `inputs` and equip the researcher per `settings`.
    pub fn prepare(
        templates: &CrewTemplates,
        inputs: CrewInputs,
        backend: SharedBackend,
        settings: &BackendSettings,
    ) -> Result<Self, TermScoutError> {
        let crew = prepare_crew(templates, &inputs)?;
        let tools = ToolBox::for_agent(&crew.researcher, settings);
        Ok(Self::new(crew, inputs, backend).with_tools(tools))
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_tools(mut self, tools: ToolBox) -> Self {
        self.research_tools = tools;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }
}

/// Result of a completed crew run.
#[derive(Debug, Clone, Serialize)]
pub struct CrewOutcome {
    pub session_id: String,
    pub entity_name: String,
    pub research_notes: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

fn build_graph(options: &CrewOptions) -> (Arc<graph_flow::Graph>, Arc<ResearchTask>) {
    let crew = &options.crew;

    let research = Arc::new(ResearchTask::new(
        crew.agent_for(&crew.research_task).clone(),
        crew.research_task.clone(),
        options.backend.clone(),
        options.research_tools.clone(),
    ));
    let reporting = Arc::new(ReportingTask::new(
        crew.agent_for(&crew.reporting_task).clone(),
        crew.reporting_task.clone(),
        options.backend.clone(),
    ));

    let graph = GraphBuilder::new("termscout_crew")
        .add_task(research.clone())
        .add_task(reporting.clone())
        .add_edge(research.id(), reporting.id())
        .set_start_task(research.id())
        .build();

    (Arc::new(graph), research)
}

/// Run research then reporting for the configured entity.
#[instrument(name = "crew.run", skip_all, fields(entity = %options.inputs.entity_name))]
pub async fn run_crew(options: CrewOptions) -> Result<CrewOutcome, TermScoutError> {
    let (graph, research) = build_graph(&options);

    let storage = Arc::new(InMemorySessionStorage::new());
    let runner = FlowRunner::new(graph, storage.clone());

    let session_id = options
        .session_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let session = Session::new_from_task(session_id.clone(), research.id());

    session
        .context
        .set(KEY_ENTITY, options.inputs.entity_name.clone())
        .await;
    session
        .context
        .set(KEY_CURRENT_YEAR, options.inputs.current_year.clone())
        .await;

    storage
        .save(session)
        .await
        .map_err(|err| TermScoutError::Runtime(format!("failed to persist session: {err}")))?;

    info!(%session_id, model = options.backend.model_name(), "crew kickoff");

    loop {
        let result = runner
            .run(&session_id)
            .await
            .map_err(|err| TermScoutError::Runtime(format!("graph execution failure: {err}")))?;

        match result.status {
            ExecutionStatus::Completed => break,
            ExecutionStatus::Error(message) => return Err(TermScoutError::Runtime(message)),
            _ => continue,
        }
    }

    let session = storage
        .get(&session_id)
        .await
        .map_err(|err| TermScoutError::Runtime(format!("failed to reload session: {err}")))?
        .ok_or_else(|| TermScoutError::Runtime("session missing after execution".into()))?;

    if let Some(error) = session.context.get::<String>(KEY_ERROR).await {
        return Err(TermScoutError::Runtime(error));
    }

    let research_notes: String = session
        .context
        .get(KEY_RESEARCH_NOTES)
        .await
        .unwrap_or_default();
    let summary: String = session
        .context
        .get(KEY_REPORT_SUMMARY)
        .await
        .ok_or_else(|| TermScoutError::Runtime("no summary recorded".into()))?;

    let report_path = match (&options.output_dir, &options.crew.reporting_task.output_file) {
        (Some(dir), Some(file)) => Some(write_report(dir, file, &summary)?),
        _ => None,
    };

    info!(%session_id, report = ?report_path, "crew finished");

    Ok(CrewOutcome {
        session_id,
        entity_name: options.inputs.entity_name,
        research_notes,
        summary,
        report_path,
    })
}

fn write_report(dir: &Path, file: &str, summary: &str) -> Result<PathBuf, TermScoutError> {
    fs::create_dir_all(dir).map_err(|err| TermScoutError::report_write(dir.to_path_buf(), err))?;
    let path = dir.join(file);
    fs::write(&path, format!("{summary}\n"))
        .map_err(|err| TermScoutError::report_write(path.clone(), err))?;
    Ok(path)
}
