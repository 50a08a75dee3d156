//! TermScout core: turns a free-form terms & conditions request into a
//! researched summary.
//!
//! The request is reduced to an entity name ([`extract_entity`]), the crew
//! templates are interpolated with it ([`interpolate`]), and a two-step
//! `graph_flow` workflow (researcher, then reporting analyst) produces the
//! summary ([`run_crew`]).

mod backend;
mod config;
mod crew;
mod entity;
mod error;
mod security;
pub mod setup;
mod tasks;
mod telemetry;
mod template;
mod tools;
mod workflow;

pub use backend::{
    AgentPrompt, LlmBackend, LlmError, OfflineBackend, OllamaBackend, SharedBackend,
    create_backend,
};
pub use config::{BackendKind, BackendSettings, ConfigLoader, CrewTemplates, load_config_tree};
pub use crew::{
    AgentSpec, Crew, CrewInputs, REPORTING_ANALYST, REPORTING_TASK, RESEARCH_TASK, RESEARCHER,
    SCRAPE_WEBSITE_TOOL, SERPER_SEARCH_TOOL, TaskSpec,
};
pub use entity::{
    EXAMPLE_QUERIES, EntityMatch, EntityRule, RuleTier, entity_rules, extract_entity,
    extract_entity_match,
};
pub use error::TermScoutError;
pub use security::{SecretValue, optional_secret};
pub use tasks::{ReportingTask, ResearchTask};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use template::{
    Bindings, ConfigTree, ENTITY_BINDING, InterpolationError, PLACEHOLDER, interpolate,
    interpolate_with, placeholder_count,
};
pub use tools::{
    ResearchTool, ScrapeWebsiteTool, SerperResult, SerperSearchTool, SharedTool,
    TOOL_REQUEST_TIMEOUT, ToolBox, ToolError, extract_page_text, first_link,
    format_search_results,
};
pub use workflow::{CrewOptions, CrewOutcome, prepare_crew, resolve_query, run_crew};
