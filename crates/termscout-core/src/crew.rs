//! Agent and task descriptors built from interpolated crew templates.

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::config::CrewTemplates;
use crate::template::{Bindings, ConfigTree, ENTITY_BINDING};
use crate::TermScoutError;

pub const RESEARCHER: &str = "researcher";
pub const REPORTING_ANALYST: &str = "reporting_analyst";
pub const RESEARCH_TASK: &str = "research_task";
pub const REPORTING_TASK: &str = "reporting_task";

pub const SERPER_SEARCH_TOOL: &str = "serper_search";
pub const SCRAPE_WEBSITE_TOOL: &str = "scrape_website";

const REPORT_FILE: &str = "report.md";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub allow_delegation: bool,
    pub tools: Vec<String>,
}

impl AgentSpec {
    /// A mapping entry supplies fields; any other scalar becomes the role.
    fn from_entry(entry: &Value, tools: &[&str]) -> Self {
        let tools = tools.iter().map(|tool| tool.to_string()).collect();
        match entry {
            Value::Mapping(_) => Self {
                role: string_field(entry, "role"),
                goal: string_field(entry, "goal"),
                backstory: string_field(entry, "backstory"),
                allow_delegation: entry
                    .get("allow_delegation")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                tools,
            },
            other => Self {
                role: scalar_text(other),
                goal: String::new(),
                backstory: String::new(),
                allow_delegation: false,
                tools,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub description: String,
    pub expected_output: String,
    /// Symbolic name of the agent that performs this task.
    pub agent: String,
    pub output_file: Option<String>,
}

impl TaskSpec {
    fn from_entry(entry: &Value, agent: &str, output_file: Option<&str>) -> Self {
        let (description, expected_output) = match entry {
            Value::Mapping(_) => (
                string_field(entry, "description"),
                string_field(entry, "expected_output"),
            ),
            other => (scalar_text(other), String::new()),
        };

        Self {
            description,
            expected_output,
            agent: agent.to_string(),
            output_file: output_file.map(str::to_string),
        }
    }
}

/// The two agents and two tasks handed to the agent runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crew {
    pub researcher: AgentSpec,
    pub reporting_analyst: AgentSpec,
    pub research_task: TaskSpec,
    pub reporting_task: TaskSpec,
}

impl Crew {
    /// Build descriptors from already-interpolated agent and task trees.
    pub fn from_trees(agents: &ConfigTree, tasks: &ConfigTree) -> Result<Self, TermScoutError> {
        Ok(Self {
            researcher: AgentSpec::from_entry(
                required(agents, RESEARCHER, "agents")?,
                &[SERPER_SEARCH_TOOL, SCRAPE_WEBSITE_TOOL],
            ),
            reporting_analyst: AgentSpec::from_entry(
                required(agents, REPORTING_ANALYST, "agents")?,
                &[],
            ),
            research_task: TaskSpec::from_entry(
                required(tasks, RESEARCH_TASK, "tasks")?,
                RESEARCHER,
                None,
            ),
            reporting_task: TaskSpec::from_entry(
                required(tasks, REPORTING_TASK, "tasks")?,
                REPORTING_ANALYST,
                Some(REPORT_FILE),
            ),
        })
    }

    pub fn from_templates(templates: &CrewTemplates) -> Result<Self, TermScoutError> {
        Self::from_trees(&templates.agents, &templates.tasks)
    }

    pub fn agent_for(&self, task: &TaskSpec) -> &AgentSpec {
        if task.agent == REPORTING_ANALYST {
            &self.reporting_analyst
        } else {
            &self.researcher
        }
    }
}

/// Named input values supplied alongside the crew.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrewInputs {
    pub entity_name: String,
    pub current_year: String,
}

impl CrewInputs {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            current_year: Utc::now().year().to_string(),
        }
    }

    pub fn with_current_year(mut self, year: impl Into<String>) -> Self {
        self.current_year = year.into();
        self
    }

    pub fn to_bindings(&self) -> Bindings {
        Bindings::new()
            .with(ENTITY_BINDING, self.entity_name.clone())
            .with("current_year", self.current_year.clone())
    }
}

fn required<'a>(tree: &'a ConfigTree, key: &str, document: &str) -> Result<&'a Value, TermScoutError> {
    tree.get(key).ok_or_else(|| {
        TermScoutError::InvalidConfiguration(format!("{document} template is missing `{key}`"))
    })
}

fn string_field(entry: &Value, field: &str) -> String {
    entry.get(field).map(scalar_text).unwrap_or_default()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => serde_yaml::to_string(other)
            .map(|text| text.trim_end().to_string())
            .unwrap_or_default(),
    }
}
