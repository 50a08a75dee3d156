use std::{
    env, fs,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::security::{SecretValue, optional_secret};
use crate::template::{Bindings, ConfigTree, interpolate_with};
use crate::TermScoutError;

const DEFAULT_CONFIG_DIR: &str = "config";
const CONFIG_DIR_ENV: &str = "TERMSCOUT_CONFIG_DIR";
const AGENTS_FILE: &str = "agents.yaml";
const TASKS_FILE: &str = "tasks.yaml";

/// The two declarative documents describing the crew.
#[derive(Debug, Clone, PartialEq)]
pub struct CrewTemplates {
    pub agents: ConfigTree,
    pub tasks: ConfigTree,
}

impl CrewTemplates {
    pub fn new(agents: ConfigTree, tasks: ConfigTree) -> Self {
        Self { agents, tasks }
    }

    /// Load `agents.yaml` and `tasks.yaml` from `dir`.
    pub fn load(dir: &Path) -> Result<Self, TermScoutError> {
        let agents = load_config_tree(&dir.join(AGENTS_FILE))?;
        let tasks = load_config_tree(&dir.join(TASKS_FILE))?;
        Ok(Self { agents, tasks })
    }

    /// Interpolate both trees independently; `self` is left untouched.
    pub fn render(&self, bindings: &Bindings) -> Result<Self, TermScoutError> {
        Ok(Self {
            agents: interpolate_with(&self.agents, bindings)?,
            tasks: interpolate_with(&self.tasks, bindings)?,
        })
    }
}

/// Read a single YAML document into a [`ConfigTree`].
pub fn load_config_tree(path: &Path) -> Result<ConfigTree, TermScoutError> {
    let raw = fs::read_to_string(path)
        .map_err(|err| TermScoutError::config_io(path.to_path_buf(), err))?;
    let tree: ConfigTree = serde_yaml::from_str(&raw)
        .map_err(|err| TermScoutError::config_parse(path.to_path_buf(), err))?;

    if !tree.is_mapping() {
        return Err(TermScoutError::InvalidConfiguration(format!(
            "{} must contain a mapping of symbolic names",
            path.display()
        )));
    }

    debug!(path = %path.display(), "loaded crew template");
    Ok(tree)
}

/// Helper to locate the crew template directory.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolution order:
    /// 1. Explicit `dir` argument.
    /// 2. `TERMSCOUT_CONFIG_DIR` environment variable.
    /// 3. `config` in the current working directory.
    pub fn resolve_dir(dir: Option<PathBuf>) -> PathBuf {
        if let Some(dir) = dir {
            return dir;
        }

        if let Ok(from_env) = env::var(CONFIG_DIR_ENV)
            && !from_env.trim().is_empty()
        {
            return PathBuf::from(from_env);
        }

        PathBuf::from(DEFAULT_CONFIG_DIR)
    }

    pub fn load(dir: Option<PathBuf>) -> Result<CrewTemplates, TermScoutError> {
        CrewTemplates::load(&Self::resolve_dir(dir))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Ollama,
    Offline,
}

impl BackendKind {
    pub fn parse(input: &str) -> Result<Self, TermScoutError> {
        match input.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "offline" => Ok(Self::Offline),
            other => Err(TermScoutError::InvalidConfiguration(format!(
                "unknown backend `{other}` (expected `ollama` or `offline`)"
            ))),
        }
    }
}

/// Runtime settings for the LLM backend and research tools.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub kind: BackendKind,
    pub ollama_url: String,
    pub model: String,
    pub serper_api_key: Option<SecretValue>,
    pub scrape_char_limit: usize,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::Ollama,
            ollama_url: Self::DEFAULT_OLLAMA_URL.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            serper_api_key: None,
            scrape_char_limit: Self::DEFAULT_SCRAPE_CHAR_LIMIT,
        }
    }
}

impl BackendSettings {
    const DEFAULT_OLLAMA_URL: &'static str = "http://localhost:11434";
    const DEFAULT_MODEL: &'static str = "llama2";
    const DEFAULT_SCRAPE_CHAR_LIMIT: usize = 8_000;

    pub fn offline() -> Self {
        Self {
            kind: BackendKind::Offline,
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, TermScoutError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup (environment, tests, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TermScoutError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let kind = non_blank("TERMSCOUT_BACKEND")
            .map(|value| BackendKind::parse(&value))
            .transpose()?
            .unwrap_or(BackendKind::Ollama);

        let scrape_char_limit = non_blank("TERMSCOUT_SCRAPE_CHAR_LIMIT")
            .map(|value| {
                value.parse::<usize>().map_err(|_| {
                    TermScoutError::InvalidConfiguration(
                        "TERMSCOUT_SCRAPE_CHAR_LIMIT must be a positive integer".into(),
                    )
                })
            })
            .transpose()?
            .filter(|limit| *limit > 0)
            .unwrap_or(Self::DEFAULT_SCRAPE_CHAR_LIMIT);

        Ok(Self {
            kind,
            ollama_url: non_blank("OLLAMA_BASE_URL")
                .unwrap_or_else(|| Self::DEFAULT_OLLAMA_URL.to_string()),
            model: non_blank("OLLAMA_MODEL").unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            serper_api_key: optional_secret(lookup("SERPER_API_KEY")),
            scrape_char_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn loads_and_renders_templates() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(AGENTS_FILE),
            "researcher:\n  goal: Find T&C for {entity_name}\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(TASKS_FILE),
            "research_task:\n  description: Research {entity_name}\n",
        )
        .unwrap();

        let templates = CrewTemplates::load(dir.path()).unwrap();
        let rendered = templates.render(&Bindings::entity("Netflix")).unwrap();

        assert_eq!(
            rendered.agents["researcher"]["goal"].as_str(),
            Some("Find T&C for Netflix")
        );
        assert_eq!(
            rendered.tasks["research_task"]["description"].as_str(),
            Some("Research Netflix")
        );
        assert_eq!(
            templates.agents["researcher"]["goal"].as_str(),
            Some("Find T&C for {entity_name}")
        );
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempdir().unwrap();
        let err = CrewTemplates::load(dir.path()).unwrap_err();
        assert!(matches!(err, TermScoutError::ConfigIo { .. }));
        assert!(err.to_string().contains(AGENTS_FILE));
    }

    #[test]
    fn non_mapping_document_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(AGENTS_FILE);
        fs::write(&path, "- just\n- a list\n").unwrap();
        let err = load_config_tree(&path).unwrap_err();
        assert!(matches!(err, TermScoutError::InvalidConfiguration(_)));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(TASKS_FILE);
        fs::write(&path, "research_task: [unterminated\n").unwrap();
        let err = load_config_tree(&path).unwrap_err();
        assert!(matches!(err, TermScoutError::ConfigParse { .. }));
    }

    #[test]
    fn explicit_dir_wins() {
        let dir = ConfigLoader::resolve_dir(Some(PathBuf::from("/tmp/crew")));
        assert_eq!(dir, PathBuf::from("/tmp/crew"));
    }

    #[test]
    fn settings_default_to_ollama() {
        let settings = BackendSettings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(settings.kind, BackendKind::Ollama);
        assert_eq!(settings.ollama_url, "http://localhost:11434");
        assert_eq!(settings.model, "llama2");
        assert!(settings.serper_api_key.is_none());
    }

    #[test]
    fn settings_read_overrides() {
        let settings = BackendSettings::from_lookup(lookup_from(&[
            ("TERMSCOUT_BACKEND", "Offline"),
            ("OLLAMA_MODEL", "mistral"),
            ("SERPER_API_KEY", "serper-key"),
            ("TERMSCOUT_SCRAPE_CHAR_LIMIT", "1200"),
        ]))
        .unwrap();
        assert_eq!(settings.kind, BackendKind::Offline);
        assert_eq!(settings.model, "mistral");
        assert_eq!(settings.scrape_char_limit, 1200);
        assert_eq!(
            settings.serper_api_key.as_ref().map(SecretValue::expose),
            Some("serper-key")
        );
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err =
            BackendSettings::from_lookup(lookup_from(&[("TERMSCOUT_BACKEND", "gpt")])).unwrap_err();
        assert!(matches!(err, TermScoutError::InvalidConfiguration(_)));
    }
}
