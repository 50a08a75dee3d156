//! First-run environment preparation: `.env` scaffolding and Ollama checks.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::TermScoutError;

pub const ENV_FILE: &str = ".env";
pub const ENV_TEMPLATE: &str = ".env.example";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvFileStatus {
    Created,
    KeptExisting,
    TemplateMissing,
}

/// Copy `.env.example` to `.env` inside `dir`.
///
/// An existing `.env` is only replaced when `overwrite` is set.
pub fn ensure_env_file(dir: &Path, overwrite: bool) -> Result<EnvFileStatus, TermScoutError> {
    let target = dir.join(ENV_FILE);
    if target.exists() && !overwrite {
        debug!(path = %target.display(), "keeping existing env file");
        return Ok(EnvFileStatus::KeptExisting);
    }

    let template = dir.join(ENV_TEMPLATE);
    if !template.is_file() {
        return Ok(EnvFileStatus::TemplateMissing);
    }

    fs::copy(&template, &target).map_err(|err| TermScoutError::report_write(target.clone(), err))?;
    info!(path = %target.display(), "created env file from template");
    Ok(EnvFileStatus::Created)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OllamaStatus {
    pub installed: bool,
    pub running: bool,
}

/// Check `ollama --version` and `ollama list`.
pub fn check_ollama() -> OllamaStatus {
    check_ollama_with("ollama")
}

pub fn check_ollama_with(binary: &str) -> OllamaStatus {
    let installed = command_succeeds(binary, &["--version"]);
    let running = installed && command_succeeds(binary, &["list"]);
    OllamaStatus { installed, running }
}

fn command_succeeds(binary: &str, args: &[&str]) -> bool {
    match Command::new(binary)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) => status.success(),
        Err(err) => {
            debug!(binary, ?args, error = %err, "ollama command failed to start");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_env_from_template() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(ENV_TEMPLATE), "SERPER_API_KEY=\n").unwrap();

        let status = ensure_env_file(dir.path(), false).unwrap();
        assert_eq!(status, EnvFileStatus::Created);
        assert_eq!(
            fs::read_to_string(dir.path().join(ENV_FILE)).unwrap(),
            "SERPER_API_KEY=\n"
        );
    }

    #[test]
    fn keeps_existing_env_unless_overwriting() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(ENV_TEMPLATE), "FRESH=1\n").unwrap();
        fs::write(dir.path().join(ENV_FILE), "MINE=1\n").unwrap();

        assert_eq!(
            ensure_env_file(dir.path(), false).unwrap(),
            EnvFileStatus::KeptExisting
        );
        assert_eq!(
            fs::read_to_string(dir.path().join(ENV_FILE)).unwrap(),
            "MINE=1\n"
        );

        assert_eq!(
            ensure_env_file(dir.path(), true).unwrap(),
            EnvFileStatus::Created
        );
        assert_eq!(
            fs::read_to_string(dir.path().join(ENV_FILE)).unwrap(),
            "FRESH=1\n"
        );
    }

    #[test]
    fn reports_missing_template() {
        let dir = tempdir().unwrap();
        assert_eq!(
            ensure_env_file(dir.path(), false).unwrap(),
            EnvFileStatus::TemplateMissing
        );
    }

    #[test]
    fn missing_binary_is_not_installed() {
        let status = check_ollama_with("termscout-definitely-not-a-binary");
        assert_eq!(
            status,
            OllamaStatus {
                installed: false,
                running: false
            }
        );
    }
}
