use std::path::PathBuf;

use thiserror::Error;

use crate::template::InterpolationError;

/// Core error type for TermScout.
#[derive(Debug, Error)]
pub enum TermScoutError {
    #[error("could not identify a company, product, or service in the request")]
    EntityNotIdentified,
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to write {path}: {source}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
    #[error("agent runtime failure: {0}")]
    Runtime(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TermScoutError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }

    pub fn config_parse(path: PathBuf, source: serde_yaml::Error) -> Self {
        Self::ConfigParse { path, source }
    }

    pub fn report_write(path: PathBuf, source: std::io::Error) -> Self {
        Self::ReportWrite { path, source }
    }

    /// True when the caller should ask the user to rephrase rather than fail.
    pub fn is_entity_not_identified(&self) -> bool {
        matches!(self, Self::EntityNotIdentified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_not_identified_is_flagged() {
        assert!(TermScoutError::EntityNotIdentified.is_entity_not_identified());
        assert!(!TermScoutError::Runtime("boom".into()).is_entity_not_identified());
    }

    #[test]
    fn config_io_mentions_path() {
        let err = TermScoutError::config_io(
            PathBuf::from("config/agents.yaml"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().contains("config/agents.yaml"));
    }
}
