//! Error taxonomy for the report engine.
//!
//! Every variant is terminal for the run: the engine never retries, and a
//! caller receiving any of these should treat the report as incomplete.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to create allure results directory {path}")]
    CreateResultsDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write artifact {path}")]
    WriteArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {artifact}")]
    Serialize {
        artifact: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read config file {path}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("step finished for unknown scenario {scenario:?}")]
    UnknownScenario { scenario: String },

    #[error("scenario {scenario:?} began while it is still open")]
    ScenarioAlreadyOpen { scenario: String },

    #[error("feed line {line}: {source}")]
    Feed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read event feed")]
    FeedRead(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;
