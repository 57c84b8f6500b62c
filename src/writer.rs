//! Serializes finished records into named artifacts.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::{ReportError, Result};
use crate::model::{Container, Executor, TestResult};
use crate::store::ArtifactStore;

pub const EXECUTOR_ARTIFACT: &str = "executor.json";
pub const ENVIRONMENT_ARTIFACT: &str = "environment.properties";

pub fn result_artifact_name(id: &str) -> String {
    format!("{id}-result.json")
}

pub fn container_artifact_name(id: &str) -> String {
    format!("{id}-container.json")
}

/// Writes report artifacts through an [`ArtifactStore`].
#[derive(Clone)]
pub struct ResultsWriter {
    store: Arc<dyn ArtifactStore>,
}

impl ResultsWriter {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn persist_result(&self, result: &TestResult) -> Result<()> {
        self.write_json(&result_artifact_name(&result.id), result)
    }

    pub fn persist_container(&self, container: &Container) -> Result<()> {
        self.write_json(&container_artifact_name(&container.id), container)
    }

    /// Write `executor.json`. Returns `false` without writing when the
    /// executor has no name.
    pub fn persist_executor(&self, executor: &Executor) -> Result<bool> {
        if executor.name.is_empty() {
            return Ok(false);
        }
        self.write_json(EXECUTOR_ARTIFACT, executor)?;
        Ok(true)
    }

    /// Write `environment.properties`, one line per entry in order. Returns
    /// `false` without writing when there are no entries.
    pub fn persist_environment(&self, lines: &[String]) -> Result<bool> {
        if lines.is_empty() {
            return Ok(false);
        }

        let mut body = String::new();
        for line in lines {
            body.push_str(line);
            body.push('\n');
        }
        self.store.put(ENVIRONMENT_ARTIFACT, body.as_bytes())?;
        Ok(true)
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(|source| ReportError::Serialize {
            artifact: name.to_string(),
            source,
        })?;
        self.store.put(name, &bytes)?;
        debug!(artifact = name, "json artifact persisted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
