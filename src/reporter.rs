//! Event-feed facade over the aggregation engine.
//!
//! [`Reporter`] is what a test-runner adapter talks to: four lifecycle calls
//! (or [`Reporter::handle`] for decoded [`Event`]s). Every call is safe to
//! make from concurrently running scenario workers.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::attachment::{AttachmentEncoder, StepArgument};
use crate::builder::FinishedStep;
use crate::config::ReportConfig;
use crate::container::ContainerAggregator;
use crate::error::Result;
use crate::events::{Event, StepOutcome};
use crate::executor::{self, EnvSource};
use crate::model::{Container, Executor, StatusDetails};
use crate::store::{ArtifactStore, FsStore};
use crate::tracker::{ScenarioMeta, ScenarioTracker};
use crate::writer::ResultsWriter;

/// What `run_ended` wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub container_id: String,
    pub results: usize,
    pub executor_written: bool,
    pub environment_written: bool,
    /// Scenarios that never finished and were not persisted.
    pub dropped: Vec<String>,
}

pub struct Reporter {
    config: ReportConfig,
    store: Arc<dyn ArtifactStore>,
    encoder: AttachmentEncoder,
    writer: ResultsWriter,
    container: Arc<ContainerAggregator>,
    tracker: ScenarioTracker,
}

impl Reporter {
    /// Reporter writing to the filesystem under `config.results_path`.
    pub fn new(config: ReportConfig) -> Self {
        let config = config.normalized();
        let store = Arc::new(FsStore::new(config.results_path.clone()));
        Self::with_store(config, store)
    }

    /// Reporter writing through a custom store.
    pub fn with_store(config: ReportConfig, store: Arc<dyn ArtifactStore>) -> Self {
        let config = config.normalized();
        let writer = ResultsWriter::new(Arc::clone(&store));
        let container = Arc::new(ContainerAggregator::new(config.suite.as_str()));
        let tracker = ScenarioTracker::new(
            config.mode,
            config.suite.as_str(),
            Arc::clone(&container),
            writer.clone(),
        );

        Self {
            encoder: AttachmentEncoder::new(Arc::clone(&store)),
            store,
            writer,
            container,
            tracker,
            config,
        }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Prepare the results root.
    pub fn run_started(&self) -> Result<()> {
        self.store.prepare()?;
        info!(
            results = %self.config.results_path.display(),
            suite = self.config.suite.as_str(),
            mode = ?self.config.mode,
            "test run started"
        );
        Ok(())
    }

    /// Open a scenario; returns its worker slot.
    pub fn scenario_begin(
        &self,
        scenario: &str,
        meta: &ScenarioMeta,
        total_steps: usize,
    ) -> Result<u32> {
        self.tracker.begin(scenario, meta, total_steps)
    }

    /// Record a finished step. Returns the result id when it completed the
    /// scenario.
    pub fn step_finished(
        &self,
        scenario: &str,
        step: &str,
        outcome: StepOutcome,
        error: Option<&str>,
        argument: Option<&StepArgument>,
    ) -> Result<Option<String>> {
        let Some(status) = outcome.status() else {
            return self.tracker.step_pending(scenario);
        };

        // The attachment is written only once the scenario is known to be open.
        self.tracker.step_finished_with(scenario, None, || {
            let mut finished = FinishedStep::new(step, status);
            if let Some(message) = error {
                finished = finished.with_details(StatusDetails::with_message(message));
            }
            if let Some(argument) = argument {
                finished = finished.with_attachment(self.encoder.argument(argument)?);
            }
            Ok(finished)
        })
    }

    /// Flush the run: remaining results, container, executor, environment.
    ///
    /// Executor fields are taken from the environment only when `executor`
    /// has no name. Calling this twice rewrites the same artifacts.
    pub fn run_ended(&self, executor: Option<Executor>, env: &dyn EnvSource) -> Result<RunSummary> {
        let dropped = self.tracker.finish_run()?;

        let container = self.container.finish();
        self.writer.persist_container(&container)?;

        let executor = executor::populate_executor(executor.unwrap_or_default(), env);
        let executor_written = self.writer.persist_executor(&executor)?;

        let properties = executor::environment_properties(env, &self.config.env_prefix);
        let environment_written = self.writer.persist_environment(&properties)?;

        let summary = RunSummary {
            container_id: container.id.clone(),
            results: container.children.len(),
            executor_written,
            environment_written,
            dropped,
        };

        info!(
            container = summary.container_id.as_str(),
            results = summary.results,
            executor = summary.executor_written,
            environment = summary.environment_written,
            dropped = summary.dropped.len(),
            "test run ended"
        );
        Ok(summary)
    }

    /// Dispatch one decoded feed event.
    pub fn handle(&self, event: Event, env: &dyn EnvSource) -> Result<Option<RunSummary>> {
        match event {
            Event::RunStarted => self.run_started()?,
            Event::ScenarioBegin {
                scenario,
                name,
                feature,
                uri,
                total_steps,
            } => {
                let meta = ScenarioMeta {
                    name,
                    feature_name: feature,
                    uri,
                };
                self.scenario_begin(&scenario, &meta, total_steps)?;
            }
            Event::StepFinished {
                scenario,
                step,
                status,
                error,
                argument,
            } => {
                self.step_finished(
                    &scenario,
                    &step,
                    status,
                    error.as_deref(),
                    argument.as_ref(),
                )?;
            }
            Event::RunEnded { executor } => return self.run_ended(executor, env).map(Some),
        }
        Ok(None)
    }

    /// Current container state.
    pub fn container(&self) -> Container {
        self.container.snapshot()
    }

    /// Number of scenarios currently in flight.
    pub fn open_scenarios(&self) -> usize {
        self.tracker.open_scenarios()
    }
}
