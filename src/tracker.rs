//! Scenario tracking: binds in-flight scenarios to their results and slots.
//!
//! The tracker keeps one shared table (scenario id -> open scenario, plus the
//! slot busy-table) behind a single mutex. Each open scenario has its own
//! mutex, so appending a step only contends with steps of the same scenario.
//!
//! Lock order is scenario -> table. Code holding the table lock never locks a
//! scenario.
//!
//! Two modes are supported:
//!
//! * [`FlightMode::Multi`] tracks every scenario id independently. Scenarios
//!   that never receive all their steps are not persisted; [`ScenarioTracker::finish_run`]
//!   reports them instead.
//! * [`FlightMode::Single`] assumes one scenario at a time. Beginning a new
//!   scenario, or finishing the run, force-finalizes the current one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::builder::{self, FinishedStep, ResultMeta};
use crate::container::ContainerAggregator;
use crate::error::{ReportError, Result};
use crate::model::{Label, TestResult, TimestampMs};
use crate::slots::SlotAllocator;
use crate::writer::ResultsWriter;

pub const FRAMEWORK: &str = "cucumber";
pub const LANGUAGE: &str = "rust";

/// Scenario concurrency model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightMode {
    /// Any number of scenarios in flight, each tracked by its own id.
    #[default]
    Multi,
    /// One scenario at a time; a new begin flushes the previous one.
    Single,
}

/// Descriptive fields of a scenario as reported by the runner.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMeta {
    pub name: String,
    pub feature_name: String,
    pub uri: String,
}

/// Worker label value for a slot.
pub fn worker_label(slot: u32) -> String {
    format!("worker {slot}")
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct OpenScenario {
    result: TestResult,
    total_steps: usize,
    completed: usize,
    /// Stop of the previous step; start of the next one when the caller
    /// supplies none.
    last_time: TimestampMs,
    finalized: bool,
}

type ScenarioHandle = Arc<Mutex<OpenScenario>>;

/// Table entry: the scenario and the slot it holds.
struct Bound {
    handle: ScenarioHandle,
    slot: u32,
}

#[derive(Default)]
struct Table {
    scenarios: HashMap<String, Bound>,
    slots: SlotAllocator,
    /// Most recently begun scenario (single-flight only).
    current: Option<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// ScenarioTracker
// ---------------------------------------------------------------------------

/// Routes scenario lifecycle events to per-scenario result builders and
/// hands finished results to the container and the writer.
pub struct ScenarioTracker {
    mode: FlightMode,
    suite: String,
    table: Mutex<Table>,
    container: Arc<ContainerAggregator>,
    writer: ResultsWriter,
}

impl ScenarioTracker {
    pub fn new(
        mode: FlightMode,
        suite: impl Into<String>,
        container: Arc<ContainerAggregator>,
        writer: ResultsWriter,
    ) -> Self {
        Self {
            mode,
            suite: suite.into(),
            table: Mutex::new(Table::default()),
            container,
            writer,
        }
    }

    pub fn mode(&self) -> FlightMode {
        self.mode
    }

    /// Open a result for `scenario` and bind it to a worker slot.
    ///
    /// Returns the slot. A scenario with no steps is finalized immediately.
    pub fn begin(&self, scenario: &str, meta: &ScenarioMeta, total_steps: usize) -> Result<u32> {
        let mut flushed = None;

        let (slot, empty) = {
            let mut table = lock(&self.table);

            match self.mode {
                FlightMode::Single => {
                    // The flushed scenario's slot is freed before allocating,
                    // so a single-flight run keeps reusing worker 1.
                    if let Some(previous) = table.current.take() {
                        if let Some(bound) = table.scenarios.remove(&previous) {
                            table.slots.release(bound.slot);
                            flushed = Some((previous, bound.handle));
                        }
                    }
                }
                FlightMode::Multi => {
                    if table.scenarios.contains_key(scenario) {
                        return Err(ReportError::ScenarioAlreadyOpen {
                            scenario: scenario.to_string(),
                        });
                    }
                }
            }

            let slot = table.slots.acquire();
            let result = builder::open(self.result_meta(meta, slot));
            let started = result.start;

            if self.mode == FlightMode::Single {
                table.current = Some(scenario.to_string());
            }

            if total_steps == 0 {
                table.slots.release(slot);
                (slot, Some(result))
            } else {
                let open = OpenScenario {
                    result,
                    total_steps,
                    completed: 0,
                    last_time: started,
                    finalized: false,
                };
                let bound = Bound {
                    handle: Arc::new(Mutex::new(open)),
                    slot,
                };
                table.scenarios.insert(scenario.to_string(), bound);
                (slot, None)
            }
        };

        if let Some((previous, handle)) = flushed {
            warn!(
                scenario = previous.as_str(),
                "scenario still open when the next one began; flushing"
            );
            self.flush(&handle)?;
        }

        debug!(scenario, slot, total_steps, "scenario began");

        if let Some(result) = empty {
            self.finalize(result)?;
        }

        Ok(slot)
    }

    /// Append a finished step to `scenario`.
    ///
    /// `start` defaults to the stop of the scenario's previous step. Returns
    /// the result id when this step completed the scenario.
    pub fn step_finished(
        &self,
        scenario: &str,
        step: FinishedStep,
        start: Option<TimestampMs>,
    ) -> Result<Option<String>> {
        self.advance(scenario, start, || Ok(Some(step)))
    }

    /// Like [`step_finished`](Self::step_finished), but `build` runs only once
    /// `scenario` is known to be open, under its lock. Nothing is counted
    /// when `build` fails.
    pub fn step_finished_with<F>(
        &self,
        scenario: &str,
        start: Option<TimestampMs>,
        build: F,
    ) -> Result<Option<String>>
    where
        F: FnOnce() -> Result<FinishedStep>,
    {
        self.advance(scenario, start, || build().map(Some))
    }

    /// Count a step that produces no report entry (e.g. pending) toward
    /// scenario completion.
    pub fn step_pending(&self, scenario: &str) -> Result<Option<String>> {
        self.advance(scenario, None, || Ok(None))
    }

    /// Flush what the mode allows at run end.
    ///
    /// Single-flight force-finalizes the current scenario. Multi-flight
    /// leaves unfinished scenarios unpersisted. Returns the ids of
    /// scenarios that were dropped.
    pub fn finish_run(&self) -> Result<Vec<String>> {
        let (current, dropped) = {
            let mut table = lock(&self.table);
            let current = match table.current.take() {
                Some(id) => table.scenarios.remove(&id).map(|bound| (id, bound)),
                None => None,
            };

            let remaining: Vec<(String, Bound)> = table.scenarios.drain().collect();
            for (_, bound) in current.iter().chain(remaining.iter()) {
                table.slots.release(bound.slot);
            }

            let mut dropped: Vec<String> = remaining.into_iter().map(|(id, _)| id).collect();
            dropped.sort();
            (current, dropped)
        };

        if let Some((id, bound)) = current {
            debug!(scenario = id.as_str(), "flushing current scenario at run end");
            self.flush(&bound.handle)?;
        }

        for id in &dropped {
            warn!(scenario = id.as_str(), "scenario never finished; result not persisted");
        }

        Ok(dropped)
    }

    /// Number of scenarios currently open.
    pub fn open_scenarios(&self) -> usize {
        lock(&self.table).scenarios.len()
    }

    fn advance<F>(
        &self,
        scenario: &str,
        start: Option<TimestampMs>,
        build: F,
    ) -> Result<Option<String>>
    where
        F: FnOnce() -> Result<Option<FinishedStep>>,
    {
        let unknown = || ReportError::UnknownScenario {
            scenario: scenario.to_string(),
        };

        let handle = lock(&self.table)
            .scenarios
            .get(scenario)
            .map(|bound| Arc::clone(&bound.handle))
            .ok_or_else(unknown)?;

        let finished = {
            let mut open = lock(&handle);
            if open.finalized {
                return Err(unknown());
            }

            if let Some(step) = build()? {
                let start = start.unwrap_or(open.last_time);
                let appended = builder::append_step(&mut open.result, step, start);
                open.last_time = appended.stop;
                debug!(
                    scenario,
                    step = appended.name.as_str(),
                    status = ?appended.status,
                    "step finished"
                );
            }
            open.completed += 1;

            if open.completed < open.total_steps {
                None
            } else {
                open.finalized = true;
                let mut table = lock(&self.table);
                let still_bound = table
                    .scenarios
                    .get(scenario)
                    .is_some_and(|bound| Arc::ptr_eq(&bound.handle, &handle));
                if still_bound {
                    if let Some(bound) = table.scenarios.remove(scenario) {
                        table.slots.release(bound.slot);
                    }
                }
                Some(std::mem::take(&mut open.result))
            }
        };

        match finished {
            Some(result) => {
                let id = result.id.clone();
                self.finalize(result)?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Finalize a scenario already unbound from the table, unless a
    /// completing step got there first.
    fn flush(&self, handle: &ScenarioHandle) -> Result<()> {
        let result = {
            let mut open = lock(handle);
            if open.finalized {
                return Ok(());
            }
            open.finalized = true;
            std::mem::take(&mut open.result)
        };
        self.finalize(result)
    }

    fn finalize(&self, mut result: TestResult) -> Result<()> {
        builder::close(&mut result);
        self.container.add_finished_result(&result);
        self.writer.persist_result(&result)?;
        info!(
            result = result.id.as_str(),
            name = result.name.as_str(),
            status = ?result.status,
            steps = result.steps.len(),
            "scenario result written"
        );
        Ok(())
    }

    fn result_meta(&self, meta: &ScenarioMeta, slot: u32) -> ResultMeta {
        ResultMeta {
            name: meta.name.clone(),
            history_id: format!("{}: {}", meta.feature_name, meta.name),
            full_name: format!("{}:{}", meta.uri, meta.name),
            description: meta.uri.clone(),
            labels: vec![
                Label::new("feature", meta.feature_name.as_str()),
                Label::new("suite", self.suite.as_str()),
                Label::new("framework", FRAMEWORK),
                Label::new("language", LANGUAGE),
                Label::new("thread", worker_label(slot)),
            ],
            ..ResultMeta::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;
    use crate::store::MemoryStore;
    use crate::writer::result_artifact_name;

    struct Fixture {
        store: Arc<MemoryStore>,
        container: Arc<ContainerAggregator>,
        tracker: ScenarioTracker,
    }

    fn fixture(mode: FlightMode) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let container = Arc::new(ContainerAggregator::new("Features"));
        let tracker = ScenarioTracker::new(
            mode,
            "Features",
            container.clone(),
            ResultsWriter::new(store.clone()),
        );
        Fixture {
            store,
            container,
            tracker,
        }
    }

    fn meta(name: &str) -> ScenarioMeta {
        ScenarioMeta {
            name: name.into(),
            feature_name: "Calculator".into(),
            uri: "features/calc.feature".into(),
        }
    }

    fn persisted(fx: &Fixture, id: &str) -> TestResult {
        let bytes = fx.store.get(&result_artifact_name(id)).expect("result persisted");
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_scenario_finishes_when_steps_exhausted() {
        let fx = fixture(FlightMode::Multi);
        fx.tracker.begin("s1", &meta("add"), 2).unwrap();

        let first = fx
            .tracker
            .step_finished("s1", FinishedStep::new("I pass", Status::Passed), None)
            .unwrap();
        assert!(first.is_none());

        let id = fx
            .tracker
            .step_finished("s1", FinishedStep::new("I fail", Status::Failed), None)
            .unwrap()
            .expect("scenario complete");

        let result = persisted(&fx, &id);
        assert_eq!(result.status, Some(Status::Failed));
        assert_eq!(result.steps.len(), 2);
        assert!(result.stage.is_some());
        assert_eq!(fx.container.snapshot().children, vec![id]);
        assert_eq!(fx.tracker.open_scenarios(), 0);
    }

    #[test]
    fn test_result_metadata_and_labels() {
        let fx = fixture(FlightMode::Multi);
        let slot = fx.tracker.begin("s1", &meta("add"), 1).unwrap();
        let id = fx
            .tracker
            .step_finished("s1", FinishedStep::new("x", Status::Passed), None)
            .unwrap()
            .unwrap();

        let result = persisted(&fx, &id);
        assert_eq!(result.name, "add");
        assert_eq!(result.history_id, "Calculator: add");
        assert_eq!(result.full_name, "features/calc.feature:add");
        assert_eq!(result.description, "features/calc.feature");
        assert_eq!(result.label("feature"), Some("Calculator"));
        assert_eq!(result.label("suite"), Some("Features"));
        assert_eq!(result.label("framework"), Some(FRAMEWORK));
        assert_eq!(result.label("language"), Some(LANGUAGE));
        assert_eq!(result.label("thread"), Some(worker_label(slot).as_str()));
    }

    #[test]
    fn test_step_starts_chain_from_previous_stop() {
        let fx = fixture(FlightMode::Multi);
        fx.tracker.begin("s1", &meta("chain"), 3).unwrap();
        fx.tracker
            .step_finished("s1", FinishedStep::new("a", Status::Passed), None)
            .unwrap();
        fx.tracker
            .step_finished("s1", FinishedStep::new("b", Status::Passed), Some(5))
            .unwrap();
        let id = fx
            .tracker
            .step_finished("s1", FinishedStep::new("c", Status::Passed), None)
            .unwrap()
            .unwrap();

        let result = persisted(&fx, &id);
        assert_eq!(result.steps[0].start, result.start);
        assert_eq!(result.steps[1].start, 5);
        assert_eq!(result.steps[2].start, result.steps[1].stop);
    }

    #[test]
    fn test_unknown_scenario_is_an_error() {
        let fx = fixture(FlightMode::Multi);
        let err = fx
            .tracker
            .step_finished("ghost", FinishedStep::new("x", Status::Passed), None)
            .unwrap_err();
        assert!(matches!(err, ReportError::UnknownScenario { .. }));
    }

    #[test]
    fn test_step_builder_runs_only_for_open_scenario() {
        let fx = fixture(FlightMode::Multi);
        let mut built = false;
        let err = fx
            .tracker
            .step_finished_with("ghost", None, || {
                built = true;
                Ok(FinishedStep::new("x", Status::Passed))
            })
            .unwrap_err();
        assert!(matches!(err, ReportError::UnknownScenario { .. }));
        assert!(!built);
    }

    #[test]
    fn test_failed_step_builder_is_not_counted() {
        let fx = fixture(FlightMode::Multi);
        fx.tracker.begin("s1", &meta("one"), 1).unwrap();
        let err = fx
            .tracker
            .step_finished_with("s1", None, || {
                Err(ReportError::UnknownScenario {
                    scenario: "s1".into(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, ReportError::UnknownScenario { .. }));
        assert_eq!(fx.tracker.open_scenarios(), 1);

        let id = fx
            .tracker
            .step_finished("s1", FinishedStep::new("x", Status::Passed), None)
            .unwrap();
        assert!(id.is_some());
    }

    #[test]
    fn test_step_after_completion_is_an_error() {
        let fx = fixture(FlightMode::Multi);
        fx.tracker.begin("s1", &meta("one"), 1).unwrap();
        fx.tracker
            .step_finished("s1", FinishedStep::new("x", Status::Passed), None)
            .unwrap();
        assert!(fx
            .tracker
            .step_finished("s1", FinishedStep::new("y", Status::Passed), None)
            .is_err());
    }

    #[test]
    fn test_multi_flight_rejects_reopening_open_scenario() {
        let fx = fixture(FlightMode::Multi);
        fx.tracker.begin("s1", &meta("one"), 2).unwrap();
        let err = fx.tracker.begin("s1", &meta("one"), 2).unwrap_err();
        assert!(matches!(err, ReportError::ScenarioAlreadyOpen { .. }));
    }

    #[test]
    fn test_slots_are_distinct_while_open_and_reused_after() {
        let fx = fixture(FlightMode::Multi);
        let a = fx.tracker.begin("a", &meta("a"), 1).unwrap();
        let b = fx.tracker.begin("b", &meta("b"), 1).unwrap();
        assert_ne!(a, b);

        fx.tracker
            .step_finished("a", FinishedStep::new("x", Status::Passed), None)
            .unwrap();
        let c = fx.tracker.begin("c", &meta("c"), 1).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn test_pending_counts_toward_completion() {
        let fx = fixture(FlightMode::Multi);
        fx.tracker.begin("s1", &meta("pending"), 2).unwrap();
        fx.tracker
            .step_finished("s1", FinishedStep::new("x", Status::Passed), None)
            .unwrap();
        let id = fx.tracker.step_pending("s1").unwrap().unwrap();
        assert_eq!(persisted(&fx, &id).steps.len(), 1);
    }

    #[test]
    fn test_zero_step_scenario_finalizes_immediately() {
        let fx = fixture(FlightMode::Multi);
        fx.tracker.begin("empty", &meta("empty"), 0).unwrap();
        assert_eq!(fx.tracker.open_scenarios(), 0);
        assert_eq!(fx.container.snapshot().children.len(), 1);
    }

    #[test]
    fn test_multi_flight_drops_unfinished_at_run_end() {
        let fx = fixture(FlightMode::Multi);
        fx.tracker.begin("s1", &meta("stuck"), 3).unwrap();
        fx.tracker
            .step_finished("s1", FinishedStep::new("x", Status::Passed), None)
            .unwrap();

        let dropped = fx.tracker.finish_run().unwrap();
        assert_eq!(dropped, vec!["s1".to_string()]);
        assert!(fx.container.snapshot().children.is_empty());
        assert!(fx.store.names().is_empty());
    }

    #[test]
    fn test_single_flight_flushes_previous_on_begin() {
        let fx = fixture(FlightMode::Single);
        let first = fx.tracker.begin("s1", &meta("first"), 5).unwrap();
        fx.tracker
            .step_finished("s1", FinishedStep::new("x", Status::Failed), None)
            .unwrap();

        let second = fx.tracker.begin("s2", &meta("second"), 5).unwrap();
        assert_eq!(first, second, "single flight keeps reusing the same worker");

        let children = fx.container.snapshot().children;
        assert_eq!(children.len(), 1);
        let flushed = persisted(&fx, &children[0]);
        assert_eq!(flushed.name, "first");
        assert_eq!(flushed.status, Some(Status::Failed));
    }

    #[test]
    fn test_single_flight_flushes_current_at_run_end() {
        let fx = fixture(FlightMode::Single);
        fx.tracker.begin("s1", &meta("only"), 4).unwrap();
        fx.tracker
            .step_finished("s1", FinishedStep::new("x", Status::Passed), None)
            .unwrap();

        let dropped = fx.tracker.finish_run().unwrap();
        assert!(dropped.is_empty());
        assert_eq!(fx.container.snapshot().children.len(), 1);
    }

    #[test]
    fn test_single_flight_completed_scenario_not_flushed_twice() {
        let fx = fixture(FlightMode::Single);
        fx.tracker.begin("s1", &meta("done"), 1).unwrap();
        fx.tracker
            .step_finished("s1", FinishedStep::new("x", Status::Passed), None)
            .unwrap();
        fx.tracker.begin("s2", &meta("next"), 1).unwrap();
        fx.tracker.finish_run().unwrap();

        assert_eq!(fx.container.snapshot().children.len(), 2);
    }
}
