//! allure-report -- concurrent Allure report aggregation for BDD test runs.
//!
//! Turns a stream of test lifecycle events (run started, scenario begins,
//! step finishes, run ends) into an Allure results directory: one
//! `-result.json` per scenario, one `-container.json` per run, attachments,
//! and optional `executor.json` / `environment.properties`.
//!
//! Scenarios may run concurrently. Each one is tracked by a caller-supplied
//! id, gets a small "worker" slot for timeline grouping, and is persisted
//! exactly once when its last step arrives.

pub mod attachment;
pub mod builder;
pub mod config;
pub mod container;
pub mod error;
pub mod events;
pub mod executor;
pub mod ids;
pub mod model;
pub mod reporter;
pub mod slots;
pub mod store;
pub mod tracker;
pub mod writer;

pub use config::ReportConfig;
pub use error::{ReportError, Result};
pub use events::{Event, StepOutcome};
pub use model::{Container, Executor, Status, TestResult};
pub use reporter::{Reporter, RunSummary};
pub use tracker::{FlightMode, ScenarioMeta};

use std::io::BufRead;

use executor::EnvSource;

/// Drive `reporter` from a JSON-lines event feed until it is exhausted.
///
/// Returns the summary of the last `run_ended` event, if any.
pub fn replay<R: BufRead>(
    reporter: &Reporter,
    feed: R,
    env: &dyn EnvSource,
) -> Result<Option<RunSummary>> {
    let mut summary = None;
    for event in events::read_feed(feed) {
        if let Some(s) = reporter.handle(event?, env)? {
            summary = Some(s);
        }
    }
    Ok(summary)
}
