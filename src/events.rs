//! Test-run lifecycle events.
//!
//! The feed is a JSON-lines stream, one tagged event per line:
//!
//! ```text
//! {"event":"run_started"}
//! {"event":"scenario_begin","scenario":"7","name":"add","feature":"Calc","uri":"calc.feature","total_steps":2}
//! {"event":"step_finished","scenario":"7","step":"I add","status":"passed"}
//! {"event":"step_finished","scenario":"7","step":"I check","status":"failed","error":"expected 3"}
//! {"event":"run_ended"}
//! ```

use std::io::BufRead;

use serde::{Deserialize, Serialize};

use crate::attachment::StepArgument;
use crate::error::{ReportError, Result};
use crate::model::{Executor, Status};

/// Step outcome as reported by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Passed,
    Failed,
    Broken,
    Skipped,
    Unknown,
    /// No step definition matched; reported as broken.
    Undefined,
    /// Step definition is pending; counted but not reported.
    Pending,
}

impl StepOutcome {
    /// Report status, or `None` for outcomes that produce no step entry.
    pub fn status(self) -> Option<Status> {
        match self {
            StepOutcome::Passed => Some(Status::Passed),
            StepOutcome::Failed => Some(Status::Failed),
            StepOutcome::Broken | StepOutcome::Undefined => Some(Status::Broken),
            StepOutcome::Skipped => Some(Status::Skipped),
            StepOutcome::Unknown => Some(Status::Unknown),
            StepOutcome::Pending => None,
        }
    }
}

impl From<Status> for StepOutcome {
    fn from(status: Status) -> Self {
        match status {
            Status::Passed => StepOutcome::Passed,
            Status::Failed => StepOutcome::Failed,
            Status::Broken => StepOutcome::Broken,
            Status::Skipped => StepOutcome::Skipped,
            Status::Unknown => StepOutcome::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    RunStarted,
    ScenarioBegin {
        scenario: String,
        name: String,
        #[serde(default)]
        feature: String,
        #[serde(default)]
        uri: String,
        total_steps: usize,
    },
    StepFinished {
        scenario: String,
        step: String,
        status: StepOutcome,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        argument: Option<StepArgument>,
    },
    RunEnded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        executor: Option<Executor>,
    },
}

/// Parse a JSON-lines feed. Blank lines are skipped; errors carry the
/// 1-based line number.
pub fn read_feed<R: BufRead>(reader: R) -> impl Iterator<Item = Result<Event>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(index, line)| match line {
            Err(e) => Some(Err(ReportError::FeedRead(e))),
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(serde_json::from_str(&line).map_err(|source| ReportError::Feed {
                line: index + 1,
                source,
            })),
        })
}
