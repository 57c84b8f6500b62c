//! Lifecycle of a single scenario's [`TestResult`].
//!
//! Status aggregation is "last non-skipped step wins": a later non-skipped
//! step always overrides the result status, a skipped step only fills an
//! unset status, and step details always overwrite result details when
//! present. This is not a severity ranking; `[passed, failed, passed]`
//! reports `passed`.

use crate::ids;
use crate::model::{
    Attachment, Label, Link, Parameter, Stage, Status, StatusDetails, Step, TestResult,
    TimestampMs,
};

/// Caller-supplied metadata for a new result.
#[derive(Debug, Clone, Default)]
pub struct ResultMeta {
    /// Explicit id; a fresh one is generated when `None`.
    pub id: Option<String>,
    pub name: String,
    pub full_name: String,
    pub history_id: String,
    pub description: String,
    /// Explicit start; `now` when `None`.
    pub start: Option<TimestampMs>,
    pub labels: Vec<Label>,
    pub links: Vec<Link>,
    pub parameters: Vec<Parameter>,
}

/// A finished step as reported by the runner.
#[derive(Debug, Clone)]
pub struct FinishedStep {
    pub name: String,
    pub status: Status,
    pub details: Option<StatusDetails>,
    pub attachments: Vec<Attachment>,
}

impl FinishedStep {
    pub fn new(name: impl Into<String>, status: Status) -> Self {
        Self {
            name: name.into(),
            status,
            details: None,
            attachments: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: StatusDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Open a new result. Its stage stays unset until [`close`].
pub fn open(meta: ResultMeta) -> TestResult {
    TestResult {
        id: meta.id.unwrap_or_else(ids::new_id),
        history_id: meta.history_id,
        name: meta.name,
        full_name: meta.full_name,
        description: meta.description,
        start: meta.start.unwrap_or_else(ids::now_ms),
        labels: meta.labels,
        links: meta.links,
        parameters: meta.parameters,
        ..TestResult::default()
    }
}

/// Append a finished step stopped at `now` and fold its status into the result.
pub fn append_step(result: &mut TestResult, finished: FinishedStep, start: TimestampMs) -> Step {
    let step = Step {
        name: finished.name,
        status: Some(finished.status),
        status_details: finished.details.clone(),
        stage: Stage::Finished,
        attachments: finished.attachments,
        start,
        stop: ids::now_ms(),
        ..Step::default()
    };

    if finished.status != Status::Skipped || result.status.is_none() {
        result.status = Some(finished.status);
    }

    if let Some(details) = finished.details {
        result.status_details = Some(details);
    }

    result.steps.push(step.clone());
    step
}

/// Mark the result finished. An explicit stop is kept.
pub fn close(result: &mut TestResult) {
    result.stage = Some(Stage::Finished);
    if result.stop == 0 {
        result.stop = ids::now_ms();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn run(statuses: &[Status]) -> TestResult {
        let mut result = open(ResultMeta::default());
        for (i, status) in statuses.iter().enumerate() {
            append_step(&mut result, FinishedStep::new(format!("step {i}"), *status), 0);
        }
        result
    }

    #[test]
    fn test_open_assigns_id_and_start() {
        let result = open(ResultMeta {
            name: "Scenario".into(),
            ..ResultMeta::default()
        });
        assert!(!result.id.is_empty());
        assert!(result.start > 0);
        assert!(result.stage.is_none());
        assert!(result.status.is_none());
    }

    #[test]
    fn test_open_keeps_explicit_id_and_start() {
        let result = open(ResultMeta {
            id: Some("fixed".into()),
            start: Some(42),
            ..ResultMeta::default()
        });
        assert_eq!(result.id, "fixed");
        assert_eq!(result.start, 42);
    }

    #[test]
    fn test_all_skipped_is_skipped() {
        let result = run(&[Status::Skipped, Status::Skipped]);
        assert_eq!(result.status, Some(Status::Skipped));
    }

    #[test]
    fn test_last_non_skipped_wins() {
        assert_eq!(
            run(&[Status::Passed, Status::Failed, Status::Passed]).status,
            Some(Status::Passed)
        );
        assert_eq!(run(&[Status::Passed, Status::Failed]).status, Some(Status::Failed));
        assert_eq!(
            run(&[Status::Failed, Status::Skipped, Status::Skipped]).status,
            Some(Status::Failed)
        );
        assert_eq!(
            run(&[Status::Skipped, Status::Broken, Status::Skipped]).status,
            Some(Status::Broken)
        );
    }

    #[test]
    fn test_details_follow_most_recent_carrier() {
        let mut result = open(ResultMeta::default());
        append_step(
            &mut result,
            FinishedStep::new("a", Status::Failed).with_details(StatusDetails::with_message("first")),
            0,
        );
        append_step(&mut result, FinishedStep::new("b", Status::Passed), 0);
        assert_eq!(result.status_details.as_ref().unwrap().message, "first");

        append_step(
            &mut result,
            FinishedStep::new("c", Status::Skipped).with_details(StatusDetails::with_message("second")),
            0,
        );
        assert_eq!(result.status_details.as_ref().unwrap().message, "second");
        assert_eq!(result.status, Some(Status::Passed));
    }

    #[test]
    fn test_step_is_stamped_and_ordered() {
        let mut result = open(ResultMeta::default());
        let step = append_step(&mut result, FinishedStep::new("first", Status::Passed), 7);
        append_step(&mut result, FinishedStep::new("second", Status::Passed), step.stop);

        assert_eq!(step.start, 7);
        assert!(step.stop >= 7);
        assert_eq!(step.stage, Stage::Finished);
        let names: Vec<_> = result.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_close_keeps_explicit_stop() {
        let mut result = open(ResultMeta::default());
        result.stop = 99;
        close(&mut result);
        assert_eq!(result.stage, Some(Stage::Finished));
        assert_eq!(result.stop, 99);

        let mut other = open(ResultMeta::default());
        close(&mut other);
        assert!(other.stop >= other.start);
    }
}
