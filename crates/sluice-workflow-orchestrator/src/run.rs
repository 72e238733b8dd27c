//! Workflow run results.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::error::StepError;

/// Job data for root steps, keyed by job id.
pub type InitialInputs = HashMap<String, serde_json::Value>;

/// Lifecycle of a run: `Pending → Running → Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  Pending,
  Running,
  Completed,
  Failed,
}

/// The step that stopped a run and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
  pub step: String,
  pub error: StepError,
}

/// Outcome of one workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowRun {
  pub id: String,
  pub name: String,
  pub status: RunStatus,
  /// Step outputs keyed by step name.
  pub results: BTreeMap<String, serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<StepFailure>,
}

impl WorkflowRun {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      name: name.into(),
      status: RunStatus::Pending,
      results: BTreeMap::new(),
      error: None,
    }
  }

  pub(crate) fn start(&mut self) {
    debug_assert_eq!(self.status, RunStatus::Pending);
    self.status = RunStatus::Running;
  }

  pub(crate) fn record(&mut self, outputs: Vec<(String, serde_json::Value)>) {
    debug_assert_eq!(self.status, RunStatus::Running);
    self.results.extend(outputs);
  }

  /// Move to a terminal state. A failure wins over completion.
  pub(crate) fn finish(&mut self, failure: Option<StepFailure>) {
    debug_assert_eq!(self.status, RunStatus::Running);
    self.status = match failure {
      Some(_) => RunStatus::Failed,
      None => RunStatus::Completed,
    };
    self.error = failure;
  }

  pub fn is_success(&self) -> bool {
    self.status == RunStatus::Completed
  }
}
