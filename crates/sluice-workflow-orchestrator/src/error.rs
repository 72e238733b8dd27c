//! Error types for step execution.

use serde::Serialize;
use sluice_task_runtime::SandboxError;
use thiserror::Error;

/// Why a step did not produce an output.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepError {
  /// The script raised an error.
  #[error("script error: {message}")]
  Script { message: String },

  /// The script exceeded a resource limit.
  #[error("execution timeout: {reason}")]
  Timeout { reason: String },

  /// A root step's job data was not supplied.
  #[error("no input data for job '{job_id}'")]
  MissingInput { job_id: String },

  /// The run was cancelled before the step started.
  #[error("workflow execution cancelled")]
  Cancelled,

  /// The host failed to run the step.
  #[error("internal error: {message}")]
  Internal { message: String },
}

impl From<SandboxError> for StepError {
  fn from(error: SandboxError) -> Self {
    match error {
      SandboxError::ScriptError { message } => Self::Script { message },
      SandboxError::ExecutionTimeout { reason } => Self::Timeout { reason },
      SandboxError::InvalidScript { message, .. } => Self::Script { message },
      SandboxError::Internal(message) => Self::Internal { message },
    }
  }
}
