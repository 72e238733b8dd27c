use std::collections::BTreeMap;

use serde_json::{Value, json};
use sluice_compiler::CompileError;
use sluice_job_store::Error as JobStoreError;
use sluice_plugin_registry::RegistryError;
use sluice_workflow_orchestrator::{StepError, StepFailure};
use thiserror::Error;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
  /// Uploaded data or a request body is malformed.
  #[error("invalid payload: {0}")]
  InvalidPayload(String),

  /// A workflow document could not be decoded.
  #[error("invalid workflow document: {0}")]
  InvalidDocument(String),

  #[error("job not found: {job_id}")]
  JobNotFound { job_id: String },

  #[error("plugin not found: {name}")]
  PluginNotFound { name: String },

  #[error("plugin already exists: {name}")]
  DuplicatePlugin { name: String },

  #[error("invalid script for plugin '{name}': {message}")]
  InvalidScript { name: String, message: String },

  /// The workflow failed to compile. Nothing was executed.
  #[error("compile error: {0}")]
  Compile(#[source] CompileError),

  /// A step failed while running. Outputs produced before the failure are
  /// kept in `results`.
  #[error("step '{}' failed: {}", .failure.step, .failure.error)]
  Execution {
    failure: StepFailure,
    results: BTreeMap<String, Value>,
  },

  #[error("internal error: {0}")]
  Internal(String),
}

impl EngineError {
  /// HTTP-style status for this error.
  pub fn status_code(&self) -> u16 {
    match self {
      EngineError::InvalidPayload(_)
      | EngineError::InvalidDocument(_)
      | EngineError::InvalidScript { .. }
      | EngineError::Compile(_) => 400,
      EngineError::JobNotFound { .. } | EngineError::PluginNotFound { .. } => 404,
      EngineError::DuplicatePlugin { .. } => 409,
      EngineError::Execution { failure, .. } => match failure.error {
        StepError::Internal { .. } => 500,
        _ => 422,
      },
      EngineError::Internal(_) => 500,
    }
  }

  /// Response body for this error.
  pub fn body(&self) -> Value {
    match self {
      EngineError::Execution { failure, results } => json!({
        "error": self.to_string(),
        "step": failure.step,
        "cause": failure.error,
        "results": results,
      }),
      _ => json!({ "error": self.to_string() }),
    }
  }
}

impl From<JobStoreError> for EngineError {
  fn from(error: JobStoreError) -> Self {
    match error {
      JobStoreError::NotFound(job_id) => EngineError::JobNotFound { job_id },
    }
  }
}

impl From<RegistryError> for EngineError {
  fn from(error: RegistryError) -> Self {
    match error {
      RegistryError::NotFound { name } => EngineError::PluginNotFound { name },
      RegistryError::DuplicatePlugin { name } => EngineError::DuplicatePlugin { name },
      RegistryError::InvalidScript { name, message } => {
        EngineError::InvalidScript { name, message }
      }
      RegistryError::InvalidName { name } => {
        EngineError::InvalidPayload(format!("invalid plugin name {name:?}"))
      }
      RegistryError::Io(e) => EngineError::Internal(e.to_string()),
    }
  }
}

impl From<CompileError> for EngineError {
  fn from(error: CompileError) -> Self {
    EngineError::Compile(error)
  }
}
