use sluice_plugin_registry::RegistryError;
use sluice_workflow::WorkflowError;
use thiserror::Error;

/// Errors that can occur while compiling a workflow.
#[derive(Debug, Error)]
pub enum CompileError {
  /// The workflow declares no steps.
  #[error("workflow '{workflow}' has no steps")]
  EmptyWorkflow { workflow: String },

  /// A step has an empty name.
  #[error("step #{position} has an empty name")]
  EmptyStepName { position: usize },

  /// Two steps share a name.
  #[error("duplicate step name: {step}")]
  DuplicateStepName { step: String },

  /// A step references a plugin that is not registered.
  #[error("step '{step}' references unknown plugin '{plugin}'")]
  UnknownPlugin { step: String, plugin: String },

  /// A step has no explicit input and no preceding step.
  #[error("step '{step}' has no input and no preceding step")]
  MissingPredecessor { step: String },

  /// A step's explicit input names an empty job id.
  #[error("step '{step}' has an empty job reference")]
  InvalidJobReference { step: String },

  /// Registry error while looking up a plugin.
  #[error("registry error: {0}")]
  Registry(#[source] RegistryError),

  /// The assembled graph is structurally invalid.
  #[error("invalid graph: {0}")]
  Graph(#[from] WorkflowError),
}
