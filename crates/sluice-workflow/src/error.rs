use thiserror::Error;

/// Structural errors found while assembling a step graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
  /// A step points at a predecessor that is not declared before it.
  #[error("step '{step}' references predecessor #{predecessor} which is not declared before it")]
  InvalidPredecessor { step: String, predecessor: usize },

  /// Two steps consume the same predecessor.
  #[error("steps '{first}' and '{second}' both consume the output of '{predecessor}'")]
  SharedPredecessor {
    predecessor: String,
    first: String,
    second: String,
  },

  /// Node indices must match their position.
  #[error("step '{step}' has index {index} but is stored at position {position}")]
  IndexMismatch {
    step: String,
    index: usize,
    position: usize,
  },
}
