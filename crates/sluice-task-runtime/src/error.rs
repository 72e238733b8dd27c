use thiserror::Error;

/// Errors produced by a script runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
  /// The script does not parse or compile.
  #[error("invalid script '{name}': {message}")]
  InvalidScript { name: String, message: String },

  /// The script raised an error, or produced a value with no JSON form.
  #[error("{message}")]
  ScriptError { message: String },

  /// A resource limit was exceeded (deadline, instruction budget or memory).
  #[error("execution timeout: {reason}")]
  ExecutionTimeout { reason: String },

  /// The host failed to run the script at all.
  #[error("runtime failure: {0}")]
  Internal(String),
}

impl SandboxError {
  pub fn script(message: impl Into<String>) -> Self {
    Self::ScriptError {
      message: message.into(),
    }
  }

  pub fn timeout(reason: impl Into<String>) -> Self {
    Self::ExecutionTimeout {
      reason: reason.into(),
    }
  }

  pub fn is_timeout(&self) -> bool {
    matches!(self, Self::ExecutionTimeout { .. })
  }
}
