use sluice_task_runtime::SandboxError;
use thiserror::Error;

/// Errors that can occur when working with the plugin registry.
#[derive(Debug, Error)]
pub enum RegistryError {
  /// Plugin not found in the registry.
  #[error("plugin not found: {name}")]
  NotFound { name: String },

  /// A plugin with this name is already registered.
  #[error("plugin already exists: {name}")]
  DuplicatePlugin { name: String },

  /// The script failed to compile.
  #[error("invalid script for plugin '{name}': {message}")]
  InvalidScript { name: String, message: String },

  /// Plugin names must be non-empty.
  #[error("invalid plugin name: {name:?}")]
  InvalidName { name: String },

  /// IO error when reading plugin files.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl RegistryError {
  pub(crate) fn from_sandbox(name: &str, error: SandboxError) -> Self {
    let message = match error {
      SandboxError::InvalidScript { message, .. } => message,
      other => other.to_string(),
    };
    Self::InvalidScript {
      name: name.to_string(),
      message,
    }
  }
}
