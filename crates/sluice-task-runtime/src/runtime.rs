use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sluice_config::Params;

use crate::error::SandboxError;
use crate::limits::Limits;

/// Everything a runtime needs to execute one plugin invocation.
#[derive(Debug, Clone)]
pub struct ScriptRequest {
  /// Plugin name, used for chunk names and diagnostics.
  pub name: String,
  pub script: Arc<str>,
  /// Bound to the `input` global.
  pub input: Value,
  /// Bound to the `params` global.
  pub params: Params,
  pub limits: Limits,
}

/// A sandboxed script backend.
///
/// Implementations must be reentrant: concurrent `execute` calls share no
/// mutable state, and a script can observe nothing but `input` and `params`.
#[async_trait]
pub trait ScriptRuntime: Send + Sync + 'static {
  /// Parse and compile a script without running it.
  fn validate(&self, name: &str, script: &str) -> Result<(), SandboxError>;

  /// Run a script and return the value it produces.
  ///
  /// Must return [`SandboxError::ExecutionTimeout`] no later than
  /// `limits.timeout` plus a small grace period, even if the script never
  /// yields.
  async fn execute(&self, request: ScriptRequest) -> Result<Value, SandboxError>;
}

#[async_trait]
impl<T: ScriptRuntime + ?Sized> ScriptRuntime for Arc<T> {
  fn validate(&self, name: &str, script: &str) -> Result<(), SandboxError> {
    (**self).validate(name, script)
  }

  async fn execute(&self, request: ScriptRequest) -> Result<Value, SandboxError> {
    (**self).execute(request).await
  }
}
