use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sluice_task_runtime::{SandboxError, ScriptRequest, ScriptRuntime};
use tracing::{debug, warn};

use crate::sandbox;

/// Slack given to the in-interpreter deadline before the watchdog fires.
const DEFAULT_GRACE: Duration = Duration::from_millis(250);

/// Lua 5.4 script runtime.
///
/// Scripts run on tokio's blocking pool. The caller waits at most
/// `timeout + grace`; past that the watchdog raises the interrupt flag and
/// returns [`SandboxError::ExecutionTimeout`] without waiting for the worker,
/// which stops at its next instruction hook. A worker stuck inside one C
/// builtin cannot be stopped and holds a blocking-pool thread until the
/// builtin returns.
#[derive(Debug, Clone)]
pub struct LuaRuntime {
  grace: Duration,
}

impl Default for LuaRuntime {
  fn default() -> Self {
    Self::new()
  }
}

impl LuaRuntime {
  pub fn new() -> Self {
    Self {
      grace: DEFAULT_GRACE,
    }
  }

  pub fn with_grace(mut self, grace: Duration) -> Self {
    self.grace = grace;
    self
  }
}

#[async_trait]
impl ScriptRuntime for LuaRuntime {
  fn validate(&self, name: &str, script: &str) -> Result<(), SandboxError> {
    sandbox::compile(name, script)
  }

  async fn execute(&self, request: ScriptRequest) -> Result<Value, SandboxError> {
    let name = request.name.clone();
    let timeout = request.limits.timeout;
    let interrupt = Arc::new(AtomicBool::new(false));

    let worker_flag = interrupt.clone();
    let handle = tokio::task::spawn_blocking(move || sandbox::run(request, worker_flag));

    match tokio::time::timeout(timeout + self.grace, handle).await {
      Ok(Ok(result)) => {
        if let Err(e) = &result {
          debug!(plugin = %name, error = %e, "script_failed");
        }
        result
      }
      Ok(Err(join_error)) => Err(SandboxError::Internal(format!(
        "script worker failed: {join_error}"
      ))),
      Err(_) => {
        interrupt.store(true, Ordering::Relaxed);
        warn!(plugin = %name, timeout_ms = timeout.as_millis() as u64, "script_watchdog_fired");
        Err(SandboxError::timeout(format!(
          "deadline of {timeout:?} exceeded"
        )))
      }
    }
  }
}
