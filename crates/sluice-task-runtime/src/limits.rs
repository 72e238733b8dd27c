use std::time::Duration;

use sluice_config::ServiceConfig;

/// Resource limits applied to one script execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
  /// Wall-clock deadline measured from the start of execution.
  pub timeout: Duration,
  /// Maximum VM instructions, if bounded.
  pub instruction_budget: Option<u64>,
  /// Maximum heap size in bytes, if bounded.
  pub memory_limit: Option<usize>,
}

impl Default for Limits {
  fn default() -> Self {
    Self::from(&ServiceConfig::default())
  }
}

impl From<&ServiceConfig> for Limits {
  fn from(config: &ServiceConfig) -> Self {
    Self {
      timeout: config.script_timeout(),
      instruction_budget: config.instruction_budget(),
      memory_limit: config.memory_limit(),
    }
  }
}

impl Limits {
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn with_instruction_budget(mut self, budget: Option<u64>) -> Self {
    self.instruction_budget = budget;
    self
  }
}
