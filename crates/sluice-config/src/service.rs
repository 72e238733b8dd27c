use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_SCRIPT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_INSTRUCTION_BUDGET: u64 = 100_000_000;
const DEFAULT_MEMORY_LIMIT_BYTES: usize = 64 * 1024 * 1024;
const DEFAULT_MAX_PARALLEL: usize = 10;
const MAX_PARALLEL_LIMIT: usize = 4096;

/// Service-wide execution limits.
///
/// ```yaml
/// script_timeout_ms: 5000
/// instruction_budget: 100000000
/// memory_limit_bytes: 67108864
/// max_parallel: 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
  /// Wall-clock deadline for a single script execution.
  pub script_timeout_ms: u64,

  /// VM instructions a single execution may retire. `0` disables the budget.
  pub instruction_budget: u64,

  /// Heap ceiling for a single execution. `0` disables the limit.
  pub memory_limit_bytes: usize,

  /// Upper bound on concurrently running chains in parallel workflows.
  /// Capped at 4096.
  pub max_parallel: usize,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      script_timeout_ms: DEFAULT_SCRIPT_TIMEOUT_MS,
      instruction_budget: DEFAULT_INSTRUCTION_BUDGET,
      memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
      max_parallel: DEFAULT_MAX_PARALLEL,
    }
  }
}

impl ServiceConfig {
  /// Read a YAML config file. Missing keys take their defaults.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.display().to_string(),
      source,
    })?;
    Self::from_yaml(&text)
  }

  pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_yaml::from_str(text)?;
    Ok(config.normalized())
  }

  /// Replace out-of-range values with defaults.
  pub fn normalized(mut self) -> Self {
    if self.max_parallel < 1 {
      self.max_parallel = DEFAULT_MAX_PARALLEL;
    }
    self.max_parallel = self.max_parallel.min(MAX_PARALLEL_LIMIT);
    if self.script_timeout_ms == 0 {
      self.script_timeout_ms = DEFAULT_SCRIPT_TIMEOUT_MS;
    }
    self
  }

  pub fn script_timeout(&self) -> Duration {
    Duration::from_millis(self.script_timeout_ms)
  }

  pub fn instruction_budget(&self) -> Option<u64> {
    (self.instruction_budget > 0).then_some(self.instruction_budget)
  }

  pub fn memory_limit(&self) -> Option<usize> {
    (self.memory_limit_bytes > 0).then_some(self.memory_limit_bytes)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults() {
    let config = ServiceConfig::default();
    assert_eq!(config.script_timeout(), Duration::from_secs(5));
    assert_eq!(config.max_parallel, 10);
    assert_eq!(config.instruction_budget(), Some(100_000_000));
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = ServiceConfig::from_yaml("script_timeout_ms: 250\n").unwrap();
    assert_eq!(config.script_timeout_ms, 250);
    assert_eq!(config.max_parallel, 10);
  }

  #[test]
  fn test_zero_parallelism_is_clamped() {
    let config = ServiceConfig::from_yaml("max_parallel: 0\ninstruction_budget: 0\n").unwrap();
    assert_eq!(config.max_parallel, 10);
    assert_eq!(config.instruction_budget(), None);
  }

  #[test]
  fn test_huge_parallelism_is_capped() {
    let config = ServiceConfig::from_yaml("max_parallel: 18446744073709551615\n").unwrap();
    assert_eq!(config.max_parallel, MAX_PARALLEL_LIMIT);

    let config = ServiceConfig {
      max_parallel: usize::MAX,
      ..ServiceConfig::default()
    }
    .normalized();
    assert_eq!(config.max_parallel, MAX_PARALLEL_LIMIT);
  }

  #[test]
  fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "max_parallel: 3").unwrap();

    let config = ServiceConfig::load(file.path()).unwrap();
    assert_eq!(config.max_parallel, 3);
  }

  #[test]
  fn test_load_missing_file() {
    let result = ServiceConfig::load(Path::new("/definitely/not/here.yaml"));
    assert!(matches!(result, Err(ConfigError::Io { .. })));
  }
}
