use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::step::StepDef;

/// A workflow document as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  pub name: String,

  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub description: String,

  /// Run independent chains concurrently.
  #[serde(default)]
  pub parallel: bool,

  /// Steps in declaration order.
  #[serde(default)]
  pub steps: Vec<StepDef>,
}

impl WorkflowDef {
  /// Decode a workflow document. Accepts YAML and JSON.
  pub fn from_document(text: &str) -> Result<Self, ConfigError> {
    Ok(serde_yaml::from_str(text)?)
  }

  /// Convenience constructor for a sequential workflow.
  pub fn sequential(name: impl Into<String>, steps: Vec<StepDef>) -> Self {
    Self {
      name: name.into(),
      description: String::new(),
      parallel: false,
      steps,
    }
  }
}
