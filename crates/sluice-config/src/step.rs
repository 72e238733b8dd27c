use serde::{Deserialize, Serialize};

/// Plugin parameters, exposed to the script as the `params` table.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// A single step of a workflow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
  /// Step name, unique within the workflow. Results are keyed by it.
  pub name: String,

  /// Name of a registered plugin.
  pub plugin: String,

  #[serde(default, skip_serializing_if = "Params::is_empty")]
  pub params: Params,

  /// Explicit input. When absent the step consumes the output of the
  /// step declared immediately before it.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub input: Option<InputRef>,
}

impl StepDef {
  /// Shorthand for a step without params or explicit input.
  pub fn new(name: impl Into<String>, plugin: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      plugin: plugin.into(),
      params: Params::new(),
      input: None,
    }
  }

  pub fn with_params(mut self, params: Params) -> Self {
    self.params = params;
    self
  }

  /// Root this step at an uploaded job.
  pub fn with_job(mut self, job_id: impl Into<String>) -> Self {
    self.input = Some(InputRef {
      job_id: job_id.into(),
    });
    self
  }
}

/// Reference to an uploaded job whose data seeds a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRef {
  pub job_id: String,
}
