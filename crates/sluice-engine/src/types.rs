use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sluice_config::Params;

/// One plugin invocation in an ad-hoc processing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginCall {
  pub name: String,
  #[serde(default)]
  pub params: Params,
}

impl PluginCall {
  pub fn new(name: impl Into<String>, params: Params) -> Self {
    Self {
      name: name.into(),
      params,
    }
  }
}

/// Result of processing a job through a plugin list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutput {
  pub results: BTreeMap<String, serde_json::Value>,
}

/// Result of a workflow run; `job_id` holds the stored results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowOutput {
  pub job_id: String,
  pub results: BTreeMap<String, serde_json::Value>,
}
