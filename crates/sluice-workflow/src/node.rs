use std::sync::Arc;

use serde::Serialize;
use sluice_config::Params;

/// A plugin pinned at compile time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPlugin {
  pub name: String,
  #[serde(skip)]
  pub script: Arc<str>,
}

/// Where a step reads its input from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepInput {
  /// Data of an uploaded job. Steps with this input are chain roots.
  Job(String),
  /// Output of the step at this index.
  Predecessor(usize),
}

/// A compiled workflow step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepNode {
  /// Position in declaration order.
  pub index: usize,
  pub name: String,
  pub plugin: ResolvedPlugin,
  pub params: Params,
  pub input: StepInput,
}

impl StepNode {
  pub fn is_root(&self) -> bool {
    matches!(self.input, StepInput::Job(_))
  }
}
