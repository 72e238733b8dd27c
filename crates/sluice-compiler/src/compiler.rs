use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use sluice_config::{StepDef, WorkflowDef};
use sluice_plugin_registry::{PluginRegistry, RegistryError};
use sluice_workflow::{ResolvedPlugin, StepGraph, StepInput, StepNode};

use crate::error::CompileError;

/// Compiler transforms a WorkflowDef into an executable StepGraph.
#[async_trait]
pub trait Compiler: Send + Sync {
  /// Compile a workflow definition.
  ///
  /// This process:
  /// 1. Checks step names are present and unique
  /// 2. Resolves plugin references against the registry
  /// 3. Resolves every step input to a job or a predecessor
  /// 4. Groups steps into chains
  ///
  /// Nothing is executed and no job data is read.
  async fn compile(&self, def: WorkflowDef) -> Result<StepGraph, CompileError>;
}

/// Standard compiler implementation backed by a plugin registry.
pub struct StandardCompiler<P: PluginRegistry> {
  registry: P,
}

impl<P: PluginRegistry> StandardCompiler<P> {
  /// Create a new compiler with the given plugin registry.
  pub fn new(registry: P) -> Self {
    Self { registry }
  }

  async fn resolve_plugin(&self, step: &StepDef) -> Result<ResolvedPlugin, CompileError> {
    match self.registry.lookup(&step.plugin).await {
      Ok(plugin) => Ok(ResolvedPlugin {
        name: plugin.name,
        script: plugin.script,
      }),
      Err(RegistryError::NotFound { .. }) => Err(CompileError::UnknownPlugin {
        step: step.name.clone(),
        plugin: step.plugin.clone(),
      }),
      Err(e) => Err(CompileError::Registry(e)),
    }
  }

  /// Explicit input makes a root; otherwise the previous step feeds this one.
  fn resolve_input(step: &StepDef, position: usize) -> Result<StepInput, CompileError> {
    match &step.input {
      Some(input) if input.job_id.trim().is_empty() => Err(CompileError::InvalidJobReference {
        step: step.name.clone(),
      }),
      Some(input) => Ok(StepInput::Job(input.job_id.clone())),
      None if position == 0 => Err(CompileError::MissingPredecessor {
        step: step.name.clone(),
      }),
      None => Ok(StepInput::Predecessor(position - 1)),
    }
  }
}

#[async_trait]
impl<P: PluginRegistry> Compiler for StandardCompiler<P> {
  async fn compile(&self, def: WorkflowDef) -> Result<StepGraph, CompileError> {
    if def.steps.is_empty() {
      return Err(CompileError::EmptyWorkflow { workflow: def.name });
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut nodes = Vec::with_capacity(def.steps.len());

    for (position, step) in def.steps.iter().enumerate() {
      if step.name.trim().is_empty() {
        return Err(CompileError::EmptyStepName { position });
      }
      if !seen.insert(step.name.as_str()) {
        return Err(CompileError::DuplicateStepName {
          step: step.name.clone(),
        });
      }

      let plugin = self.resolve_plugin(step).await?;
      let input = Self::resolve_input(step, position)?;

      nodes.push(StepNode {
        index: position,
        name: step.name.clone(),
        plugin,
        params: step.params.clone(),
        input,
      });
    }

    let graph = StepGraph::new(def.name, def.description, def.parallel, nodes)?;
    debug!(
      workflow = %graph.name,
      steps = graph.len(),
      chains = graph.chains().len(),
      "workflow_compiled"
    );

    Ok(graph)
  }
}
