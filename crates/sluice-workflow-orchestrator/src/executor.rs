//! Workflow executor implementation.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use sluice_config::{Params, ServiceConfig};
use sluice_task_runtime::{Limits, ScriptRequest, ScriptRuntime};
use sluice_workflow::{ResolvedPlugin, StepGraph, StepInput, StepNode};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::StepError;
use crate::events::{NoopNotifier, RunEvent, RunNotifier};
use crate::run::{InitialInputs, StepFailure, WorkflowRun};

/// Configuration for the workflow executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
  /// Chains allowed to run at once in parallel mode.
  pub max_parallel: usize,
  /// Limits applied to every step.
  pub limits: Limits,
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    Self::from(&ServiceConfig::default())
  }
}

impl From<&ServiceConfig> for ExecutorConfig {
  fn from(config: &ServiceConfig) -> Self {
    Self {
      max_parallel: config.max_parallel.max(1),
      limits: Limits::from(config),
    }
  }
}

/// The workflow executor.
///
/// Schedules the chains of a [`StepGraph`] and drives each step through a
/// [`ScriptRuntime`].
pub struct WorkflowExecutor<R: ScriptRuntime, N: RunNotifier = NoopNotifier> {
  runtime: Arc<R>,
  notifier: Arc<N>,
  config: ExecutorConfig,
}

impl<R: ScriptRuntime> WorkflowExecutor<R> {
  pub fn new(runtime: Arc<R>, config: ExecutorConfig) -> Self {
    Self {
      runtime,
      notifier: Arc::new(NoopNotifier),
      config,
    }
  }
}

impl<R: ScriptRuntime, N: RunNotifier> WorkflowExecutor<R, N> {
  /// Replace the notifier receiving run events.
  pub fn with_notifier<M: RunNotifier>(self, notifier: M) -> WorkflowExecutor<R, M> {
    WorkflowExecutor {
      runtime: self.runtime,
      notifier: Arc::new(notifier),
      config: self.config,
    }
  }

  /// Run one plugin outside any workflow.
  pub async fn execute_step(
    &self,
    plugin: &ResolvedPlugin,
    input: Value,
    params: Params,
  ) -> Result<Value, StepError> {
    let request = ScriptRequest {
      name: plugin.name.clone(),
      script: plugin.script.clone(),
      input,
      params,
      limits: self.config.limits,
    };
    Ok(self.runtime.execute(request).await?)
  }

  /// Run a workflow to completion.
  pub async fn run(&self, graph: &StepGraph, inputs: &InitialInputs) -> WorkflowRun {
    self.run_with_cancel(graph, inputs, CancellationToken::new()).await
  }

  /// Run a workflow, stopping at the next step boundary once `cancel` fires.
  #[instrument(
    name = "workflow_run",
    skip(self, graph, inputs, cancel),
    fields(
      workflow = %graph.name,
      parallel = graph.parallel,
    )
  )]
  pub async fn run_with_cancel(
    &self,
    graph: &StepGraph,
    inputs: &InitialInputs,
    cancel: CancellationToken,
  ) -> WorkflowRun {
    let mut run = WorkflowRun::new(graph.name.clone());
    run.start();

    info!(run_id = %run.id, chains = graph.chains().len(), "run_started");
    self.notifier.notify(RunEvent::RunStarted {
      run_id: run.id.clone(),
      workflow: graph.name.clone(),
    });

    let context = ChainContext {
      run_id: run.id.clone().into(),
      runtime: self.runtime.clone(),
      notifier: self.notifier.clone(),
      limits: self.config.limits,
      // Failures cancel the child only; the caller's token stays untouched.
      cancel: cancel.child_token(),
    };

    let mut failure = match self.resolve_roots(graph, inputs) {
      Ok(chains) if graph.parallel => self.run_parallel(&context, chains, &mut run).await,
      Ok(chains) => self.run_sequential(&context, chains, &mut run).await,
      Err(failure) => {
        for node in graph.nodes() {
          context.skip(&node.name);
        }
        Some(failure)
      }
    };

    if failure.is_none() && context.cancel.is_cancelled() {
      failure = cancelled_before(graph, &run);
    }
    run.finish(failure);

    match &run.error {
      None => {
        info!(run_id = %run.id, steps = run.results.len(), "run_completed");
        self.notifier.notify(RunEvent::RunCompleted {
          run_id: run.id.clone(),
        });
      }
      Some(failure) => {
        error!(
          run_id = %run.id,
          step = %failure.step,
          error = %failure.error,
          "run_failed"
        );
        self.notifier.notify(RunEvent::RunFailed {
          run_id: run.id.clone(),
          step: failure.step.clone(),
          error: failure.error.to_string(),
        });
      }
    }

    run
  }

  /// Pair every chain with its root input. Fails before anything runs if a
  /// root's job data is missing.
  fn resolve_roots(
    &self,
    graph: &StepGraph,
    inputs: &InitialInputs,
  ) -> Result<Vec<PendingChain>, StepFailure> {
    graph
      .chains()
      .iter()
      .map(|chain| {
        let steps: Vec<StepNode> = chain
          .steps
          .iter()
          .filter_map(|&i| graph.node(i).cloned())
          .collect();
        let root = &steps[0];
        let input = match &root.input {
          StepInput::Job(job_id) => inputs.get(job_id).cloned().ok_or_else(|| StepFailure {
            step: root.name.clone(),
            error: StepError::MissingInput {
              job_id: job_id.clone(),
            },
          })?,
          StepInput::Predecessor(_) => Value::Null,
        };
        Ok(PendingChain { steps, input })
      })
      .collect()
  }

  /// Chains in root declaration order; the first failure ends the run.
  async fn run_sequential(
    &self,
    context: &ChainContext<R, N>,
    chains: Vec<PendingChain>,
    run: &mut WorkflowRun,
  ) -> Option<StepFailure> {
    let mut chains = chains.into_iter();

    while let Some(chain) = chains.next() {
      let outcome = context.run_chain(chain).await;
      run.record(outcome.outputs);

      if let Some(failure) = outcome.failure {
        for rest in chains.by_ref() {
          rest.steps.iter().for_each(|s| context.skip(&s.name));
        }
        return Some(failure);
      }
    }

    None
  }

  /// Chains on a pool of `max_parallel` workers. The first failure (by
  /// completion time) cancels chains that have not started and stops running
  /// chains at their next step boundary.
  async fn run_parallel(
    &self,
    context: &ChainContext<R, N>,
    chains: Vec<PendingChain>,
    run: &mut WorkflowRun,
  ) -> Option<StepFailure> {
    let permits = Arc::new(Semaphore::new(
      self.config.max_parallel.clamp(1, Semaphore::MAX_PERMITS),
    ));
    let mut workers = JoinSet::new();

    for chain in chains {
      let context = context.clone();
      let permits = permits.clone();
      let root = chain.steps[0].name.clone();

      workers.spawn(async move {
        let permit = tokio::select! {
          permit = permits.acquire_owned() => permit.ok(),
          _ = context.cancel.cancelled() => None,
        };
        let Some(_permit) = permit else {
          chain.steps.iter().for_each(|s| context.skip(&s.name));
          return ChainOutcome::cancelled();
        };

        match AssertUnwindSafe(context.run_chain(chain)).catch_unwind().await {
          Ok(outcome) => outcome,
          Err(_) => ChainOutcome {
            outputs: Vec::new(),
            failure: Some(StepFailure {
              step: root,
              error: StepError::Internal {
                message: "chain worker panicked".to_string(),
              },
            }),
          },
        }
      });
    }

    let mut first_failure: Option<StepFailure> = None;

    while let Some(joined) = workers.join_next().await {
      let outcome = match joined {
        Ok(outcome) => outcome,
        Err(e) => ChainOutcome {
          outputs: Vec::new(),
          failure: Some(StepFailure {
            step: run.name.clone(),
            error: StepError::Internal {
              message: format!("chain worker failed: {e}"),
            },
          }),
        },
      };

      run.record(outcome.outputs);

      if let Some(failure) = outcome.failure
        && first_failure.is_none()
      {
        warn!(run_id = %run.id, step = %failure.step, "cancelling_remaining_chains");
        context.cancel.cancel();
        first_failure = Some(failure);
      }
    }

    first_failure
  }
}

/// Failure for a run stopped by its caller: the first declared step that
/// produced no output.
fn cancelled_before(graph: &StepGraph, run: &WorkflowRun) -> Option<StepFailure> {
  graph
    .nodes()
    .iter()
    .find(|node| !run.results.contains_key(&node.name))
    .map(|node| StepFailure {
      step: node.name.clone(),
      error: StepError::Cancelled,
    })
}

/// A chain with its root input resolved.
struct PendingChain {
  steps: Vec<StepNode>,
  input: Value,
}

/// What a chain produced before it stopped.
struct ChainOutcome {
  outputs: Vec<(String, Value)>,
  failure: Option<StepFailure>,
}

impl ChainOutcome {
  fn cancelled() -> Self {
    Self {
      outputs: Vec::new(),
      failure: None,
    }
  }
}

/// Everything a chain worker needs, owned so it can move into a task.
struct ChainContext<R: ScriptRuntime, N: RunNotifier> {
  run_id: Arc<str>,
  runtime: Arc<R>,
  notifier: Arc<N>,
  limits: Limits,
  cancel: CancellationToken,
}

impl<R: ScriptRuntime, N: RunNotifier> Clone for ChainContext<R, N> {
  fn clone(&self) -> Self {
    Self {
      run_id: self.run_id.clone(),
      runtime: self.runtime.clone(),
      notifier: self.notifier.clone(),
      limits: self.limits,
      cancel: self.cancel.clone(),
    }
  }
}

impl<R: ScriptRuntime, N: RunNotifier> ChainContext<R, N> {
  /// Run steps in order, feeding each output to the next step.
  ///
  /// Cancellation is checked before every step; a step in flight is never
  /// interrupted by it. A cancelled chain reports no failure of its own.
  async fn run_chain(&self, chain: PendingChain) -> ChainOutcome {
    let PendingChain { steps, mut input } = chain;
    let mut outputs = Vec::with_capacity(steps.len());

    for (position, node) in steps.iter().enumerate() {
      if self.cancel.is_cancelled() {
        steps[position..].iter().for_each(|s| self.skip(&s.name));
        return ChainOutcome {
          outputs,
          failure: None,
        };
      }

      self.notifier.notify(RunEvent::StepStarted {
        run_id: self.run_id.to_string(),
        step: node.name.clone(),
      });

      let request = ScriptRequest {
        name: node.plugin.name.clone(),
        script: node.plugin.script.clone(),
        input,
        params: node.params.clone(),
        limits: self.limits,
      };

      match self.runtime.execute(request).await {
        Ok(output) => {
          info!(
            run_id = %self.run_id,
            step = %node.name,
            plugin = %node.plugin.name,
            "step_completed"
          );
          self.notifier.notify(RunEvent::StepCompleted {
            run_id: self.run_id.to_string(),
            step: node.name.clone(),
            output: output.clone(),
          });
          outputs.push((node.name.clone(), output.clone()));
          input = output;
        }
        Err(e) => {
          let error = StepError::from(e);
          error!(
            run_id = %self.run_id,
            step = %node.name,
            plugin = %node.plugin.name,
            error = %error,
            "step_failed"
          );
          self.notifier.notify(RunEvent::StepFailed {
            run_id: self.run_id.to_string(),
            step: node.name.clone(),
            error: error.to_string(),
          });
          steps[position + 1..].iter().for_each(|s| self.skip(&s.name));
          return ChainOutcome {
            outputs,
            failure: Some(StepFailure {
              step: node.name.clone(),
              error,
            }),
          };
        }
      }
    }

    ChainOutcome {
      outputs,
      failure: None,
    }
  }

  fn skip(&self, step: &str) {
    self.notifier.notify(RunEvent::StepSkipped {
      run_id: self.run_id.to_string(),
      step: step.to_string(),
    });
  }
}
