use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use sluice_compiler::{CompileError, Compiler, StandardCompiler};
use sluice_config::{Params, ServiceConfig, StepDef, WorkflowDef};
use sluice_job_store::{Job, JobStore, MemoryJobStore};
use sluice_plugin_registry::{LoadReport, MemoryPluginRegistry, Plugin, PluginRegistry, load_dir};
use sluice_task_runtime::ScriptRuntime;
use sluice_task_runtime_lua::LuaRuntime;
use sluice_workflow::{ResolvedPlugin, StepGraph};
use sluice_workflow_orchestrator::{
  ExecutorConfig, InitialInputs, NoopNotifier, RunNotifier, StepFailure, WorkflowExecutor,
  WorkflowRun,
};
use tracing::{info, instrument};

use crate::error::EngineError;
use crate::types::{PluginCall, ProcessOutput, WorkflowOutput};

type Registry<R> = Arc<MemoryPluginRegistry<Arc<R>>>;

const UPLOAD_DESCRIPTION: &str = "Uploaded data job";

/// The Sluice service core.
pub struct Engine<R: ScriptRuntime, N: RunNotifier = NoopNotifier> {
  jobs: Arc<dyn JobStore>,
  plugins: Registry<R>,
  compiler: StandardCompiler<Registry<R>>,
  executor: WorkflowExecutor<R, N>,
}

impl Engine<LuaRuntime> {
  /// An engine running Lua plugins with in-memory storage.
  pub fn lua(config: &ServiceConfig) -> Self {
    Self::new(LuaRuntime::new(), config)
  }
}

impl<R: ScriptRuntime> Engine<R> {
  pub fn new(runtime: R, config: &ServiceConfig) -> Self {
    let runtime = Arc::new(runtime);
    let plugins = Arc::new(MemoryPluginRegistry::new(runtime.clone()));

    Self {
      jobs: Arc::new(MemoryJobStore::new()),
      compiler: StandardCompiler::new(plugins.clone()),
      plugins,
      executor: WorkflowExecutor::new(runtime, ExecutorConfig::from(config)),
    }
  }
}

impl<R: ScriptRuntime, N: RunNotifier> Engine<R, N> {
  /// Use a different job store.
  pub fn with_job_store(mut self, jobs: Arc<dyn JobStore>) -> Self {
    self.jobs = jobs;
    self
  }

  /// Forward run events to `notifier`.
  pub fn with_notifier<M: RunNotifier>(self, notifier: M) -> Engine<R, M> {
    Engine {
      jobs: self.jobs,
      plugins: self.plugins,
      compiler: self.compiler,
      executor: self.executor.with_notifier(notifier),
    }
  }

  /// Register every plugin script found in `dir`.
  pub async fn load_plugins(&self, dir: &Path) -> Result<LoadReport, EngineError> {
    Ok(load_dir(&*self.plugins, dir).await?)
  }

  /// Store a dataset. Only arrays and objects are accepted.
  pub async fn upload_data(&self, data: Value) -> Result<Job, EngineError> {
    if !(data.is_array() || data.is_object()) {
      return Err(EngineError::InvalidPayload(
        "data must be a JSON array or object".to_string(),
      ));
    }
    Ok(self.jobs.upload(data, UPLOAD_DESCRIPTION).await?)
  }

  pub async fn get_job(&self, job_id: &str) -> Result<Job, EngineError> {
    Ok(self.jobs.get(job_id).await?)
  }

  pub async fn list_jobs(&self) -> Result<Vec<Job>, EngineError> {
    Ok(self.jobs.list().await?)
  }

  pub async fn register_plugin(
    &self,
    name: &str,
    description: &str,
    script: &str,
  ) -> Result<Plugin, EngineError> {
    Ok(self.plugins.register(name, description, script).await?)
  }

  pub async fn get_plugin(&self, name: &str) -> Result<Plugin, EngineError> {
    Ok(self.plugins.lookup(name).await?)
  }

  pub async fn list_plugins(&self) -> Result<Vec<Plugin>, EngineError> {
    Ok(self.plugins.list().await?)
  }

  /// Run one plugin against caller-supplied data.
  pub async fn execute_plugin(
    &self,
    name: &str,
    input: Value,
    params: Params,
  ) -> Result<Value, EngineError> {
    let plugin = self.plugins.lookup(name).await?;
    let resolved = ResolvedPlugin {
      name: plugin.name,
      script: plugin.script,
    };

    self
      .executor
      .execute_step(&resolved, input, params)
      .await
      .map_err(|error| EngineError::Execution {
        failure: StepFailure {
          step: name.to_string(),
          error,
        },
        results: Default::default(),
      })
  }

  /// Pipe a job's data through `plugins` in order.
  ///
  /// Results are keyed by plugin name; repeated plugins are keyed
  /// `name#2`, `name#3`, ... skipping any name already in use.
  #[instrument(name = "process_data", skip(self, plugins))]
  pub async fn process_data(
    &self,
    job_id: &str,
    plugins: Vec<PluginCall>,
  ) -> Result<ProcessOutput, EngineError> {
    if plugins.is_empty() {
      return Err(EngineError::InvalidPayload(
        "at least one plugin is required".to_string(),
      ));
    }

    let job = self.jobs.get(job_id).await?;
    let def = WorkflowDef::sequential(format!("process {job_id}"), chain_steps(job_id, plugins));

    let graph = self.compiler.compile(def).await.map_err(|e| match e {
      CompileError::UnknownPlugin { plugin, .. } => EngineError::PluginNotFound { name: plugin },
      other => EngineError::Compile(other),
    })?;

    let inputs = InitialInputs::from([(job.id, job.data)]);
    let run = self.executor.run(&graph, &inputs).await;

    Ok(ProcessOutput {
      results: finished(run)?.results,
    })
  }

  /// Decode and run a workflow document.
  pub async fn process_workflow_document(&self, text: &str) -> Result<WorkflowOutput, EngineError> {
    let def =
      WorkflowDef::from_document(text).map_err(|e| EngineError::InvalidDocument(e.to_string()))?;
    self.process_workflow(def).await
  }

  /// Compile and run a workflow, then store its results as a new job.
  #[instrument(name = "process_workflow", skip(self, def), fields(workflow = %def.name))]
  pub async fn process_workflow(&self, def: WorkflowDef) -> Result<WorkflowOutput, EngineError> {
    let graph = self.compiler.compile(def).await?;
    let inputs = self.load_inputs(&graph).await?;

    let run = finished(self.executor.run(&graph, &inputs).await)?;

    let data = Value::Object(run.results.clone().into_iter().collect());
    let job = self.jobs.upload(data, &graph.name).await?;
    info!(workflow = %graph.name, job_id = %job.id, "workflow_results_stored");

    Ok(WorkflowOutput {
      job_id: job.id,
      results: run.results,
    })
  }

  /// Compile a workflow without running it.
  pub async fn compile(&self, def: WorkflowDef) -> Result<StepGraph, EngineError> {
    Ok(self.compiler.compile(def).await?)
  }

  /// Fetch the data of every job a root step reads.
  async fn load_inputs(&self, graph: &StepGraph) -> Result<InitialInputs, EngineError> {
    let mut inputs = HashMap::new();
    for job_id in graph.root_jobs() {
      if !inputs.contains_key(job_id) {
        let job = self.jobs.get(job_id).await?;
        inputs.insert(job.id, job.data);
      }
    }
    Ok(inputs)
  }
}

/// Steps for an ad-hoc chain rooted at `job_id`.
fn chain_steps(job_id: &str, plugins: Vec<PluginCall>) -> Vec<StepDef> {
  let mut taken: HashSet<String> = HashSet::new();

  plugins
    .into_iter()
    .enumerate()
    .map(|(position, call)| {
      let name = unique_step_name(&call.name, &mut taken);
      let step = StepDef::new(name, call.name).with_params(call.params);
      if position == 0 {
        step.with_job(job_id)
      } else {
        step
      }
    })
    .collect()
}

/// `base`, or the first free `base#n` for n >= 2.
fn unique_step_name(base: &str, taken: &mut HashSet<String>) -> String {
  if taken.insert(base.to_string()) {
    return base.to_string();
  }
  let mut n = 2;
  loop {
    let candidate = format!("{base}#{n}");
    if taken.insert(candidate.clone()) {
      return candidate;
    }
    n += 1;
  }
}

fn finished(run: WorkflowRun) -> Result<WorkflowRun, EngineError> {
  match run.error {
    Some(failure) => Err(EngineError::Execution {
      failure,
      results: run.results,
    }),
    None => Ok(run),
  }
}
