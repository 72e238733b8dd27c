use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use sluice_config::Params;
use sluice_task_runtime::{SandboxError, ScriptRequest, ScriptRuntime};
use sluice_task_runtime_lua::LuaRuntime;
use sluice_workflow::{ResolvedPlugin, StepGraph, StepInput, StepNode};
use sluice_workflow_orchestrator::{
  ChannelNotifier, ExecutorConfig, InitialInputs, RunEvent, RunStatus, StepError,
  WorkflowExecutor,
};
use tokio_util::sync::CancellationToken;

const NORMALIZE: &str = r#"
local out = {}
for i, v in ipairs(input) do out[i] = v / params.factor end
return out
"#;

const THRESHOLD: &str = r#"
local out = {}
for i, v in ipairs(input) do
  if v > params.limit then out[i] = 1 else out[i] = 0 end
end
return out
"#;

/// Runtime whose scripts are commands:
/// `sleep <ms>` returns input after a delay, `inc` adds one, `fail <msg>` errors.
#[derive(Default)]
struct ScriptedRuntime {
  active: AtomicUsize,
  peak: AtomicUsize,
  calls: AtomicUsize,
}

#[async_trait]
impl ScriptRuntime for ScriptedRuntime {
  fn validate(&self, _name: &str, _script: &str) -> Result<(), SandboxError> {
    Ok(())
  }

  async fn execute(&self, request: ScriptRequest) -> Result<Value, SandboxError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);

    let mut parts = request.script.splitn(2, ' ');
    let result = match (parts.next(), parts.next()) {
      (Some("sleep"), Some(ms)) => {
        let ms: u64 = ms.trim().parse().unwrap();
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(request.input)
      }
      (Some("inc"), _) => Ok(json!(request.input.as_i64().unwrap() + 1)),
      (Some("fail"), Some(message)) => Err(SandboxError::script(message)),
      _ => panic!("unknown command {}", request.script),
    };

    self.active.fetch_sub(1, Ordering::SeqCst);
    result
  }
}

fn step(index: usize, name: &str, script: &str, params: Value, input: StepInput) -> StepNode {
  StepNode {
    index,
    name: name.to_string(),
    plugin: ResolvedPlugin {
      name: format!("{name}-plugin"),
      script: script.into(),
    },
    params: params.as_object().cloned().unwrap_or_else(Params::new),
    input,
  }
}

fn job(id: &str) -> StepInput {
  StepInput::Job(id.to_string())
}

fn pred(index: usize) -> StepInput {
  StepInput::Predecessor(index)
}

fn inputs(pairs: &[(&str, Value)]) -> InitialInputs {
  pairs
    .iter()
    .map(|(k, v)| (k.to_string(), v.clone()))
    .collect()
}

fn config(max_parallel: usize) -> ExecutorConfig {
  ExecutorConfig {
    max_parallel,
    ..ExecutorConfig::default()
  }
}

fn lua_executor() -> WorkflowExecutor<LuaRuntime> {
  WorkflowExecutor::new(Arc::new(LuaRuntime::new()), config(4))
}

#[tokio::test]
async fn test_sequential_normalize_then_threshold() {
  let graph = StepGraph::new(
    "scale",
    "",
    false,
    vec![
      step(0, "norm", NORMALIZE, json!({"factor": 100}), job("j")),
      step(1, "flag", THRESHOLD, json!({"limit": 2}), pred(0)),
    ],
  )
  .unwrap();

  let run = lua_executor()
    .run(&graph, &inputs(&[("j", json!([100, 200, 300, 400, 500]))]))
    .await;

  assert_eq!(run.status, RunStatus::Completed);
  assert!(run.is_success());
  assert!(run.error.is_none());
  assert_eq!(run.results["norm"], json!([1, 2, 3, 4, 5]));
  assert_eq!(run.results["flag"], json!([0, 0, 1, 1, 1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_matches_sequential() {
  let nodes = vec![
    step(0, "a", NORMALIZE, json!({"factor": 10}), job("j1")),
    step(1, "b", THRESHOLD, json!({"limit": 5}), pred(0)),
    step(2, "c", NORMALIZE, json!({"factor": 2}), job("j2")),
    step(3, "d", "return input", json!({}), job("j1")),
  ];
  let data = inputs(&[("j1", json!([10, 50, 90])), ("j2", json!([4, 8]))]);

  let sequential = StepGraph::new("w", "", false, nodes.clone()).unwrap();
  let parallel = StepGraph::new("w", "", true, nodes).unwrap();

  let executor = lua_executor();
  let seq_run = executor.run(&sequential, &data).await;
  let par_run = executor.run(&parallel, &data).await;

  assert_eq!(seq_run.status, RunStatus::Completed);
  assert_eq!(par_run.status, RunStatus::Completed);
  assert_eq!(seq_run.results, par_run.results);
  assert_eq!(par_run.results["b"], json!([0, 0, 1]));
  assert_eq!(par_run.results["c"], json!([2, 4]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_respects_max_parallel() {
  let runtime = Arc::new(ScriptedRuntime::default());
  let executor = WorkflowExecutor::new(runtime.clone(), config(2));

  let nodes = (0..6)
    .map(|i| step(i, &format!("s{i}"), "sleep 40", json!({}), job("j")))
    .collect();
  let graph = StepGraph::new("w", "", true, nodes).unwrap();

  let run = executor.run(&graph, &inputs(&[("j", json!(1))])).await;

  assert_eq!(run.status, RunStatus::Completed);
  assert_eq!(run.results.len(), 6);
  assert_eq!(runtime.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_parallel_accepts_out_of_range_max_parallel() {
  for max_parallel in [0, usize::MAX] {
    let runtime = Arc::new(ScriptedRuntime::default());
    let executor = WorkflowExecutor::new(runtime, config(max_parallel));

    let nodes = (0..3)
      .map(|i| step(i, &format!("s{i}"), "inc", json!({}), job("j")))
      .collect();
    let graph = StepGraph::new("w", "", true, nodes).unwrap();

    let run = executor.run(&graph, &inputs(&[("j", json!(1))])).await;

    assert_eq!(run.status, RunStatus::Completed, "max_parallel = {max_parallel}");
    assert_eq!(run.results["s2"], json!(2));
  }
}

#[tokio::test]
async fn test_sequential_failure_stops_run() {
  let runtime = Arc::new(ScriptedRuntime::default());
  let executor = WorkflowExecutor::new(runtime.clone(), config(4));

  let graph = StepGraph::new(
    "w",
    "",
    false,
    vec![
      step(0, "first", "inc", json!({}), job("j")),
      step(1, "broken", "fail nope", json!({}), pred(0)),
      step(2, "after", "inc", json!({}), pred(1)),
      step(3, "other", "inc", json!({}), job("j")),
    ],
  )
  .unwrap();

  let run = executor.run(&graph, &inputs(&[("j", json!(1))])).await;

  assert_eq!(run.status, RunStatus::Failed);
  assert_eq!(run.results.len(), 1);
  assert_eq!(run.results["first"], json!(2));

  let failure = run.error.unwrap();
  assert_eq!(failure.step, "broken");
  assert_eq!(
    failure.error,
    StepError::Script {
      message: "nope".to_string()
    }
  );
  assert_eq!(runtime.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_failure_cancels_at_step_boundary() {
  let runtime = Arc::new(ScriptedRuntime::default());
  let executor = WorkflowExecutor::new(runtime.clone(), config(4));

  let graph = StepGraph::new(
    "w",
    "",
    true,
    vec![
      step(0, "slow1", "sleep 100", json!({}), job("j")),
      step(1, "slow2", "sleep 100", json!({}), pred(0)),
      step(2, "slow3", "sleep 100", json!({}), pred(1)),
      step(3, "quick", "inc", json!({}), job("j")),
      step(4, "boom", "fail exploded", json!({}), pred(3)),
    ],
  )
  .unwrap();

  let run = executor.run(&graph, &inputs(&[("j", json!(1))])).await;

  assert_eq!(run.status, RunStatus::Failed);
  let failure = run.error.as_ref().unwrap();
  assert_eq!(failure.step, "boom");

  // The in-flight step finishes; later steps never start.
  assert_eq!(run.results["quick"], json!(2));
  assert_eq!(run.results["slow1"], json!(1));
  assert!(!run.results.contains_key("slow2"));
  assert!(!run.results.contains_key("slow3"));
}

#[tokio::test]
async fn test_missing_input_fails_before_execution() {
  let runtime = Arc::new(ScriptedRuntime::default());
  let executor = WorkflowExecutor::new(runtime.clone(), config(4));

  let graph = StepGraph::new(
    "w",
    "",
    false,
    vec![step(0, "a", "inc", json!({}), job("absent"))],
  )
  .unwrap();

  let run = executor.run(&graph, &InitialInputs::new()).await;

  assert_eq!(run.status, RunStatus::Failed);
  assert!(run.results.is_empty());
  assert!(matches!(
    run.error.unwrap().error,
    StepError::MissingInput { job_id } if job_id == "absent"
  ));
  assert_eq!(runtime.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_external_cancel_marks_run_failed() {
  let runtime = Arc::new(ScriptedRuntime::default());
  let executor = WorkflowExecutor::new(runtime, config(4));

  let graph = StepGraph::new(
    "w",
    "",
    false,
    vec![
      step(0, "a", "inc", json!({}), job("j")),
      step(1, "b", "inc", json!({}), pred(0)),
    ],
  )
  .unwrap();

  let cancel = CancellationToken::new();
  cancel.cancel();
  let run = executor
    .run_with_cancel(&graph, &inputs(&[("j", json!(1))]), cancel)
    .await;

  assert_eq!(run.status, RunStatus::Failed);
  let failure = run.error.unwrap();
  assert_eq!(failure.step, "a");
  assert_eq!(failure.error, StepError::Cancelled);
}

#[tokio::test]
async fn test_events_are_emitted_in_order() {
  let (notifier, mut events) = ChannelNotifier::channel();
  let executor =
    WorkflowExecutor::new(Arc::new(ScriptedRuntime::default()), config(1)).with_notifier(notifier);

  let graph = StepGraph::new(
    "w",
    "",
    false,
    vec![
      step(0, "a", "inc", json!({}), job("j")),
      step(1, "b", "fail bad", json!({}), pred(0)),
      step(2, "c", "inc", json!({}), pred(1)),
    ],
  )
  .unwrap();

  let run = executor.run(&graph, &inputs(&[("j", json!(0))])).await;
  drop(executor);

  let mut received = Vec::new();
  while let Ok(event) = events.try_recv() {
    received.push(event);
  }

  let run_id = run.id.clone();
  assert_eq!(
    received,
    vec![
      RunEvent::RunStarted {
        run_id: run_id.clone(),
        workflow: "w".to_string()
      },
      RunEvent::StepStarted {
        run_id: run_id.clone(),
        step: "a".to_string()
      },
      RunEvent::StepCompleted {
        run_id: run_id.clone(),
        step: "a".to_string(),
        output: json!(1)
      },
      RunEvent::StepStarted {
        run_id: run_id.clone(),
        step: "b".to_string()
      },
      RunEvent::StepFailed {
        run_id: run_id.clone(),
        step: "b".to_string(),
        error: "script error: bad".to_string()
      },
      RunEvent::StepSkipped {
        run_id: run_id.clone(),
        step: "c".to_string()
      },
      RunEvent::RunFailed {
        run_id,
        step: "b".to_string(),
        error: "script error: bad".to_string()
      },
    ]
  );
}

#[tokio::test]
async fn test_execute_step_outside_workflow() {
  let executor = lua_executor();
  let plugin = ResolvedPlugin {
    name: "normalize".to_string(),
    script: NORMALIZE.into(),
  };

  let output = executor
    .execute_step(
      &plugin,
      json!([100, 250]),
      json!({"factor": 100}).as_object().cloned().unwrap(),
    )
    .await
    .unwrap();

  assert_eq!(output, json!([1, 2.5]));
}
