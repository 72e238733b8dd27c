//! Interpreter construction and synchronous script execution.
//!
//! Limits are only checked between VM instructions and between converted
//! result values. A single C builtin (a backtracking `string.find` or
//! `string.gsub` pattern over a long subject, for example) runs to completion
//! without either check. The async caller is still released by the watchdog
//! in [`LuaRuntime`](crate::LuaRuntime), but the blocking worker keeps its
//! thread until the builtin returns.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use mlua::{HookTriggers, Lua, LuaOptions, StdLib, Value as LuaValue, VmState};
use serde_json::Value;
use sluice_task_runtime::{Limits, SandboxError, ScriptRequest};

use crate::convert::{Budget, from_lua, to_lua};

/// Instructions between two hook invocations.
const HOOK_INTERVAL: u32 = 10_000;

/// Result size allowed when no memory limit is configured.
const DEFAULT_RESULT_LIMIT: usize = 256 * 1024 * 1024;

/// Base-library functions removed from every state.
const BLOCKED_GLOBALS: &[&str] = &[
  "print",
  "dofile",
  "loadfile",
  "load",
  "require",
  "collectgarbage",
  "pcall",
  "xpcall",
];

/// Why the instruction hook stopped a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trip {
  Budget,
  Deadline,
  Interrupted,
}

impl Trip {
  fn reason(self, limits: &Limits) -> String {
    match self {
      Trip::Budget => format!(
        "instruction budget of {} exhausted",
        limits.instruction_budget.unwrap_or_default()
      ),
      Trip::Deadline => format!("deadline of {:?} exceeded", limits.timeout),
      Trip::Interrupted => "execution interrupted".to_string(),
    }
  }
}

/// Create a state with the restricted library set.
pub(crate) fn new_state() -> Result<Lua, SandboxError> {
  let libs = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8;
  let lua = Lua::new_with(libs, LuaOptions::new()).map_err(internal)?;

  let globals = lua.globals();
  for name in BLOCKED_GLOBALS {
    globals.raw_set(*name, LuaValue::Nil).map_err(internal)?;
  }

  Ok(lua)
}

/// Compile a script without running it.
pub(crate) fn compile(name: &str, script: &str) -> Result<(), SandboxError> {
  let lua = new_state()?;
  lua
    .load(script)
    .set_name(chunk_name(name))
    .into_function()
    .map(|_| ())
    .map_err(|e| SandboxError::InvalidScript {
      name: name.to_string(),
      message: first_line(&e.to_string()),
    })
}

/// Run a script to completion on the current thread.
///
/// `interrupt` is polled by the instruction hook; raising it stops the
/// script at the next hook invocation.
pub(crate) fn run(request: ScriptRequest, interrupt: Arc<AtomicBool>) -> Result<Value, SandboxError> {
  let ScriptRequest {
    name,
    script,
    input,
    params,
    limits,
  } = request;

  let deadline = Instant::now() + limits.timeout;

  let lua = new_state()?;
  if let Some(bytes) = limits.memory_limit {
    lua.set_memory_limit(bytes).map_err(internal)?;
  }

  let tripped = Arc::new(OnceLock::new());
  install_hook(
    &lua,
    deadline,
    limits.instruction_budget,
    interrupt.clone(),
    tripped.clone(),
  );

  let globals = lua.globals();
  globals.set("input", to_lua(&lua, &input)?).map_err(internal)?;
  globals
    .set("params", to_lua(&lua, &Value::Object(params))?)
    .map_err(internal)?;

  let outcome = lua
    .load(&*script)
    .set_name(chunk_name(&name))
    .into_function()
    .and_then(|f| f.call::<LuaValue>(()));

  if let Some(trip) = tripped.get() {
    return Err(SandboxError::timeout(trip.reason(&limits)));
  }

  match outcome {
    Ok(value) => {
      // The result's Rust copy is held to the same ceiling as the interpreter heap.
      let bytes = limits.memory_limit.unwrap_or(DEFAULT_RESULT_LIMIT);
      from_lua(value, &mut Budget::new(bytes, deadline, &interrupt))
    }
    Err(e) => Err(classify(&e)),
  }
}

fn install_hook(
  lua: &Lua,
  deadline: Instant,
  budget: Option<u64>,
  interrupt: Arc<AtomicBool>,
  tripped: Arc<OnceLock<Trip>>,
) {
  let executed = AtomicU64::new(0);

  let triggers = HookTriggers::new().every_nth_instruction(HOOK_INTERVAL);
  let _ = lua.set_hook(triggers, move |_lua, _debug| {
    let count = executed.fetch_add(u64::from(HOOK_INTERVAL), Ordering::Relaxed)
      + u64::from(HOOK_INTERVAL);

    let trip = if interrupt.load(Ordering::Relaxed) {
      Some(Trip::Interrupted)
    } else if budget.is_some_and(|b| count > b) {
      Some(Trip::Budget)
    } else if Instant::now() >= deadline {
      Some(Trip::Deadline)
    } else {
      None
    };

    match trip {
      Some(trip) => {
        let _ = tripped.set(trip);
        Err(mlua::Error::RuntimeError("execution limit reached".to_string()))
      }
      None => Ok(VmState::Continue),
    }
  });
}

/// Map an interpreter error to the sandbox taxonomy.
fn classify(error: &mlua::Error) -> SandboxError {
  match root_cause(error) {
    mlua::Error::MemoryError(_) => SandboxError::timeout("memory limit exceeded"),
    mlua::Error::SyntaxError { message, .. } => SandboxError::script(first_line(message)),
    mlua::Error::RuntimeError(message) => SandboxError::script(first_line(message)),
    other => SandboxError::script(first_line(&other.to_string())),
  }
}

fn root_cause(error: &mlua::Error) -> &mlua::Error {
  match error {
    mlua::Error::CallbackError { cause, .. } => root_cause(cause),
    other => other,
  }
}

/// `=` makes Lua use the name verbatim in messages (`normalize:3: ...`).
fn chunk_name(name: &str) -> String {
  format!("={name}")
}

/// Error messages carry a traceback after the first line.
fn first_line(message: &str) -> String {
  message.lines().next().unwrap_or_default().trim().to_string()
}

fn internal(e: mlua::Error) -> SandboxError {
  SandboxError::Internal(e.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::time::Duration;

  fn request(script: &str, input: Value) -> ScriptRequest {
    ScriptRequest {
      name: "test".to_string(),
      script: script.into(),
      input,
      params: json!({"factor": 2}).as_object().cloned().unwrap_or_default(),
      limits: Limits::default().with_timeout(Duration::from_secs(2)),
    }
  }

  fn run_now(script: &str, input: Value) -> Result<Value, SandboxError> {
    run(request(script, input), Arc::new(AtomicBool::new(false)))
  }

  #[test]
  fn test_blocked_globals_are_nil() {
    for name in BLOCKED_GLOBALS {
      let script = format!("return {name} == nil");
      assert_eq!(run_now(&script, json!(null)).unwrap(), json!(true), "{name}");
    }
  }

  #[test]
  fn test_os_and_io_are_absent() {
    let result = run_now("return os == nil and io == nil and debug == nil", json!(null));
    assert_eq!(result.unwrap(), json!(true));
  }

  #[test]
  fn test_reads_params() {
    let result = run_now("return input * params.factor", json!(21));
    assert_eq!(result.unwrap(), json!(42));
  }

  #[test]
  fn test_runtime_error_message_is_first_line() {
    let err = run_now("error('bad input')", json!(null)).unwrap_err();
    match err {
      SandboxError::ScriptError { message } => {
        assert!(message.ends_with("bad input"), "{message}");
        assert!(!message.contains('\n'));
      }
      other => panic!("expected script error, got {other:?}"),
    }
  }

  #[test]
  fn test_instruction_budget() {
    let mut req = request("while true do end", json!(null));
    req.limits = req.limits.with_instruction_budget(Some(50_000));

    let err = run(req, Arc::new(AtomicBool::new(false))).unwrap_err();
    assert!(err.is_timeout(), "{err:?}");
  }

  #[test]
  fn test_interrupt_flag_stops_script() {
    let req = request("while true do end", json!(null));
    let err = run(req, Arc::new(AtomicBool::new(true))).unwrap_err();
    assert_eq!(err, SandboxError::timeout("execution interrupted"));
  }

  #[test]
  fn test_memory_limit() {
    let mut req = request(
      "local t = {} for i = 1, 10000000 do t[i] = string.rep('x', 64) .. i end return #t",
      json!(null),
    );
    req.limits.memory_limit = Some(4 * 1024 * 1024);
    req.limits.instruction_budget = None;

    let err = run(req, Arc::new(AtomicBool::new(false))).unwrap_err();
    assert!(err.is_timeout(), "{err:?}");
  }

  #[test]
  fn test_shared_subtable_result_is_bounded() {
    let mut req = request(
      "local t = {1} for i = 1, 40 do t = {t, t} end return t",
      json!(null),
    );
    req.limits.memory_limit = Some(4 * 1024 * 1024);

    let started = Instant::now();
    let err = run(req, Arc::new(AtomicBool::new(false))).unwrap_err();

    assert_eq!(err, SandboxError::timeout("result exceeds memory limit"));
    assert!(started.elapsed() < Duration::from_secs(2));
  }

  #[test]
  fn test_shared_subtable_result_without_memory_limit_is_bounded() {
    let mut req = request(
      "local t = {1} for i = 1, 40 do t = {t, t} end return t",
      json!(null),
    );
    req.limits.memory_limit = None;
    req.limits.timeout = Duration::from_millis(200);

    let err = run(req, Arc::new(AtomicBool::new(false))).unwrap_err();
    assert!(err.is_timeout(), "{err:?}");
  }

  #[test]
  fn test_compile_reports_syntax_error() {
    let err = compile("broken", "return (").unwrap_err();
    assert!(matches!(err, SandboxError::InvalidScript { ref name, .. } if name == "broken"));
  }
}
