//! Conversion between JSON values and Lua values.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use mlua::{Lua, Value as LuaValue};
use serde_json::{Map, Number, Value};
use sluice_task_runtime::SandboxError;

/// Nesting limit for both directions. Also stops self-referencing tables.
const MAX_DEPTH: usize = 128;

/// Floats with an integral value below this magnitude become JSON integers.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Estimated heap cost of one converted value, on top of its string bytes.
const NODE_COST: usize = 32;

/// Converted values between two checks of the deadline and interrupt flag.
const POLL_INTERVAL: usize = 4096;

/// Work allowed while converting a script result back to JSON.
///
/// Conversion runs after the interpreter has returned, so neither the
/// instruction hook nor the interpreter's memory limit apply. A table that
/// reuses a subtable converts once per reference, so the cost is charged per
/// converted value rather than per Lua object.
pub(crate) struct Budget<'a> {
  remaining: usize,
  converted: usize,
  deadline: Instant,
  interrupt: &'a AtomicBool,
}

impl<'a> Budget<'a> {
  pub(crate) fn new(bytes: usize, deadline: Instant, interrupt: &'a AtomicBool) -> Self {
    Self {
      remaining: bytes,
      converted: 0,
      deadline,
      interrupt,
    }
  }

  fn charge(&mut self, bytes: usize) -> Result<(), SandboxError> {
    self.converted += 1;
    if self.converted % POLL_INTERVAL == 0 {
      if self.interrupt.load(Ordering::Relaxed) {
        return Err(SandboxError::timeout("execution interrupted"));
      }
      if Instant::now() >= self.deadline {
        return Err(SandboxError::timeout(
          "deadline exceeded while converting result",
        ));
      }
    }

    self.remaining = self
      .remaining
      .checked_sub(NODE_COST.saturating_add(bytes))
      .ok_or_else(|| SandboxError::timeout("result exceeds memory limit"))?;
    Ok(())
  }
}

pub(crate) fn to_lua(lua: &Lua, value: &Value) -> Result<LuaValue, SandboxError> {
  to_lua_at(lua, value, 0)
}

fn to_lua_at(lua: &Lua, value: &Value, depth: usize) -> Result<LuaValue, SandboxError> {
  if depth > MAX_DEPTH {
    return Err(SandboxError::script("input nested too deeply"));
  }

  let converted = match value {
    Value::Null => LuaValue::Nil,
    Value::Bool(b) => LuaValue::Boolean(*b),
    Value::Number(n) => match n.as_i64() {
      Some(i) => LuaValue::Integer(i),
      None => LuaValue::Number(n.as_f64().unwrap_or(f64::NAN)),
    },
    Value::String(s) => LuaValue::String(lua.create_string(s).map_err(internal)?),
    Value::Array(items) => {
      let table = lua.create_table().map_err(internal)?;
      for (i, item) in items.iter().enumerate() {
        let item = to_lua_at(lua, item, depth + 1)?;
        table.raw_set(i as i64 + 1, item).map_err(internal)?;
      }
      LuaValue::Table(table)
    }
    Value::Object(fields) => {
      let table = lua.create_table().map_err(internal)?;
      for (key, item) in fields {
        let item = to_lua_at(lua, item, depth + 1)?;
        table.raw_set(key.as_str(), item).map_err(internal)?;
      }
      LuaValue::Table(table)
    }
  };

  Ok(converted)
}

pub(crate) fn from_lua(value: LuaValue, budget: &mut Budget<'_>) -> Result<Value, SandboxError> {
  from_lua_at(value, 0, budget)
}

fn from_lua_at(
  value: LuaValue,
  depth: usize,
  budget: &mut Budget<'_>,
) -> Result<Value, SandboxError> {
  if depth > MAX_DEPTH {
    return Err(SandboxError::script(
      "result nested too deeply or contains a cycle",
    ));
  }

  match value {
    LuaValue::Nil => Ok(Value::Null),
    LuaValue::Boolean(b) => {
      budget.charge(0)?;
      Ok(Value::Bool(b))
    }
    LuaValue::Integer(i) => {
      budget.charge(0)?;
      Ok(Value::from(i))
    }
    LuaValue::Number(f) => {
      budget.charge(0)?;
      number(f)
    }
    LuaValue::String(s) => {
      budget.charge(s.as_bytes().len())?;
      Ok(Value::String(s.to_string_lossy().to_string()))
    }
    LuaValue::Table(table) => {
      budget.charge(0)?;
      table_to_json(table, depth, budget)
    }
    other => Err(SandboxError::script(format!(
      "cannot convert {} to a data value",
      other.type_name()
    ))),
  }
}

fn number(f: f64) -> Result<Value, SandboxError> {
  if !f.is_finite() {
    return Err(SandboxError::script(format!(
      "result contains non-finite number {f}"
    )));
  }
  if f.fract() == 0.0 && f.abs() < MAX_SAFE_INTEGER {
    return Ok(Value::from(f as i64));
  }
  Number::from_f64(f)
    .map(Value::Number)
    .ok_or_else(|| SandboxError::script(format!("unrepresentable number {f}")))
}

/// Tables keyed only by positive integers become arrays (holes become
/// `null`); everything else becomes an object.
fn table_to_json(
  table: mlua::Table,
  depth: usize,
  budget: &mut Budget<'_>,
) -> Result<Value, SandboxError> {
  let mut entries = Vec::new();
  for pair in table.pairs::<LuaValue, LuaValue>() {
    entries.push(pair.map_err(|e| SandboxError::script(e.to_string()))?);
  }

  if entries.is_empty() {
    return Ok(Value::Array(Vec::new()));
  }

  if let Some(len) = array_len(&entries) {
    let mut items = vec![Value::Null; len];
    for (key, item) in entries {
      if let LuaValue::Integer(i) = key {
        items[(i - 1) as usize] = from_lua_at(item, depth + 1, budget)?;
      }
    }
    return Ok(Value::Array(items));
  }

  let mut fields = Map::new();
  for (key, item) in entries {
    let key = match key {
      LuaValue::String(s) => {
        budget.charge(s.as_bytes().len())?;
        s.to_string_lossy().to_string()
      }
      LuaValue::Integer(i) => i.to_string(),
      other => {
        return Err(SandboxError::script(format!(
          "table key of type {} cannot be converted",
          other.type_name()
        )));
      }
    };
    fields.insert(key, from_lua_at(item, depth + 1, budget)?);
  }
  Ok(Value::Object(fields))
}

/// Length of the array a table represents, or `None` if it is not one.
/// Sparse tables (max key above twice the entry count) stay objects.
fn array_len(entries: &[(LuaValue, LuaValue)]) -> Option<usize> {
  let mut max = 0i64;
  for (key, _) in entries {
    match key {
      LuaValue::Integer(i) if *i >= 1 => max = max.max(*i),
      _ => return None,
    }
  }
  let max = usize::try_from(max).ok()?;
  (max <= entries.len() * 2).then_some(max)
}

fn internal(e: mlua::Error) -> SandboxError {
  SandboxError::Internal(e.to_string())
}
