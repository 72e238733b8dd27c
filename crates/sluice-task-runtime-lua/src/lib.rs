//! Sluice Lua Runtime
//!
//! [`ScriptRuntime`](sluice_task_runtime::ScriptRuntime) backed by an
//! embedded Lua 5.4 interpreter.
//!
//! Every execution gets a fresh interpreter state with only the `table`,
//! `string`, `math` and `utf8` libraries plus a trimmed base library. The
//! script sees two globals, `input` and `params`, and its chunk return value
//! is the result:
//!
//! ```lua
//! local out = {}
//! for i, v in ipairs(input) do
//!   out[i] = v / params.factor
//! end
//! return out
//! ```
//!
//! Limits are enforced by an instruction hook that checks the instruction
//! budget, the wall-clock deadline and a watchdog flag raised by the async
//! caller when its own timer expires.

mod convert;
mod runtime;
mod sandbox;

pub use runtime::LuaRuntime;
