//! Sluice Task Runtime
//!
//! The abstraction every script backend implements. The workflow executor and
//! the plugin registry only talk to [`ScriptRuntime`]; the Lua backend lives in
//! `sluice-task-runtime-lua`.

mod error;
mod limits;
mod runtime;

pub use error::SandboxError;
pub use limits::Limits;
pub use runtime::{ScriptRequest, ScriptRuntime};
