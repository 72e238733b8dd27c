//! Sluice Engine
//!
//! The service surface of Sluice. [`Engine`] wires the job store, plugin
//! registry, compiler and executor together and exposes the operations a
//! transport layer would route to:
//!
//! | Operation | Method | Failure status |
//! |---|---|---|
//! | upload data | [`Engine::upload_data`] | 400 |
//! | register plugin | [`Engine::register_plugin`] | 409, 400 |
//! | execute plugin | [`Engine::execute_plugin`] | 404, 422 |
//! | process data | [`Engine::process_data`] | 404, 422 |
//! | process workflow | [`Engine::process_workflow_document`] | 400, 404, 422 |
//!
//! Every error maps to a status through [`EngineError::status_code`].

mod engine;
mod error;
mod types;

pub use engine::Engine;
pub use error::EngineError;
pub use types::{PluginCall, ProcessOutput, WorkflowOutput};
