//! Sluice Workflow Orchestrator
//!
//! Runs compiled [`StepGraph`](sluice_workflow::StepGraph)s.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    WorkflowExecutor                         │
//! │  - run(graph, inputs) → WorkflowRun                         │
//! │  - sequential: chains one after another, stop on failure    │
//! │  - parallel: chains on a bounded pool, cancel on failure    │
//! └─────────────────────────────────────────────────────────────┘
//!                               │  one chain at a time per task
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ScriptRuntime                           │
//! │  - executes one step's script under limits                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Within a chain each step consumes its predecessor's output. Chains share
//! nothing; each returns its own outputs and the executor merges them into a
//! map keyed by step name, so the result does not depend on completion order.

mod error;
mod events;
mod executor;
mod run;

pub use error::StepError;
pub use events::{ChannelNotifier, NoopNotifier, RunEvent, RunNotifier};
pub use executor::{ExecutorConfig, WorkflowExecutor};
pub use run::{InitialInputs, RunStatus, StepFailure, WorkflowRun};
