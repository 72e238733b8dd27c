//! Sluice Config
//!
//! Serializable configuration types for Sluice. These types describe workflows
//! before they are compiled against the plugin registry, and the limits the
//! service runs scripts under.
//!
//! Workflow documents can be loaded from:
//! - YAML files (via CLI with `sluice run workflow workflow.yaml`)
//! - JSON text (YAML is a superset, so the same decoder handles both)
//!
//! The compiler takes a [`WorkflowDef`], resolves every plugin reference and
//! step input, and produces an executable step graph.

mod error;
mod service;
mod step;
mod workflow;

pub use error::ConfigError;
pub use service::ServiceConfig;
pub use step::{InputRef, Params, StepDef};
pub use workflow::WorkflowDef;
