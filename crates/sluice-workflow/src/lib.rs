//! Sluice Workflow
//!
//! The compiled form of a workflow document. A [`StepGraph`] is what the
//! executor runs:
//! - Every plugin reference is resolved to a script
//! - Every step input is explicit: an uploaded job or a predecessor step
//! - Steps are grouped into chains, each starting at a job-rooted step
//!
//! Each step has at most one predecessor and at most one successor, so the
//! graph is always a disjoint union of chains.

mod error;
mod graph;
mod node;

pub use error::WorkflowError;
pub use graph::{Chain, StepGraph};
pub use node::{ResolvedPlugin, StepInput, StepNode};
