//! Sluice Plugin Registry
//!
//! Named transformation scripts. A plugin is only visible once its script has
//! been compiled by the configured [`ScriptRuntime`](sluice_task_runtime::ScriptRuntime),
//! and a registered name can never be rebound.

mod error;
mod loader;
mod memory;
mod plugin;
mod registry;

pub use error::RegistryError;
pub use loader::{LoadReport, load_dir};
pub use memory::MemoryPluginRegistry;
pub use plugin::Plugin;
pub use registry::PluginRegistry;
