use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{info, warn};

use crate::error::RegistryError;
use crate::registry::PluginRegistry;

const SCRIPT_EXTENSION: &str = "lua";
const DESCRIPTION_PREFIX: &str = "-- description:";

/// Outcome of loading a plugin directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
  /// Names of the plugins that were registered.
  pub loaded: Vec<String>,
  /// Files that were skipped, with the reason.
  pub skipped: Vec<(PathBuf, String)>,
}

/// Register every `*.lua` file in `dir`.
///
/// The file stem becomes the plugin name. A first line of the form
/// `-- description: ...` becomes the description. Files that fail to register
/// are skipped and reported rather than aborting the load. A missing
/// directory loads nothing.
///
/// ```text
/// {dir}/
/// ├── normalize.lua
/// └── threshold.lua
/// ```
pub async fn load_dir<P: PluginRegistry + ?Sized>(
  registry: &P,
  dir: &Path,
) -> Result<LoadReport, RegistryError> {
  let mut report = LoadReport::default();

  if !dir.exists() {
    return Ok(report);
  }

  let mut paths = Vec::new();
  let mut entries = fs::read_dir(dir).await?;
  while let Some(entry) = entries.next_entry().await? {
    let path = entry.path();
    if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(SCRIPT_EXTENSION) {
      paths.push(path);
    }
  }
  // Directory order is unspecified.
  paths.sort();

  for path in paths {
    let name = match path.file_stem().and_then(|s| s.to_str()) {
      Some(n) => n.to_string(),
      None => continue,
    };

    let script = fs::read_to_string(&path).await?;
    match registry.register(&name, description_of(&script), &script).await {
      Ok(plugin) => report.loaded.push(plugin.name),
      Err(e) => {
        warn!(path = %path.display(), error = %e, "plugin_skipped");
        report.skipped.push((path, e.to_string()));
      }
    }
  }

  info!(
    dir = %dir.display(),
    loaded = report.loaded.len(),
    skipped = report.skipped.len(),
    "plugins_loaded"
  );

  Ok(report)
}

fn description_of(script: &str) -> &str {
  script
    .lines()
    .next()
    .and_then(|line| line.strip_prefix(DESCRIPTION_PREFIX))
    .map(str::trim)
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::memory::MemoryPluginRegistry;
  use sluice_task_runtime_lua::LuaRuntime;

  #[test]
  fn test_description_of() {
    assert_eq!(
      description_of("-- description: scales values\nreturn input"),
      "scales values"
    );
    assert_eq!(description_of("return input"), "");
  }

  #[tokio::test]
  async fn test_load_dir_skips_invalid_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
      dir.path().join("identity.lua"),
      "-- description: passthrough\nreturn input",
    )
    .unwrap();
    std::fs::write(dir.path().join("broken.lua"), "return (").unwrap();
    std::fs::write(dir.path().join("README.md"), "not a plugin").unwrap();

    let registry = MemoryPluginRegistry::new(LuaRuntime::new());
    let report = load_dir(&registry, dir.path()).await.unwrap();

    assert_eq!(report.loaded, vec!["identity".to_string()]);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].0.ends_with("broken.lua"));

    let plugin = registry.lookup("identity").await.unwrap();
    assert_eq!(plugin.description, "passthrough");
  }

  #[tokio::test]
  async fn test_load_missing_dir() {
    let registry = MemoryPluginRegistry::new(LuaRuntime::new());
    let report = load_dir(&registry, Path::new("/no/such/plugins")).await.unwrap();
    assert_eq!(report, LoadReport::default());
  }
}
