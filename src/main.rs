use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde_json::Value;

use sluice_config::{Params, ServiceConfig};
use sluice_engine::{Engine, EngineError};
use sluice_task_runtime_lua::LuaRuntime;

/// Sluice - data processing with sandboxed Lua plugins
#[derive(Parser)]
#[command(name = "sluice")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.sluice)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Service config file (default: <data-dir>/sluice.yaml if present)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Per-step script timeout in milliseconds
  #[arg(long, global = true, env = "SLUICE_SCRIPT_TIMEOUT_MS")]
  timeout_ms: Option<u64>,

  /// Maximum concurrently running chains in parallel workflows
  #[arg(long, global = true, env = "SLUICE_MAX_PARALLEL")]
  max_parallel: Option<usize>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow or a single plugin
  Run {
    #[command(subcommand)]
    target: RunTarget,
  },

  /// Compile a workflow and print its chains without running it
  Check {
    /// Path to the workflow file (YAML or JSON)
    workflow_file: PathBuf,

    /// Data file to upload, as NAME=PATH; referenced as {{ jobs.NAME }}
    #[arg(long = "data", value_parser = parse_data_arg)]
    data: Vec<(String, PathBuf)>,
  },

  /// Manage plugins in the plugins directory
  Plugins {
    #[command(subcommand)]
    command: PluginsCommand,
  },
}

#[derive(Subcommand)]
enum RunTarget {
  /// Run an entire workflow
  Workflow {
    /// Path to the workflow file (YAML or JSON)
    workflow_file: PathBuf,

    /// Data file to upload, as NAME=PATH; referenced as {{ jobs.NAME }}
    #[arg(long = "data", value_parser = parse_data_arg)]
    data: Vec<(String, PathBuf)>,
  },

  /// Run a single plugin
  Plugin {
    /// Plugin name
    name: String,

    /// JSON input file (default: stdin)
    #[arg(long)]
    data: Option<PathBuf>,

    /// Plugin params as a JSON object
    #[arg(long)]
    params: Option<String>,
  },
}

#[derive(Subcommand)]
enum PluginsCommand {
  /// Validate every plugin and report which load
  Check,

  /// List loadable plugins
  List,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir.clone() {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".sluice"),
  };
  let config = load_config(&cli, &data_dir)?;

  let Some(command) = cli.command else {
    println!("sluice - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(dispatch(command, &config, &data_dir))
}

async fn dispatch(command: Commands, config: &ServiceConfig, data_dir: &Path) -> Result<()> {
  let engine = Engine::lua(config);
  let report = engine
    .load_plugins(&data_dir.join("plugins"))
    .await
    .map_err(report_error)?;

  match command {
    Commands::Run { target } => match target {
      RunTarget::Workflow {
        workflow_file,
        data,
      } => run_workflow(&engine, &workflow_file, &data).await,
      RunTarget::Plugin { name, data, params } => {
        run_plugin(&engine, &name, data.as_deref(), params.as_deref()).await
      }
    },
    Commands::Check {
      workflow_file,
      data,
    } => check_workflow(&engine, &workflow_file, &data).await,
    Commands::Plugins { command } => match command {
      PluginsCommand::Check => {
        for name in &report.loaded {
          println!("ok      {name}");
        }
        for (path, reason) in &report.skipped {
          println!("skipped {}: {reason}", path.display());
        }
        if report.skipped.is_empty() {
          Ok(())
        } else {
          Err(anyhow!("{} plugin(s) failed to load", report.skipped.len()))
        }
      }
      PluginsCommand::List => {
        for plugin in engine.list_plugins().await.map_err(report_error)? {
          println!("{}\t{}", plugin.name, plugin.description);
        }
        Ok(())
      }
    },
  }
}

/// Defaults, then the config file, then flags and environment.
fn load_config(cli: &Cli, data_dir: &Path) -> Result<ServiceConfig> {
  let default_path = data_dir.join("sluice.yaml");
  let mut config = match &cli.config {
    Some(path) => ServiceConfig::load(path)
      .with_context(|| format!("failed to load config: {}", path.display()))?,
    None if default_path.exists() => ServiceConfig::load(&default_path)
      .with_context(|| format!("failed to load config: {}", default_path.display()))?,
    None => ServiceConfig::default(),
  };

  if let Some(ms) = cli.timeout_ms {
    config.script_timeout_ms = ms;
  }
  if let Some(n) = cli.max_parallel {
    config.max_parallel = n;
  }

  Ok(config.normalized())
}

async fn run_workflow(
  engine: &Engine<LuaRuntime>,
  workflow_file: &Path,
  data: &[(String, PathBuf)],
) -> Result<()> {
  let document = prepare_workflow(engine, workflow_file, data).await?;

  let output = engine
    .process_workflow_document(&document)
    .await
    .map_err(report_error)?;

  eprintln!("Results stored as job: {}", output.job_id);
  println!("{}", serde_json::to_string_pretty(&output)?);

  Ok(())
}

async fn check_workflow(
  engine: &Engine<LuaRuntime>,
  workflow_file: &Path,
  data: &[(String, PathBuf)],
) -> Result<()> {
  let document = prepare_workflow(engine, workflow_file, data).await?;
  let def = sluice_config::WorkflowDef::from_document(&document)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))?;

  let graph = engine.compile(def).await.map_err(report_error)?;

  eprintln!(
    "Compiled workflow '{}': {} steps in {} chains",
    graph.name,
    graph.len(),
    graph.chains().len()
  );
  println!("{}", serde_json::to_string_pretty(&graph)?);

  Ok(())
}

async fn run_plugin(
  engine: &Engine<LuaRuntime>,
  name: &str,
  data: Option<&Path>,
  params: Option<&str>,
) -> Result<()> {
  let input = match data {
    Some(path) => read_json(path)?,
    None => read_input_from_stdin()?,
  };

  let params: Params = match params {
    Some(text) => serde_json::from_str(text).context("--params must be a JSON object")?,
    None => Params::new(),
  };

  let output = engine
    .execute_plugin(name, input, params)
    .await
    .map_err(report_error)?;

  println!("{}", serde_json::to_string_pretty(&output)?);

  Ok(())
}

/// Upload data files and render the workflow template against their job ids.
async fn prepare_workflow(
  engine: &Engine<LuaRuntime>,
  workflow_file: &Path,
  data: &[(String, PathBuf)],
) -> Result<String> {
  let template = tokio::fs::read_to_string(workflow_file)
    .await
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;

  let mut jobs = BTreeMap::new();
  for (name, path) in data {
    let job = engine
      .upload_data(read_json(path)?)
      .await
      .map_err(report_error)?;
    eprintln!("Uploaded {} as job {}", path.display(), job.id);
    jobs.insert(name.clone(), job.id);
  }

  render_workflow(&template, &jobs)
    .with_context(|| format!("failed to render workflow file: {}", workflow_file.display()))
}

fn render_workflow(template: &str, jobs: &BTreeMap<String, String>) -> Result<String> {
  let env = minijinja::Environment::new();
  Ok(env.render_str(template, minijinja::context! { jobs => jobs })?)
}

fn parse_data_arg(arg: &str) -> Result<(String, PathBuf), String> {
  match arg.split_once('=') {
    Some((name, path)) if !name.is_empty() && !path.is_empty() => {
      Ok((name.to_string(), PathBuf::from(path)))
    }
    _ => Err(format!("expected NAME=PATH, got '{arg}'")),
  }
}

fn read_json(path: &Path) -> Result<Value> {
  let text = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read data file: {}", path.display()))?;
  serde_json::from_str(&text)
    .with_context(|| format!("failed to parse data file as JSON: {}", path.display()))
}

fn read_input_from_stdin() -> Result<Value> {
  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read input from stdin")?;

  if input.trim().is_empty() {
    return Ok(Value::Null);
  }

  serde_json::from_str(&input).context("failed to parse stdin as JSON")
}

/// Print the error body and convert it for the exit path.
fn report_error(err: EngineError) -> anyhow::Error {
  if let Ok(body) = serde_json::to_string_pretty(&err.body()) {
    println!("{body}");
  }
  anyhow!("{} (status {})", err, err.status_code())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_data_arg() {
    assert_eq!(
      parse_data_arg("sales=data/sales.json").unwrap(),
      ("sales".to_string(), PathBuf::from("data/sales.json"))
    );
    assert!(parse_data_arg("no-separator").is_err());
    assert!(parse_data_arg("=path").is_err());
  }

  #[test]
  fn test_render_workflow_substitutes_job_ids() {
    let mut jobs = BTreeMap::new();
    jobs.insert("sales".to_string(), "1234-abcd".to_string());

    let rendered = render_workflow(
      "steps:\n  - name: a\n    input:\n      job_id: {{ jobs.sales }}\n",
      &jobs,
    )
    .unwrap();

    assert!(rendered.contains("job_id: 1234-abcd"));
  }

  #[test]
  fn test_render_workflow_without_placeholders_is_unchanged() {
    let text = "name: w\nsteps: []\n";
    assert_eq!(render_workflow(text, &BTreeMap::new()).unwrap().trim_end(), text.trim_end());
  }

  #[test]
  fn test_load_config_layers_flags_over_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
      dir.path().join("sluice.yaml"),
      "script_timeout_ms: 1000\nmax_parallel: 3\n",
    )
    .unwrap();

    let cli = Cli::parse_from(["sluice", "--max-parallel", "7"]);
    let config = load_config(&cli, dir.path()).unwrap();

    assert_eq!(config.script_timeout_ms, 1000);
    assert_eq!(config.max_parallel, 7);
  }
}
