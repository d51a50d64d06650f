use std::io::{self, Read};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tessera_pipeline::{PipelineSpec, compile};
use tessera_runner::{LeaseKeeper, Runner, RunnerConfig};
use tessera_store::{SqliteStore, Store};
use tessera_web::AppState;

/// Tessera - a pipeline execution engine for oracle jobs
#[derive(Parser)]
#[command(name = "tessera")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.tessera)
  #[arg(long, global = true, env = "TESSERA_DATA_DIR")]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Serve the admin API and drive runs
  Serve {
    /// Address the admin API listens on
    #[arg(long, env = "TESSERA_LISTEN", default_value = "127.0.0.1:6688")]
    listen: SocketAddr,

    /// SQLite database URL (default: <data-dir>/tessera.db)
    #[arg(long, env = "TESSERA_DATABASE_URL")]
    database_url: Option<String>,

    #[command(flatten)]
    runner: RunnerArgs,
  },

  /// Compile and run a pipeline description once, printing its results
  Run {
    /// Path to the description file (TOML or JSON)
    pipeline_file: PathBuf,

    /// Bridge to register for this run, as name=url
    #[arg(long = "bridge", value_parser = parse_bridge)]
    bridges: Vec<(String, String)>,

    #[command(flatten)]
    runner: RunnerArgs,
  },

  /// Compile a pipeline description and print its execution layers
  Validate {
    /// Path to the description file (TOML or JSON)
    pipeline_file: PathBuf,
  },
}

#[derive(Args)]
struct RunnerArgs {
  /// Timeout for http and bridge tasks without their own, in seconds
  #[arg(long, env = "TESSERA_HTTP_TIMEOUT_SECS", default_value_t = 15)]
  http_timeout_secs: u64,

  /// How long to wait for a run when no deadline is given, in seconds
  #[arg(long, env = "TESSERA_AWAIT_TIMEOUT_SECS", default_value_t = 30)]
  await_timeout_secs: u64,

  /// Allow tasks to reach private and loopback addresses
  #[arg(long, env = "TESSERA_ALLOW_UNRESTRICTED_NETWORK_ACCESS")]
  allow_unrestricted_network_access: bool,

  /// Maximum tasks executing at once
  #[arg(long, env = "TESSERA_MAX_CONCURRENT_TASKS", default_value_t = 64)]
  max_concurrent_tasks: usize,

  /// Job lease lifetime, in seconds
  #[arg(long, env = "TESSERA_LEASE_TTL_SECS", default_value_t = 30)]
  lease_ttl_secs: u64,

  /// Lease holder id of this instance (default: random)
  #[arg(long, env = "TESSERA_HOLDER_ID")]
  holder_id: Option<String>,
}

impl RunnerArgs {
  fn config(&self) -> RunnerConfig {
    let defaults = RunnerConfig::default();
    RunnerConfig {
      default_http_timeout: Duration::from_secs(self.http_timeout_secs),
      await_timeout: Duration::from_secs(self.await_timeout_secs),
      allow_unrestricted_network_access: self.allow_unrestricted_network_access,
      max_concurrent_tasks: self.max_concurrent_tasks,
      lease_ttl: Duration::from_secs(self.lease_ttl_secs),
      holder_id: self.holder_id.clone().unwrap_or(defaults.holder_id),
    }
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".tessera"),
  };

  let rt = tokio::runtime::Runtime::new()?;
  match cli.command {
    Some(Commands::Serve {
      listen,
      database_url,
      runner,
    }) => rt.block_on(serve(listen, database_url, data_dir, runner.config())),
    Some(Commands::Run {
      pipeline_file,
      bridges,
      runner,
    }) => rt.block_on(run_pipeline(pipeline_file, bridges, runner.config())),
    Some(Commands::Validate { pipeline_file }) => validate(&pipeline_file),
    None => {
      println!("tessera - use --help to see available commands");
      Ok(())
    }
  }
}

async fn serve(
  listen: SocketAddr,
  database_url: Option<String>,
  data_dir: PathBuf,
  config: RunnerConfig,
) -> Result<()> {
  let database_url = match database_url {
    Some(url) => url,
    None => {
      tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
      format!("sqlite://{}", data_dir.join("tessera.db").display())
    }
  };

  let store: Arc<dyn Store> = Arc::new(
    SqliteStore::connect(&database_url)
      .await
      .with_context(|| format!("failed to open database: {}", database_url))?,
  );

  let holder_id = config.holder_id.clone();
  let keeper = LeaseKeeper::new(store.clone(), holder_id.clone(), config.lease_ttl);
  let runner = Runner::new(store, config);

  // Claim leases first so only jobs no live instance drives are resumed.
  let held = keeper.tick().await.context("failed to claim job leases")?;
  info!(holder_id = %holder_id, jobs = held.len(), "leases_claimed");

  let resumed = runner
    .resume_incomplete_runs()
    .await
    .context("failed to resume incomplete runs")?;
  if !resumed.is_empty() {
    info!(runs = ?resumed, "runs_resumed");
  }

  let cancel = CancellationToken::new();
  let leases = tokio::spawn(keeper.run(cancel.clone()));

  let listener = tokio::net::TcpListener::bind(listen)
    .await
    .with_context(|| format!("failed to bind admin API on {}", listen))?;
  info!(addr = %listen, holder_id = %holder_id, "tessera_started");

  let signal = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      info!("shutdown_requested");
    }
    signal.cancel();
  });

  let served = tessera_web::serve(
    listener,
    AppState {
      runner: runner.clone(),
    },
    cancel.clone(),
  )
  .await;

  cancel.cancel();
  runner.shutdown().await;
  leases.await.context("lease keeper task failed")?;

  served.context("admin API failed")
}

async fn run_pipeline(
  pipeline_file: PathBuf,
  bridges: Vec<(String, String)>,
  config: RunnerConfig,
) -> Result<()> {
  let (source, spec) = load_pipeline(&pipeline_file)?;
  let overrides = read_overrides_from_stdin()?;

  let store: Arc<dyn Store> = Arc::new(
    SqliteStore::in_memory()
      .await
      .context("failed to open in-memory database")?,
  );
  for (name, url) in &bridges {
    store
      .upsert_bridge(name, url)
      .await
      .with_context(|| format!("failed to register bridge '{}'", name))?;
  }

  let job = store
    .create_job(spec.name.as_deref(), &source, &spec)
    .await
    .context("failed to store pipeline")?;

  let runner = Runner::new(store, config);
  let results = runner
    .observe(job.id, overrides, &CancellationToken::new())
    .await
    .context("pipeline run failed")?;

  let output: Vec<serde_json::Value> = results
    .into_iter()
    .map(|result| match result {
      Ok(value) => serde_json::json!({ "value": value }),
      Err(error) => serde_json::json!({ "error": error }),
    })
    .collect();
  println!("{}", serde_json::to_string_pretty(&output)?);

  runner.shutdown().await;
  Ok(())
}

fn validate(pipeline_file: &Path) -> Result<()> {
  let (_, spec) = load_pipeline(pipeline_file)?;

  eprintln!(
    "Pipeline {} is valid: {} tasks",
    spec.name.as_deref().unwrap_or("(unnamed)"),
    spec.tasks.len() - 1
  );
  for (depth, layer) in spec.topological_layers().iter().enumerate() {
    println!("{}: {}", depth, layer.join(", "));
  }
  Ok(())
}

fn load_pipeline(path: &Path) -> Result<(String, PipelineSpec)> {
  let source = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read pipeline file: {}", path.display()))?;

  let def = match path.extension().and_then(|e| e.to_str()) {
    Some("json") => tessera_config::from_json_str(&source),
    _ => tessera_config::from_toml_str(&source),
  }
  .with_context(|| format!("failed to parse pipeline file: {}", path.display()))?;

  let spec = compile(def)
    .with_context(|| format!("failed to compile pipeline file: {}", path.display()))?;
  Ok((source, spec))
}

fn parse_bridge(value: &str) -> std::result::Result<(String, String), String> {
  match value.split_once('=') {
    Some((name, url)) if !name.trim().is_empty() => {
      Ok((name.trim().to_string(), url.trim().to_string()))
    }
    _ => Err(format!("expected name=url, got '{}'", value)),
  }
}

fn read_overrides_from_stdin() -> Result<Option<serde_json::Value>> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(None);
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read overrides from stdin")?;

  if input.trim().is_empty() {
    Ok(None)
  } else {
    serde_json::from_str(&input)
      .map(Some)
      .context("failed to parse overrides JSON from stdin")
  }
}
