//! VCI Engine CLI
//!
//! Entry point for the `vci` command-line tool.

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{self, ExitCode};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use ulid::Ulid;

use vci_attestation::{default_registry, AttestationPipeline};
use vci_engine::clock::{Clock, SystemClock};
use vci_engine::config::{ConfigError, EffectiveConfig, EngineSettings};
use vci_engine::credential::{DefinitionCatalog, LoggingCredentialWriter};
use vci_engine::manager::{IssuanceProcessManager, ManagerConfig, Worker};
use vci_engine::process::IssuanceRequest;
use vci_engine::state::{IssuanceProcessState, ProcessStateError};
use vci_engine::store::{
    Criterion, IssuanceProcessStore, QuerySpec, SortField, SortOrder, SqliteIssuanceProcessStore,
};
use vci_model::IssuanceError;

#[derive(Parser)]
#[command(name = "vci")]
#[command(about = "Credential issuance process engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an issuance manager against a process database
    Run {
        /// SQLite process database
        #[arg(long)]
        db: PathBuf,

        /// Lease owner name (default: generated)
        #[arg(long)]
        worker_id: Option<String>,

        /// JSON file with attestation and credential definitions
        #[arg(long)]
        definitions: Option<PathBuf>,

        /// Run a single cycle and print its report
        #[arg(long)]
        once: bool,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Create processes from an intake JSON file (object or array)
    Submit {
        #[arg(long)]
        db: PathBuf,

        file: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Print one process as JSON
    Show {
        #[arg(long)]
        db: PathBuf,

        id: String,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// List processes as JSON, oldest first
    List {
        #[arg(long)]
        db: PathBuf,

        /// Only processes in this state (e.g. PENDING)
        #[arg(long)]
        state: Option<String>,

        /// Only processes for this holder
        #[arg(long)]
        holder: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Print the effective configuration and where it came from
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// TOML config file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    #[arg(long)]
    lease_seconds: Option<u64>,

    #[arg(long)]
    batch_size: Option<u64>,

    #[arg(long)]
    max_retries: Option<u64>,

    /// tracing filter directive, e.g. "vci_engine=debug"
    #[arg(long)]
    log_level: Option<String>,
}

impl ConfigArgs {
    /// Flags that were given, as the CLI configuration layer.
    fn overrides(&self) -> Option<Value> {
        let mut layer = Map::new();
        if let Some(v) = self.lease_seconds {
            layer.insert("lease_seconds".to_string(), Value::from(v));
        }
        if let Some(v) = self.batch_size {
            layer.insert("batch_size".to_string(), Value::from(v));
        }
        if let Some(v) = self.max_retries {
            layer.insert("max_retries".to_string(), Value::from(v));
        }
        if let Some(ref v) = self.log_level {
            layer.insert("log_level".to_string(), Value::from(v.clone()));
        }
        (!layer.is_empty()).then_some(Value::Object(layer))
    }

    fn load(&self) -> Result<(EffectiveConfig, EngineSettings), CliError> {
        let effective = EffectiveConfig::build(self.config.as_deref(), self.overrides())?;
        let settings = effective.settings()?;
        init_tracing(&settings.log_level);
        Ok((effective, settings))
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Issuance(#[from] IssuanceError),

    #[error("{0}")]
    State(#[from] ProcessStateError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Intake file contents.
#[derive(Deserialize)]
#[serde(untagged)]
enum Intake {
    One(IssuanceRequest),
    Many(Vec<IssuanceRequest>),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            db,
            worker_id,
            definitions,
            once,
            config,
        } => run_manager(db, worker_id, definitions, once, &config),
        Commands::Submit { db, file, config } => run_submit(db, file, &config),
        Commands::Show { db, id, config } => run_show(db, &id, &config),
        Commands::List {
            db,
            state,
            holder,
            limit,
            config,
        } => run_list(db, state, holder, limit, &config),
        Commands::Config { config } => run_config(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // Only the first call installs a subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn open_store(
    db: &Path,
    settings: &EngineSettings,
    clock: Arc<dyn Clock>,
) -> Result<SqliteIssuanceProcessStore, CliError> {
    Ok(SqliteIssuanceProcessStore::open(
        db,
        clock,
        settings.lease_duration,
        settings.busy_timeout,
    )?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_manager(
    db: PathBuf,
    worker_id: Option<String>,
    definitions: Option<PathBuf>,
    once: bool,
    config: &ConfigArgs,
) -> Result<(), CliError> {
    let (_, settings) = config.load()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(&db, &settings, Arc::clone(&clock))?;

    let catalog = match definitions {
        Some(ref path) => DefinitionCatalog::from_file(path)?,
        None => DefinitionCatalog::default(),
    };
    let (attestations, credentials) = catalog.into_stores()?;

    let owner = worker_id.unwrap_or_else(|| format!("vci-{}", Ulid::new().to_string().to_lowercase()));
    let manager = IssuanceProcessManager::new(
        Arc::new(store),
        AttestationPipeline::new(Arc::new(attestations), Arc::new(default_registry())),
        Arc::new(credentials),
        Arc::new(LoggingCredentialWriter),
        ManagerConfig::new(owner)
            .with_batch_size(settings.batch_size)
            .with_retry(settings.retry),
    )
    .with_clock(clock);

    if once {
        let report = manager.run_once()?;
        return print_json(&report);
    }

    let worker = Worker::new(manager, settings.worker_config());
    let shutdown = worker.shutdown_handle();
    ctrlc::set_handler(move || {
        if shutdown.swap(true, Ordering::SeqCst) {
            eprintln!("\nReceived second interrupt, exiting immediately...");
            process::exit(130);
        }
        eprintln!("\nReceived interrupt signal, finishing current cycle...");
    })?;

    let summary = worker.run();
    info!(
        cycles = summary.cycles,
        failed_cycles = summary.failed_cycles,
        "worker stopped"
    );
    print_json(&summary)
}

fn run_submit(db: PathBuf, file: PathBuf, config: &ConfigArgs) -> Result<(), CliError> {
    let (_, settings) = config.load()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(&db, &settings, Arc::clone(&clock))?;

    let requests = match serde_json::from_str::<Intake>(&fs::read_to_string(&file)?)? {
        Intake::One(request) => vec![request],
        Intake::Many(requests) => requests,
    };

    let mut created = Vec::with_capacity(requests.len());
    for request in requests {
        let process = request.into_process(clock.now())?;
        let id = process.id().to_string();
        store.create(process)?;
        info!(process_id = %id, "process submitted");
        created.push(id);
    }
    print_json(&created)
}

fn run_show(db: PathBuf, id: &str, config: &ConfigArgs) -> Result<(), CliError> {
    let (_, settings) = config.load()?;
    let store = open_store(&db, &settings, Arc::new(SystemClock))?;

    match store.find_by_id(id)? {
        Some(process) => print_json(&process),
        None => Err(IssuanceError::process_not_found(id).into()),
    }
}

fn run_list(
    db: PathBuf,
    state: Option<String>,
    holder: Option<String>,
    limit: Option<usize>,
    config: &ConfigArgs,
) -> Result<(), CliError> {
    let (_, settings) = config.load()?;
    let store = open_store(&db, &settings, Arc::new(SystemClock))?;

    let mut spec = QuerySpec::all().sorted_by(SortField::CreatedAt, SortOrder::Ascending);
    if let Some(state) = state {
        spec = spec.with_criterion(Criterion::State(state.parse::<IssuanceProcessState>()?));
    }
    if let Some(holder) = holder {
        spec = spec.with_criterion(Criterion::HolderId(holder));
    }
    if let Some(limit) = limit {
        spec = spec.paged(0, limit);
    }

    print_json(&store.query(&spec)?)
}

fn run_config(config: &ConfigArgs) -> Result<(), CliError> {
    let (effective, _) = config.load()?;
    println!("{}", effective.to_json()?);
    Ok(())
}
