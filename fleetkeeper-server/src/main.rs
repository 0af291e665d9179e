#![allow(missing_docs)]

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, builder::styling};
use dotenvy::dotenv;
use fleetkeeper::cloud::ProviderRegistry;
use fleetkeeper::config::{ConfigPaths, FleetConfig};
use fleetkeeper::hosts::{HostStore, SqliteHostStore};
use fleetkeeper::reconcile::CloudHostReadyJob;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

mod logging;

/// Options that override values from the configuration files
#[derive(Args, Clone, Default)]
struct ReconcilerArgs {
    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Path to the SQLite database file. If not specified, uses DATABASE_URL environment variable
    #[arg(short, long)]
    database: Option<String>,

    /// Additional configuration file, read after the standard locations
    #[arg(short, long, env = "FLEETKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds between reconciliation passes
    #[arg(short, long, env = "FLEETKEEPER_INTERVAL_SECS")]
    interval_secs: Option<f64>,

    /// Deadline in seconds for a single pass
    #[arg(long)]
    pass_timeout_secs: Option<f64>,

    /// Deadline in seconds for a single provider query
    #[arg(long)]
    batch_timeout_secs: Option<f64>,

    /// Number of provider batches queried concurrently
    #[arg(long)]
    max_concurrent_batches: Option<usize>,

    /// Directory for log files (enables daily rotated file logging)
    #[arg(long, env = "FLEETKEEPER_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Use JSON format for log files
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::Green.on_default().bold())
    .usage(styling::AnsiColor::Green.on_default().bold())
    .literal(styling::AnsiColor::Cyan.on_default().bold())
    .placeholder(styling::AnsiColor::Cyan.on_default());

#[derive(Parser)]
#[command(name = "fleetkeeper-server")]
#[command(about = "Reconciles cloud host records with provider instance state")]
#[command(styles = STYLES)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run reconciliation passes on an interval (default if no subcommand specified)
    Run {
        #[command(flatten)]
        args: ReconcilerArgs,
    },
    /// Run a single reconciliation pass and print its report as JSON
    Once {
        #[command(flatten)]
        args: ReconcilerArgs,
    },
    /// Print the effective configuration
    Config {
        /// Print the built-in defaults instead
        #[arg(long)]
        default: bool,

        #[command(flatten)]
        args: ReconcilerArgs,
    },
}

fn main() -> Result<()> {
    dotenv().ok();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Run { args }) => run(args, false),
        Some(Commands::Once { args }) => run(args, true),
        Some(Commands::Config { default, args }) => show_config(default, args),
        None => run(ReconcilerArgs::default(), false),
    }
}

/// Merge CLI arguments over the layered file configuration
fn load_config(args: &ReconcilerArgs) -> Result<FleetConfig> {
    let paths = ConfigPaths::new();
    let mut files: Vec<PathBuf> = paths.existing_paths().into_iter().cloned().collect();
    if let Some(extra) = &args.config {
        if !extra.is_file() {
            bail!("Config file {} does not exist", extra.display());
        }
        files.push(extra.clone());
    }
    let mut config = FleetConfig::load_from_files(&files)?;

    let reconciler = &mut config.reconciler;
    if let Some(level) = &args.log_level {
        reconciler.log_level = level.clone();
    }
    if let Some(database) = &args.database {
        reconciler.database = Some(database.clone());
    }
    if let Some(interval) = args.interval_secs {
        reconciler.interval_secs = interval;
    }
    if let Some(timeout) = args.pass_timeout_secs {
        reconciler.pass_timeout_secs = timeout;
    }
    if let Some(timeout) = args.batch_timeout_secs {
        reconciler.batch_timeout_secs = timeout;
    }
    if let Some(batches) = args.max_concurrent_batches {
        reconciler.max_concurrent_batches = batches;
    }
    if let Some(log_dir) = &args.log_dir {
        reconciler.logging.log_dir = Some(log_dir.clone());
    }
    reconciler.logging.json_logs |= args.json_logs;

    if let Err(errors) = config.validate() {
        bail!("Invalid configuration:\n  {}", errors.join("\n  "));
    }
    Ok(config)
}

fn show_config(default: bool, args: ReconcilerArgs) -> Result<()> {
    if default {
        print!("{}", FleetConfig::generate_default_config());
    } else {
        print!("{}", load_config(&args)?.to_toml()?);
    }
    Ok(())
}

fn database_url(config: &FleetConfig) -> Result<String> {
    if let Some(path) = &config.reconciler.database {
        return Ok(format!("sqlite:{}", path));
    }
    env::var("DATABASE_URL").context("DATABASE_URL must be set or --database must be provided")
}

fn run(args: ReconcilerArgs, once: bool) -> Result<()> {
    let config = load_config(&args)?;
    let _log_guard = logging::init_logging(
        config.reconciler.logging.log_dir.as_deref(),
        &config.reconciler.log_level,
        config.reconciler.logging.json_logs,
    )?;
    let database_url = database_url(&config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        info!(
            "Starting fleetkeeper-server version={}",
            env!("CARGO_PKG_VERSION")
        );
        let store = SqliteHostStore::connect(&database_url).await?;
        let store: Arc<dyn HostStore> = Arc::new(store);

        let providers =
            ProviderRegistry::from_config(&config.providers, &config.reconciler.retry);
        info!("Status clients registered: {:?}", providers.providers());

        if once {
            let mut job = CloudHostReadyJob::new("cloud-host-ready-once", store, providers)
                .with_config(&config.reconciler);
            job.run().await;
            if let Some(e) = job.error() {
                bail!("Reconciliation pass failed: {:#}", e);
            }
            if let Some(report) = job.report() {
                println!("{}", serde_json::to_string_pretty(report)?);
            }
            return Ok(());
        }

        run_interval(store, providers, &config).await;
        Ok(())
    })
}

/// Run passes until interrupted. A failed pass is logged and retried on the next tick.
async fn run_interval(
    store: Arc<dyn HostStore>,
    providers: ProviderRegistry,
    config: &FleetConfig,
) {
    let interval_duration = config.reconciler.interval();
    info!(
        "Starting cloud host reconciliation with interval = {:?}",
        interval_duration
    );

    let mut interval = tokio::time::interval(interval_duration);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut pass: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutting down after {} passes", pass);
                return;
            }
        }

        pass += 1;
        let job_id = format!("cloud-host-ready-{}", pass);
        let mut job = CloudHostReadyJob::new(&job_id, store.clone(), providers.clone())
            .with_config(&config.reconciler);
        job.run().await;

        if let Some(e) = job.error() {
            error!("Pass {} did not complete: {:#}", job_id, e);
        } else if let Some(report) = job.report()
            && report.has_failures()
        {
            warn!(
                "Pass {} left {} batch(es) unresolved",
                job_id, report.batches_failed
            );
        }
    }
}
