use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use tokio::sync::watch;

use unitflow::config::WorkerConfig;
use unitflow::db::{DbProvider, SqliteProvider};
use unitflow::observability::init_logging;
use unitflow::registry::UnitRegistry;
use unitflow::scheduler::{Scheduler, WorkerService};
use unitflow::services::Services;

#[derive(Parser)]
#[command(
    name = "unitflow",
    version,
    about = "Scheduled batch engine running composable unit pipelines"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "unitflow.toml")]
    config: PathBuf,

    /// Job file to run instead of `scheduler.jobs_path`
    #[arg(long)]
    jobs: Option<PathBuf>,

    /// Run a single batch and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = WorkerConfig::load_from_file(&cli.config)
        .with_context(|| format!("cannot load configuration {}", cli.config.display()))?;
    init_logging(&config);

    let provider = SqliteProvider;
    provider
        .open(&config.database)
        .with_context(|| format!("cannot open {} database", config.database.kind))?;
    tracing::info!(
        kind = %config.database.kind,
        interval_secs = config.scheduler.interval_secs,
        "Database reachable"
    );

    let services = Services::from_config(&config).context("cannot build services")?;
    let interval = config.scheduler.interval();
    let mut service = WorkerService::new(
        config,
        Box::new(provider),
        UnitRegistry::with_builtin_units(),
        services,
    );
    if let Some(jobs) = cli.jobs {
        service = service.with_jobs_path(jobs);
    }
    let mut scheduler = Scheduler::new(service, interval);

    if cli.once {
        let report = scheduler.tick().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl-C, running until killed");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown requested, waiting for the current batch");
        let _ = shutdown_tx.send(true);
    });

    scheduler.run(shutdown_rx).await;
    Ok(())
}
