//! POSTOR — Autonomous Tender-Marketplace Bidding Agent
//!
//! Entry point. Parses the CLI, loads configuration, initialises
//! structured logging, and either reports credential preflight or runs
//! bidding cycles (one-shot or watch) with graceful shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::{error, info};

use postor::config::{self, AppConfig};
use postor::driver::WebDriverConnector;
use postor::engine::gate::CredentialGate;
use postor::engine::orchestrator::Orchestrator;
use postor::report;
use postor::screening::{ExclusionSet, Screening};

const BANNER: &str = r#"
 ____   ___  ____ _____ ___  ____
|  _ \ / _ \/ ___|_   _/ _ \|  _ \
| |_) | | | \___ \ | || | | | |_) |
|  __/| |_| |___) || || |_| |  _ <
|_|    \___/|____/ |_| \___/|_| \_\

  Procurement Opportunity Search & Tender Offer Robot
  v0.1.0 — Autonomous Agent
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Run one cycle and exit.
    RunOnce,
    /// Run cycles on a fixed interval until interrupted.
    Watch,
}

#[derive(Debug, Parser)]
#[command(name = "postor", version, about = "Automated competitive-tender bidding agent")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "postor.toml")]
    config: PathBuf,

    /// Execution mode.
    #[arg(long, value_enum, default_value_t = Mode::RunOnce)]
    mode: Mode,

    /// Override the watch interval, in minutes.
    #[arg(long)]
    interval: Option<u64>,

    /// Report credential presence per target and exit.
    #[arg(long)]
    preflight: bool,

    /// Override the default log filter (e.g. `debug`).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();

    let mut cfg = AppConfig::load(&cli.config)?;
    if let Some(minutes) = cli.interval {
        cfg.agent.interval_minutes = minutes.max(1);
    }

    init_logging(cli.log_level.as_deref());

    if cli.preflight {
        return preflight(&cfg);
    }

    println!("{BANNER}");
    info!(
        targets = cfg.targets.len(),
        interval_minutes = cfg.agent.interval_minutes,
        mode = ?cli.mode,
        "POSTOR starting up"
    );

    report::ensure_runtime_dirs(&cfg.agent)?;

    let keywords = config::load_keywords(&cfg.agent.keywords_path)?;
    info!(
        count = keywords.len(),
        path = %cfg.agent.keywords_path.display(),
        "Keywords loaded"
    );

    let exclusions = match &cfg.agent.exclusions_path {
        Some(path) => ExclusionSet::load(path),
        None => ExclusionSet::default(),
    };
    let screening = Screening::new(exclusions);

    let factory = Arc::new(WebDriverConnector::new(
        &cfg.agent.webdriver_url,
        Duration::from_secs(cfg.agent.action_timeout_secs),
        cfg.agent.headless,
    )?);

    let interval_minutes = cfg.agent.interval_minutes;
    let mut orchestrator = Orchestrator::new(cfg, keywords, screening, factory);

    match cli.mode {
        Mode::RunOnce => {
            // A completed cycle exits 0 even when individual tasks failed;
            // the journal carries the per-task verdicts.
            orchestrator.run_cycle().await?;
        }
        Mode::Watch => watch_loop(&mut orchestrator, interval_minutes).await,
    }

    info!("POSTOR shut down cleanly.");
    Ok(())
}

/// Run cycles forever on a fixed interval, with graceful Ctrl+C shutdown.
/// The first cycle starts immediately.
async fn watch_loop(orchestrator: &mut Orchestrator, interval_minutes: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_minutes * 60));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(interval_minutes, "Entering watch loop. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = orchestrator.run_cycle().await {
                    error!(error = %e, "Cycle failed; continuing to next");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }
}

/// Report credential presence per enabled target without touching any
/// marketplace, then exit non-zero if anything mandatory is missing.
/// Values are never printed.
fn preflight(cfg: &AppConfig) -> Result<()> {
    report::ensure_runtime_dirs(&cfg.agent)?;

    let requirements = Orchestrator::requirements(cfg);
    let gate_report = CredentialGate::new().evaluate(&requirements);

    println!("Credential preflight:");
    println!("{gate_report}");
    if gate_report.ok() {
        println!("\nall requirements satisfied");
        Ok(())
    } else {
        println!("\nmissing: {}", gate_report.missing_variables().join(", "));
        std::process::exit(1);
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging(level_override: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = match level_override {
        Some(level) => EnvFilter::new(format!("postor={level}")),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("postor=info")),
    };

    let json_logging = std::env::var("POSTOR_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
