//! SharpMonitor - Main Entry Point
//!
//! Loads configuration, builds the selected pipelines and runs them under the
//! supervisor until Ctrl-C.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sharp_monitor::common::channels::create_shutdown;
use sharp_monitor::common::traits::{BalanceOracle, HistorySource, LedgerSource, MessageSink};
use sharp_monitor::{
    AppConfig, BalanceJob, CoinGeckoPriceFeed, ConfiguredOracle, DiscordChannelHistory, DispatchClient,
    EmptyCheckJob, Job, LedgerJob, SessionDirectory, SignalJob, Supervisor,
    SupervisorSettings, WebhookSink,
};

const ALL_JOBS: [&str; 4] = ["signal", "balance", "ledger", "empty-check"];

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "SHARP_MONITOR_CONFIG")]
    config: String,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Comma-separated pipelines to run
    #[arg(long, default_value = "signal,balance,ledger,empty-check")]
    jobs: String,
}

fn init_logging(filter: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);
    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn selected_jobs(list: &str) -> Result<Vec<String>> {
    let mut jobs = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !ALL_JOBS.contains(&name) {
            bail!("unknown job '{}', expected one of {}", name, ALL_JOBS.join(", "));
        }
        if !jobs.iter().any(|j| j == name) {
            jobs.push(name.to_string());
        }
    }
    Ok(jobs)
}

fn oracle(config: &Arc<AppConfig>) -> Arc<dyn BalanceOracle> {
    Arc::new(ConfiguredOracle::new(config.clone()))
}

fn build_job(name: &str, config: &Arc<AppConfig>, client: &DispatchClient) -> Result<Arc<dyn Job>> {
    let job: Arc<dyn Job> = match name {
        "signal" => {
            let history: Arc<dyn HistorySource> = Arc::new(DiscordChannelHistory::new(
                &config.discord.api_url,
                config.discord.bot_token.as_deref().unwrap_or_default(),
            )?);
            Arc::new(SignalJob::new(config.clone(), client.clone(), history))
        }
        "balance" => {
            let mut job = BalanceJob::new(config.clone(), client.clone(), oracle(config));
            match CoinGeckoPriceFeed::new(&config.oracle.price_url) {
                Ok(feed) => job = job.with_price_feed(Arc::new(feed)),
                Err(err) => warn!(error = %err, "Price feed disabled"),
            }
            Arc::new(job)
        }
        "ledger" => {
            let source: Arc<dyn LedgerSource> =
                Arc::new(SessionDirectory::new(config.analyser.sessions_dir.clone()));
            Arc::new(LedgerJob::new(config.clone(), client.clone(), source))
        }
        "empty-check" => Arc::new(EmptyCheckJob::new(config.clone(), client.clone(), oracle(config))),
        other => bail!("unknown job '{}'", other),
    };
    Ok(job)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = sharp_monitor::config::load_config(Some(args.config.as_str()))
        .context("failed to load configuration")?;
    let filter = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.settings.log_level.clone());
    init_logging(&filter, args.log_json)?;

    info!("Starting SharpMonitor");
    info!("Configuration file: {}", args.config);

    let config = Arc::new(config);
    let sink: Arc<dyn MessageSink> = Arc::new(WebhookSink::new()?);
    let client = DispatchClient::from_config(sink, &config.dispatch);

    let mut supervisor = Supervisor::new(SupervisorSettings::from(&config.supervisor));
    for name in selected_jobs(&args.jobs)? {
        // configuration is checked in each job's startup, under supervision
        match build_job(&name, &config, &client) {
            Ok(job) => supervisor.add_job(job),
            Err(err) => error!(job = %name, error = %err, "Job could not be built"),
        }
    }
    if supervisor.job_count() == 0 {
        warn!("No jobs registered, waiting for shutdown");
    }

    let (shutdown_tx, shutdown_rx) = create_shutdown();
    let board = supervisor.status_board();
    let running = tokio::spawn(supervisor.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, cleaning up...");
    shutdown_tx.send(true).ok();
    running.await?;

    for status in board.snapshot() {
        info!(job = %status.name, restarts = status.restarts, "Final job status");
    }
    Ok(())
}
