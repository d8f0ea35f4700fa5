//! fanout-send - Background daemon for scheduled publishing
//!
//! Runs the scheduler until interrupted, releasing each post once its schedule
//! arrives.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use libfanout::logging::{LogFormat, LoggingConfig};
use libfanout::{Config, Database, PlatformRegistry, Publisher, Result, Scheduler};
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "fanout-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled publishing")]
#[command(long_about = "\
fanout-send - Background daemon for scheduled publishing

DESCRIPTION:
    fanout-send ticks at a fixed interval. On every tick it looks for
    unpublished posts whose schedule has arrived and publishes each one to
    all of its platforms. A post that fails on every platform stays in the
    queue and is tried again on the next tick.

    If a tick arrives while the previous one is still publishing, it is
    skipped.

USAGE:
    # Run in foreground (logs to stderr)
    fanout-send

    # Tick every 30 seconds
    fanout-send --interval 30

    # Publish whatever is due right now and exit
    fanout-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current cycle)

CONFIGURATION:
    Configuration file: ~/.config/fanout/config.toml
    Database location: ~/.local/share/fanout/posts.db

    [scheduler]
    interval_secs = 60

    Override with environment variables:
        FANOUT_CONFIG      - Path to config file
        FANOUT_DB_PATH     - Path to database file
        FANOUT_LOG_FORMAT  - text, json or pretty
        FANOUT_LOG_LEVEL   - error, warn, info, debug or trace

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Seconds between ticks (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,

    /// Run a single sweep and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log output format: text, json or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env(cli.verbose);
    if let Some(format) = cli.log_format {
        logging = logging.with_format(format);
    }
    logging.init();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_or_default()?;
    let db = Arc::new(Database::new(&config.database.path).await?);
    let registry = Arc::new(PlatformRegistry::from_config(&config));
    let publisher = Publisher::new(db, registry);

    let interval = Duration::from_secs(cli.interval.unwrap_or(config.scheduler.interval_secs));
    let scheduler = Scheduler::new(publisher, interval);

    info!("fanout-send daemon starting");

    if cli.once {
        let summary = scheduler.sweep(Utc::now()).await?;
        println!(
            "Sweep complete: {} published, {} failed, {} skipped",
            summary.published, summary.failed, summary.skipped
        );
        info!("fanout-send: processed posts once, exiting");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_handler(shutdown_tx);

    scheduler.run(shutdown_rx).await;

    info!("fanout-send daemon stopped");
    Ok(())
}

/// Flip the shutdown channel on SIGINT or SIGTERM
#[cfg(unix)]
fn spawn_signal_handler(shutdown: watch::Sender<bool>) {
    use futures::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            tracing::warn!("Cannot install SIGTERM handler ({}), falling back to Ctrl-C", e);
            spawn_ctrl_c_handler(shutdown);
            return;
        }
    };

    tokio::spawn(async move {
        if let Some(signal) = signals.next().await {
            info!("Received signal {}, stopping gracefully...", signal);
            let _ = shutdown.send(true);
        }
    });
}

#[cfg(not(unix))]
fn spawn_signal_handler(shutdown: watch::Sender<bool>) {
    spawn_ctrl_c_handler(shutdown);
}

fn spawn_ctrl_c_handler(shutdown: watch::Sender<bool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping gracefully...");
            let _ = shutdown.send(true);
        }
    });
}
