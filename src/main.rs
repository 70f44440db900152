//! # CSI Telemetry Node
//!
//! Runs the telemetry supervisor on a host, feeding it synthetic CSI samples
//! and shipping them to the configured collection service.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use csi_telemetry::config::{Config, LoggingConfig, TomlFileStore};
use csi_telemetry::http::{HttpChannel, ReqwestTransport};
use csi_telemetry::sim::{HostProbe, LoggingRestart, SimulatedCollector, StaticUpdateTrigger};
use csi_telemetry::stream::{StreamChannel, WsConnector};
use csi_telemetry::supervisor::{sample_queue, Clock, Collaborators, Supervisor, SystemClock};

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/node.toml";

/// Log file name prefix inside `logging.log_dir`
const LOG_FILE_NAME: &str = "csi-telemetry.log";

/// Filter applied when `RUST_LOG` is unset
const DEFAULT_LOG_FILTER: &str = "info";

/// Install the tracing subscriber
///
/// Logs always go to stdout. With `log_dir` set they are also written to a
/// daily rolling file; the returned guard must live until exit so buffered
/// lines are flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

fn config_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn load_config(path: &Path) -> Result<(Config, Vec<String>)> {
    let (config, problems) = Config::load_lenient(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    Ok((config, problems.iter().map(ToString::to_string).collect()))
}

/// Main entry point for the telemetry node
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration; an invalid channel section disables that channel
///    - Set up logging
///    - Build the enabled channels and the supervisor
///
/// 2. **Main Loop**
///    - The simulated collector fills the sample queue
///    - The supervisor ticks until Ctrl+C or a restart request
///
/// 3. **Graceful Shutdown**
///    - Stop the collector
///    - Stop the supervisor, which closes both channels
#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path();
    let (config, problems) = load_config(&path)?;

    let _log_guard = init_logging(&config.logging);

    info!("CSI Telemetry v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from {}", path.display());
    for problem in &problems {
        warn!("Configuration problem: {}", problem);
    }

    let device_id = config.device.device_id.clone();

    let http = if config.http.enabled {
        let transport = Arc::new(ReqwestTransport::new()?);
        Some(HttpChannel::new(config.http.clone(), device_id.clone(), transport))
    } else {
        None
    };

    let stream = if config.stream.enabled {
        Some(StreamChannel::new(config.stream.clone(), &device_id, Arc::new(WsConnector))?)
    } else {
        None
    };

    if http.is_none() && stream.is_none() {
        warn!("No channel enabled; samples will be dropped");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (sender, queue) = sample_queue(config.supervisor.sample_queue_capacity);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let collector = SimulatedCollector::new(sender, config.supervisor.stream_rate_hz)
        .spawn(clock.clone(), shutdown_rx.clone());

    let collaborators = Collaborators {
        collector: Box::new(queue),
        clock,
        probe: Arc::new(HostProbe::default()),
        restart: Arc::new(LoggingRestart::new(shutdown_tx.clone())),
        update: Some(Arc::new(StaticUpdateTrigger)),
        config_store: Some(Arc::new(TomlFileStore::new(path.clone()))),
    };

    let mut supervisor = Supervisor::new(config, http, stream, collaborators);
    supervisor.start().context("Failed to start supervisor")?;

    info!("Press Ctrl+C to exit");

    tokio::select! {
        _ = supervisor.run(shutdown_rx) => {
            info!("Supervisor loop ended ({})", supervisor.state());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    shutdown_tx.send_replace(true);
    supervisor.stop().await;
    if let Err(e) = collector.await {
        error!("Collector task failed: {}", e);
    }

    let stats = supervisor.stats();
    info!(
        ticks = stats.ticks,
        processed = stats.samples_processed,
        streamed = stats.samples_streamed,
        dropped = stats.samples_dropped,
        "Total samples handled"
    );

    Ok(())
}
