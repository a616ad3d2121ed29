// Shadowcast Concentrator - sensor broadcast concentrator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Shadowcast Concentrator
//!
//! Receives sensor advertisements, folds them into the shadow and
//! republishes it. Also ships a beacon simulator to feed it.
//!
//! ## Usage
//!
//! ```bash
//! # Run the concentrator, notifying a subscriber on every update
//! shadowcast-concentrator run --notify 127.0.0.1:47200
//!
//! # Run from a config file on a custom HTTP port
//! shadowcast-concentrator run --config concentrator.toml --port 9090
//!
//! # Simulate a light sensor
//! shadowcast-concentrator beacon --target 127.0.0.1:47100 --interval-secs 10
//! ```

mod beacon;
mod config;
mod metrics;
mod publish;
mod transport;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use beacon::{Beacon, DEFAULT_REPEATS};
use clap::{Args, Parser, Subcommand};
use config::{ConcentratorConfig, ConfigError};
use metrics::{encode_metrics, update_pipeline_metrics, update_shadow_metrics};
use publish::{forward_notifications, ShadowHandle, SubscriberPublisher};
use serde::Serialize;
use shadowcast::{
    Encoder, MetricsSnapshot, Pipeline, PipelineMetrics, SenderId, ShadowState, ShadowcastError,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;
use transport::{Scanner, TransportError, UdpAdvertiser};

/// Shadowcast sensor concentrator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Receive broadcasts and publish the shadow
    Run(RunArgs),
    /// Simulate a light sensor beacon
    Beacon(BeaconArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UDP address receiving broadcasts
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// HTTP port for metrics and status
    #[arg(short, long)]
    port: Option<u16>,

    /// Subscriber address for shadow notifications
    #[arg(short, long)]
    notify: Option<SocketAddr>,

    /// Ingestion queue capacity
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Forward repeated readings instead of filtering them
    #[arg(long)]
    no_dedup: bool,
}

#[derive(Args, Debug)]
struct BeaconArgs {
    /// Concentrator address
    #[arg(short, long, default_value = "127.0.0.1:47100")]
    target: SocketAddr,

    /// Seconds between readings
    #[arg(short, long, default_value_t = 10)]
    interval_secs: u64,

    /// Advertisements per reading
    #[arg(short, long, default_value_t = DEFAULT_REPEATS)]
    repeats: u32,

    /// Beacon address, e.g. "C0:FF:EE:00:00:01 (random)"
    #[arg(short, long, default_value = "C0:FF:EE:00:00:01 (random)")]
    address: SenderId,
}

/// Fatal startup errors.
#[derive(Error, Debug)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Pipeline(#[from] ShadowcastError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state shared across handlers.
struct AppState {
    metrics: Arc<PipelineMetrics>,
    shadow: ShadowHandle,
    scanning: Arc<AtomicBool>,
    start_time: std::time::Instant,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match cli.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Shadowcast Concentrator v{}", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Command::Run(args) => run_concentrator(args).await,
        Command::Beacon(args) => run_beacon(args).await,
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

/// Build the effective configuration: file, then flags.
fn load_config(args: &RunArgs) -> Result<ConcentratorConfig, ConfigError> {
    let mut config = match args.config {
        Some(ref path) => {
            info!("Loading configuration from {}", path.display());
            ConcentratorConfig::load(path)?
        }
        None => ConcentratorConfig::default(),
    };

    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(port) = args.port {
        config.http_port = port;
    }
    if args.notify.is_some() {
        config.notify = args.notify;
    }
    if let Some(capacity) = args.queue_capacity {
        config.pipeline.queue_capacity = capacity;
    }
    if args.no_dedup {
        config.pipeline.duplicate_filter = false;
    }

    config.validate()?;
    Ok(config)
}

async fn run_concentrator(args: RunArgs) -> Result<(), AppError> {
    let config = load_config(&args)?;

    let (publisher, shadow) = SubscriberPublisher::new(64);
    if let Some(target) = config.notify {
        let bind: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind).await?;
        tokio::spawn(forward_notifications(shadow.subscribe(), socket, target));
    } else {
        info!("No notify target, shadow updates are only served over HTTP");
    }

    let pipeline = Pipeline::new(config.pipeline_config(), publisher)?;
    let pipeline_metrics = pipeline.metrics();
    let (mut ingestor, aggregator) = pipeline.spawn()?;

    let scanning = Arc::new(AtomicBool::new(true));
    let mut scanner = Scanner::bind(config.listen, config.company_id, Arc::clone(&scanning))?;
    let scanner_thread = std::thread::Builder::new()
        .name("ble-scanner".to_string())
        .spawn(move || {
            // The ingestor drops with this thread, which stops the aggregator.
            scanner.run(&mut ingestor)
        })?;

    let state = Arc::new(AppState {
        metrics: pipeline_metrics,
        shadow,
        scanning: Arc::clone(&scanning),
        start_time: std::time::Instant::now(),
    });

    // Build router
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .route("/shadow", get(shadow_handler))
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    info!("Starting server on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);

    let listener = TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Shutting down");
    scanning.store(false, Ordering::SeqCst);

    let joined = tokio::task::spawn_blocking(move || {
        let scan = scanner_thread.join();
        let aggregated = aggregator.join();
        (scan, aggregated)
    })
    .await;

    match joined {
        Ok((Ok(Ok(stats)), Ok(aggregator))) => {
            info!(
                "Scanner delivered {} advertisements ({} foreign, {} malformed), final shadow: {}",
                stats.delivered,
                stats.foreign,
                stats.malformed,
                aggregator.snapshot()
            );
            if let Some(last) = aggregator.last_packet() {
                info!(
                    "Last reading from {} (t={}s), received at {:?} ms",
                    last.sender, last.reading.timestamp, last.received_at
                );
            }
        }
        Ok((Ok(Err(e)), _)) => error!("Scanner failed: {}", e),
        _ => error!("Pipeline thread panicked"),
    }

    served.map_err(AppError::from)
}

async fn run_beacon(args: BeaconArgs) -> Result<(), AppError> {
    let advertiser = UdpAdvertiser::new(args.target, args.address)?;
    info!(
        "Beacon {} advertising to {}",
        advertiser.sender(),
        args.target
    );

    let beacon = Beacon::new(advertiser, Encoder::new(), args.repeats);
    let interval = Duration::from_secs(args.interval_secs.max(1));

    tokio::select! {
        _ = beacon.run(interval) => {}
        _ = shutdown_signal() => info!("Beacon stopped"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Root handler - shows a simple HTML page.
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Shadowcast Concentrator</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
        h1 { color: #2c3e50; }
        a { color: #3498db; text-decoration: none; }
        .endpoints { background: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0; }
        .endpoint { margin: 10px 0; }
    </style>
</head>
<body>
    <h1>Shadowcast Concentrator</h1>
    <p>Consolidated shadow of the sensor beacons in range.</p>

    <div class="endpoints">
        <h2>Endpoints</h2>
        <div class="endpoint"><a href="/shadow">/shadow</a> - Current shadow (JSON)</div>
        <div class="endpoint"><a href="/metrics">/metrics</a> - Prometheus metrics</div>
        <div class="endpoint"><a href="/health">/health</a> - Health check</div>
        <div class="endpoint"><a href="/ready">/ready</a> - Readiness check</div>
        <div class="endpoint"><a href="/status">/status</a> - Status information (JSON)</div>
    </div>
</body>
</html>"#,
    )
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_pipeline_metrics(&state.metrics.snapshot());
    update_shadow_metrics(&state.shadow.current(), state.shadow.subscriber_count());

    let metrics = encode_metrics();
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler.
async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.scanning.load(Ordering::SeqCst) {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not scanning")
    }
}

/// Status information response.
#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_secs: u64,
    subscribers: usize,
    pipeline: MetricsSnapshot,
    loss_ratio: f64,
    duplicate_ratio: f64,
}

/// Status handler - returns JSON status information.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let pipeline = state.metrics.snapshot();
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        subscribers: state.shadow.subscriber_count(),
        loss_ratio: pipeline.loss_ratio(),
        duplicate_ratio: pipeline.duplicate_ratio(),
        pipeline,
    })
}

/// Shadow handler - returns the latest published snapshot.
async fn shadow_handler(State(state): State<Arc<AppState>>) -> Json<ShadowState> {
    Json(state.shadow.current())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["shadowcast-concentrator", "run"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Run(args) => args,
            Command::Beacon(_) => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_defaults() {
        let config = load_config(&run_args(&[])).unwrap();
        assert_eq!(config, ConcentratorConfig::default());
    }

    #[test]
    fn test_cli_overrides() {
        let config = load_config(&run_args(&[
            "--listen",
            "127.0.0.1:4000",
            "--notify",
            "127.0.0.1:4001",
            "--queue-capacity",
            "16",
            "--no-dedup",
        ]))
        .unwrap();

        assert_eq!(config.listen.port(), 4000);
        assert_eq!(config.notify.map(|a| a.port()), Some(4001));
        assert_eq!(config.pipeline.queue_capacity, 16);
        assert!(!config.pipeline.duplicate_filter);
    }

    #[test]
    fn test_cli_override_validated() {
        let result = load_config(&run_args(&["--queue-capacity", "0"]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_beacon_args() {
        let cli = Cli::parse_from([
            "shadowcast-concentrator",
            "beacon",
            "--address",
            "00:11:22:33:44:55",
        ]);
        match cli.command {
            Command::Beacon(args) => {
                assert_eq!(args.address, SenderId::public([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]));
                assert_eq!(args.interval_secs, 10);
                assert_eq!(args.repeats, DEFAULT_REPEATS);
            }
            Command::Run(_) => panic!("expected beacon"),
        }
    }
}
