//! Prometheus exporter for Colorado DWR streamflow telemetry.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use dwr_exporter::{
    DwrFetcher, ExporterConfig, HttpServer, MetricsRegistry, ReqwestTransport, RetryPolicy,
    RetryingClient, Scraper,
};

/// Prometheus exporter for Colorado DWR streamflow telemetry.
#[derive(Parser, Debug)]
#[command(name = "dwr-exporter")]
#[command(about = "Export Colorado DWR streamflow readings as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    // Override listen address from CLI
    if let Some(listen) = args.listen {
        config.http.listen = listen;
        config.validate()?;
    }

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("dwr_exporter={}", log_level).parse()?)
        .add_directive(format!("hyper={}", Level::WARN).parse()?);

    match config.logging.format {
        dwr_exporter::config::LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        dwr_exporter::config::LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    config.scrape.apply_env_override();

    info!(
        gauges_file = %config.scrape.gauges_file,
        max_workers = config.scrape.max_workers,
        "Starting DWR exporter"
    );

    // Parse listen address
    let listen_addr = config
        .http
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    // One pooled HTTP client shared by every worker across all cycles.
    let transport = ReqwestTransport::new()?;
    let client = RetryingClient::new(
        transport,
        RetryPolicy::default(),
        Duration::from_secs(config.scrape.request_timeout_secs),
    );
    let fetcher = Arc::new(DwrFetcher::new(client, config.scrape.base_url.clone()));

    let scraper = Arc::new(Scraper::new(fetcher, config.scrape.max_workers));
    let registry = Arc::new(MetricsRegistry::new());

    let http_server = HttpServer::new(
        scraper,
        registry,
        PathBuf::from(&config.scrape.gauges_file),
        listen_addr,
        config.http.path.clone(),
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate()
                ).unwrap();
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    // Signal shutdown
    shutdown_tx.send(true)?;

    // Wait for the server to drain
    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    info!("Exporter stopped");
    Ok(())
}
