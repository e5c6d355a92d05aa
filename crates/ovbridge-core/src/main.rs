//! OVBridge CLI
//!
//! Runs the OneView to PagerDuty bridge, or performs one-off checks against it.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ovbridge::alerting::{AlertProcessor, DedupCache, DeliveryClient, Poller};
use ovbridge::api::{AppState, HttpServer};
use ovbridge::oneview::AlertSource;
use ovbridge::{oneview, telemetry, Config};

/// OVBridge - HPE OneView alerts to PagerDuty
#[derive(Parser)]
#[command(name = "ovbridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "OVBRIDGE_CONFIG")]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API and run the background poller
    Serve {
        /// HTTP port (overrides configuration)
        #[arg(long)]
        port: Option<u16>,

        /// Serve requests only; leave polling to another instance
        #[arg(long)]
        no_poll: bool,
    },

    /// Authenticate against OneView and report the critical alert count
    Check,

    /// Run a single poll pass and exit
    Poll,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Must run before clap so .env can supply OVBRIDGE_CONFIG. A missing .env is fine.
    let _ = dotenvy::dotenv();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    telemetry::init_logging(&config.logging, cli.verbose);

    // Execute command
    let result = match cli.command {
        Commands::Serve { port, no_poll } => run_serve(config, port, no_poll).await,
        Commands::Check => run_check(config).await,
        Commands::Poll => run_poll(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// OneView source (if configured) and the shared processor
fn build_components(config: &Config) -> anyhow::Result<(Option<Arc<AlertSource>>, Arc<AlertProcessor>)> {
    let source = oneview::connect(&config.oneview).context("failed to set up OneView client")?;
    if source.is_some() {
        info!("OneView client initialized");
    } else {
        warn!("OneView credentials not fully configured; polling and manual checks are unavailable");
    }

    let delivery = DeliveryClient::new(&config.pagerduty).context("failed to set up PagerDuty client")?;
    let processor = Arc::new(AlertProcessor::new(
        Arc::new(DedupCache::new()),
        delivery,
        config.pagerduty.routing_key.clone(),
    ));
    if !processor.is_configured() {
        warn!("PAGERDUTY_ROUTING_KEY not set; alerts cannot be delivered");
    }

    Ok((source, processor))
}

async fn run_serve(mut config: Config, port: Option<u16>, no_poll: bool) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }

    let metrics = telemetry::install_metrics_recorder()?;
    let (source, processor) = build_components(&config)?;
    let shutdown = CancellationToken::new();

    let poller = match (&source, config.poller.enabled && !no_poll) {
        (Some(source), true) if processor.is_configured() => {
            let poller = Poller::new(source.clone(), processor.clone(), config.poller.interval())
                .with_ttl(config.poller.dedup_ttl());
            Some(tokio::spawn(poller.run(shutdown.clone())))
        }
        (_, true) => {
            warn!("Polling requested but OneView or PagerDuty is not configured; poller not started");
            None
        }
        (_, false) => {
            info!("Polling disabled for this instance");
            None
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(
        Arc::new(config),
        source,
        processor,
        Some(metrics),
        poller.is_some(),
        shutdown.clone(),
    )?;

    tokio::spawn(shutdown_signal(shutdown.clone()));

    let served = HttpServer::new(state).serve(&addr).await;

    // The server can also stop on its own (bind failure); take the poller down with it
    shutdown.cancel();
    if let Some(handle) = poller {
        if let Err(e) = handle.await {
            error!(error = %e, "Poller task ended abnormally");
        }
    }

    served?;
    info!("Shutdown complete");
    Ok(())
}

async fn run_check(config: Config) -> anyhow::Result<()> {
    let Some(source) = oneview::connect(&config.oneview)? else {
        bail!("OneView is not configured (host, username and password are required)");
    };

    let count = source.test_connection().await?;
    println!("Connected to OneView");
    println!("   Critical alerts: {count}");
    Ok(())
}

async fn run_poll(config: Config) -> anyhow::Result<()> {
    let (source, processor) = build_components(&config)?;
    let Some(source) = source else {
        bail!("OneView is not configured (host, username and password are required)");
    };

    let alerts = source.fetch_critical_alerts().await;
    let report = processor.process_all(&alerts, &CancellationToken::new()).await;

    println!("Poll complete");
    println!("   Found:      {}", report.found);
    println!("   Processed:  {}", report.processed);
    println!("   Duplicates: {}", report.duplicates);
    println!("   Failed:     {}", report.failed);
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("Shutdown signal received");
    token.cancel();
}
