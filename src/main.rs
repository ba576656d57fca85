use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use token_rotator::{
    Config, RotationEngine, RotationScheduler, scheduler::RetryPolicy, store::MongoTokenStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Token batch rotator
///
/// With a batch number, rotates to that batch once and exits. Without one,
/// runs the fixed-cadence rotation service until interrupted.
#[derive(Parser)]
#[command(name = "rotator", version)]
struct Cli {
    /// Batch to activate once (starts at 1)
    #[arg(value_parser = clap::value_parser!(i64).range(1..))]
    batch: Option<i64>,

    /// Configuration file path
    #[arg(short, long, env = "ROTATOR_CONFIG")]
    config: Option<String>,

    /// Log level, used when RUST_LOG is not set
    #[arg(long, env = "ROTATOR_LOG", default_value = "info")]
    log_level: String,
}

/// The main entry point for the rotator.
///
/// Initializes logging, loads configuration, connects to MongoDB (fatal on
/// failure), then either performs a single rotation or runs the scheduler.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse arguments; clap exits with a usage message on a bad batch number.
    let cli = Cli::parse();

    // Initialize logging. RUST_LOG takes precedence over --log-level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // Load the configuration file (if any) and apply DATABASE_URI on top.
    let config = Config::resolve(cli.config.as_deref()).context("failed to load configuration")?;
    info!("Rotator starting with config: {:?}", config);

    // Connect to MongoDB; failure here is fatal
    let store = MongoTokenStore::connect(&config.database)
        .await
        .context("failed to connect to MongoDB")?;
    // One engine shared by every trigger, so rotations never overlap.
    let engine = Arc::new(RotationEngine::new(Arc::new(store)));

    // A batch argument means one rotation and exit; otherwise run the service.
    match cli.batch {
        Some(batch) => rotate_once(&engine, batch).await,
        None => {
            run_service(engine, &config).await;
            Ok(())
        }
    }
}

/// One-shot mode: any rotation error is fatal and exits nonzero.
async fn rotate_once(engine: &RotationEngine, batch: i64) -> anyhow::Result<()> {
    let report = engine
        .rotate(batch)
        .await
        .with_context(|| format!("transaction failed for batch {}", batch))?;

    info!("Transaction completed successfully");
    // The report goes to stdout so callers can consume it; logs stay on the subscriber.
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Service mode: rotate on a fixed cadence until Ctrl+C or SIGTERM.
async fn run_service(engine: Arc<RotationEngine>, config: &Config) {
    let scheduler = RotationScheduler::new(
        engine,
        &config.rotation,
        RetryPolicy::from(&config.retry),
    );
    let shutdown = CancellationToken::new();

    // Start the scheduler in the background
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { scheduler.run(shutdown).await })
    };

    info!("Rotate service is running... Press Ctrl+C to exit.");
    // Block until Ctrl+C or SIGTERM arrives
    shutdown_signal().await;

    info!("Shutting down...");
    // Stop the loop and wait for any in-flight rotation to finish
    shutdown.cancel();
    if let Err(e) = handle.await {
        error!("Rotation scheduler task failed: {:?}", e);
    }
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A handler that fails to install is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
