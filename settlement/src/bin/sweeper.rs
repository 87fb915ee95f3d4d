//! Settlement Sweeper Binary
//!
//! Releases held vendor funds on the configured schedule.
//!
//! ```text
//! settlement-sweeper            # run until Ctrl-C
//! settlement-sweeper --once     # single sweep, JSON report on stdout
//! settlement-sweeper --metrics  # also print ledger metrics on exit
//! ```

use settlement::{Config, FinanceService};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting settlement sweeper");

    // Load configuration
    let config = if let Ok(config_path) = std::env::var("SETTLEMENT_CONFIG") {
        info!("Loading config from: {}", config_path);
        Config::from_file(&config_path)?
    } else {
        info!("Loading config from environment variables");
        Config::from_env()?
    };

    info!("Opening ledger at: {:?}", config.ledger.data_dir);
    let service = FinanceService::open(config).await?;

    let print_metrics = std::env::args().any(|arg| arg == "--metrics");

    if std::env::args().any(|arg| arg == "--once") {
        let report = service.engine.sweep().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        if print_metrics {
            print!("{}", service.ledger.metrics().export()?);
        }
        service.shutdown().await?;
        return Ok(());
    }

    let scheduler = Arc::new(service.scheduler());
    info!(
        next_window = %scheduler.get_next_window_time()?.to_rfc3339(),
        "Sweep scheduler armed"
    );

    let runner = tokio::spawn(scheduler.clone().start());

    // Wait for shutdown signal
    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    scheduler.shutdown();
    match runner.await {
        Ok(Err(e)) => error!("Scheduler stopped with error: {}", e),
        Err(e) => error!("Scheduler task panicked: {}", e),
        Ok(Ok(())) => {}
    }

    if print_metrics {
        print!("{}", service.ledger.metrics().export()?);
    }

    service.shutdown().await?;
    info!("Settlement sweeper stopped");
    Ok(())
}
