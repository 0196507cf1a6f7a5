//! dkvms-kernel — distributed KVM switch kernel entry point.
//!
//! Boots logging, composes the process object service, and parks until a
//! shutdown signal arrives. Dropping the service closes the reconcilers'
//! tick channel, which winds the background tasks down.

use anyhow::Result;
use dkvms_core::process::ProcessService;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let processes = ProcessService::new();
    info!("kernel started");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping");
    drop(processes);

    Ok(())
}
