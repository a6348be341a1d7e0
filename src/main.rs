//! mongotap CLI entry point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mongotap::cli::{self, Args};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Diagnostics go to stderr; stdout carries the slow log
    let filter = args.log_filter();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupted, finishing current frame");
                    stop.store(true, Ordering::Relaxed);
                }
                Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C"),
            }
        });
    }

    let stats = tokio::task::spawn_blocking(move || cli::run(&args, &stop))
        .await
        .context("Capture task failed")??;

    if stats.decode_errors() > 0 {
        warn!(count = stats.decode_errors(), "Some frames could not be decoded");
    }
    Ok(())
}
