//! Capture replay driver.

use std::fs::File;
use std::io::{self, BufWriter};
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use mongotap_core::{PcapFrameSource, Sniffer, SnifferStats};
use tracing::info;

use super::Args;

/// Replay `args.file` through the pipeline until it ends or `stop` is set.
///
/// Blocks the calling thread.
pub fn run(args: &Args, stop: &AtomicBool) -> Result<SnifferStats> {
    let source = PcapFrameSource::open(&args.file, args.port)
        .with_context(|| format!("Failed to open capture file: {}", args.file.display()))?;
    let config = args.sniffer_config();
    info!(
        file = %args.file.display(),
        port = args.port,
        retention_s = args.retention,
        "Replaying capture"
    );

    let stats = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            Sniffer::new(config, BufWriter::new(file)).run(source, stop)?
        }
        None => Sniffer::new(config, io::stdout().lock()).run(source, stop)?,
    };
    Ok(stats)
}
