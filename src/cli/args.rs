//! Command-line argument definitions.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mongotap_core::{SnifferConfig, Verbosity, DEFAULT_PORT};

/// Reconstruct MongoDB statements from a packet capture as slow-query-log entries.
#[derive(Parser, Debug)]
#[command(name = "mongotap")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// PCAP or PCAPNG file to replay (gzip/zstd compressed files are detected)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// MongoDB server port to filter on
    #[arg(short = 'p', long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Seconds a request may wait for its reply before it is reported as timed out
    #[arg(long = "retention", value_name = "SECS", default_value_t = 60)]
    pub retention: u64,

    /// Minimum capture time between retention sweeps, in seconds
    #[arg(
        long = "sweep-interval",
        value_name = "SECS",
        default_value_t = 1.0,
        value_parser = parse_seconds
    )]
    pub sweep_interval: f64,

    /// Maximum number of requests awaiting a reply
    #[arg(long = "max-pending", value_name = "N", default_value_t = 65_536)]
    pub max_pending: usize,

    /// Write records to this file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "OUTPUT_FILE")]
    pub output: Option<PathBuf>,

    /// Only write records; suppress diagnostics
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable verbose output (-vv logs every decoded frame)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn verbosity(&self) -> Verbosity {
        match (self.quiet, self.verbose) {
            (true, _) => Verbosity::Quiet,
            (false, 0 | 1) => Verbosity::Normal,
            (false, _) => Verbosity::Diagnostic,
        }
    }

    /// Default log filter, used when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    pub fn sniffer_config(&self) -> SnifferConfig {
        SnifferConfig::default()
            .with_verbosity(self.verbosity())
            .with_retention(Duration::from_secs(self.retention))
            .with_sweep_interval(Duration::from_secs_f64(self.sweep_interval))
            .with_max_pending(self.max_pending)
    }
}

fn parse_seconds(s: &str) -> Result<f64, String> {
    let secs: f64 = s.parse().map_err(|_| format!("`{s}` is not a number of seconds"))?;
    if !secs.is_finite() || secs < 0.0 || secs > 86_400.0 {
        return Err(format!("`{s}` must be between 0 and 86400 seconds"));
    }
    Ok(secs)
}
