//! mongotap - reconstruct MongoDB statements from captured wire traffic.
//!
//! The decoding pipeline lives in [`mongotap_core`]; this crate adds the
//! command-line front end.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//!
//! use clap::Parser;
//! use mongotap::cli::{self, Args};
//!
//! let args = Args::parse_from(["mongotap", "capture.pcap", "-o", "slow.log"]);
//! let stats = cli::run(&args, &AtomicBool::new(false)).unwrap();
//! println!("{} records written", stats.records);
//! ```

pub mod cli;
