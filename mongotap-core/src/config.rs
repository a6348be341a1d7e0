//! Pipeline configuration.

use std::time::Duration;

/// Default MongoDB server port used to filter captured traffic.
pub const DEFAULT_PORT: u16 = 27017;

/// How much the pipeline reports besides log records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Records only; diagnostics are counted but not logged
    Quiet,
    /// Diagnostics and pass-through events are logged
    #[default]
    Normal,
    /// Also log every decoded frame
    Diagnostic,
}

/// Configuration consumed by [`Sniffer`](crate::Sniffer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnifferConfig {
    pub verbosity: Verbosity,
    /// Age after which an unanswered request is reported as timed out
    pub retention: Duration,
    /// Minimum capture time between two retention sweeps
    pub sweep_interval: Duration,
    /// Hard cap on pending requests; the oldest is evicted beyond it
    pub max_pending: usize,
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Normal,
            retention: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(1),
            max_pending: 65_536,
        }
    }
}

impl SnifferConfig {
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// A cap of zero is treated as one.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SnifferConfig::default();
        assert_eq!(config.verbosity, Verbosity::Normal);
        assert_eq!(config.retention, Duration::from_secs(60));
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.max_pending, 65_536);
    }

    #[test]
    fn test_verbosity_ordering() {
        assert!(Verbosity::Quiet < Verbosity::Normal);
        assert!(Verbosity::Normal < Verbosity::Diagnostic);
    }

    #[test]
    fn test_max_pending_floor() {
        assert_eq!(SnifferConfig::default().with_max_pending(0).max_pending, 1);
    }
}
