///
/// # Scheduler Configuration
///
/// Knobs recognised by the concurrent execution styles. Serial and
/// Interleaved evaluation never read them, but a `Driver` always validates
/// the full configuration up front so that a bad value is reported before
/// any work starts rather than at the first concurrent boundary.
///
/// ## Example strand.toml
///
/// ```toml
/// [stream]
/// max_threads = 8
/// max_buffer = 64
/// min_workers = 1
/// yield_rate_limit = 1000.0
/// ```
///
/// Every field is optional; missing fields take the defaults below.
///

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::errors::{StreamError, StreamResult};

pub const DEFAULT_MAX_BUFFER: usize = 256;
pub const DEFAULT_MIN_WORKERS: usize = 1;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Upper bound on simultaneously live workers per concurrent region.
    pub max_threads: usize,
    /// Capacity of the shared channel (and of the pending-source queue).
    pub max_buffer: usize,
    /// Initial worker budget for the Async style.
    pub min_workers: usize,
    /// Optional cap on published elements per second, per region.
    pub yield_rate_limit: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    stream: StreamConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_threads: default_max_threads(),
            max_buffer: DEFAULT_MAX_BUFFER,
            min_workers: DEFAULT_MIN_WORKERS,
            yield_rate_limit: None,
        }
    }
}

fn default_max_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl StreamConfig {
    pub fn from_toml_str(content: &str) -> StreamResult<Self> {
        Self::parse(content, Path::new("<inline>"))
    }

    pub fn from_file(path: &Path) -> StreamResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> StreamResult<Self> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| StreamError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        file.stream.validate()?;
        Ok(file.stream)
    }

    pub fn validate(&self) -> StreamResult<()> {
        for (option, value) in [
            ("max_threads", self.max_threads),
            ("max_buffer", self.max_buffer),
            ("min_workers", self.min_workers),
        ] {
            if value == 0 {
                return Err(StreamError::SchedulerExhausted { option, value });
            }
        }

        if let Some(rate) = self.yield_rate_limit {
            let representable = Duration::try_from_secs_f64(1.0 / rate).is_ok();
            if !rate.is_finite() || rate <= 0.0 || !representable {
                return Err(StreamError::InvalidRate(rate));
            }
        }

        Ok(())
    }

    /// Async starts with this many workers; clamped to the thread cap.
    pub fn initial_budget(&self) -> usize {
        self.min_workers.min(self.max_threads)
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    pub fn with_min_workers(mut self, min_workers: usize) -> Self {
        self.min_workers = min_workers;
        self
    }

    pub fn with_yield_rate_limit(mut self, rate: f64) -> Self {
        self.yield_rate_limit = Some(rate);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StreamConfig::default();
        assert!(config.max_threads > 0);
        assert_eq!(config.max_buffer, DEFAULT_MAX_BUFFER);
        assert_eq!(config.min_workers, 1);
        assert!(config.yield_rate_limit.is_none());
        config.validate().expect("default config should validate");
    }

    #[test]
    fn test_zero_values_rejected() {
        let err = StreamConfig::default().with_max_threads(0).validate().unwrap_err();
        assert!(matches!(
            err,
            StreamError::SchedulerExhausted { option: "max_threads", value: 0 }
        ));

        let err = StreamConfig::default().with_max_buffer(0).validate().unwrap_err();
        assert!(matches!(
            err,
            StreamError::SchedulerExhausted { option: "max_buffer", .. }
        ));

        let err = StreamConfig::default().with_min_workers(0).validate().unwrap_err();
        assert!(matches!(
            err,
            StreamError::SchedulerExhausted { option: "min_workers", .. }
        ));
    }

    #[test]
    fn test_rate_must_be_positive() {
        let err = StreamConfig::default()
            .with_yield_rate_limit(0.0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, StreamError::InvalidRate(_)));

        let err = StreamConfig::default()
            .with_yield_rate_limit(f64::NAN)
            .validate()
            .unwrap_err();
        assert!(matches!(err, StreamError::InvalidRate(_)));
    }

    #[test]
    fn test_parse_partial_table() {
        let config = StreamConfig::from_toml_str(
            r#"
[stream]
max_threads = 3
yield_rate_limit = 50.0
"#,
        )
        .expect("config should parse");

        assert_eq!(config.max_threads, 3);
        assert_eq!(config.max_buffer, DEFAULT_MAX_BUFFER);
        assert_eq!(config.yield_rate_limit, Some(50.0));
    }

    #[test]
    fn test_parse_missing_table_uses_defaults() {
        let config = StreamConfig::from_toml_str("").expect("empty config should parse");
        assert_eq!(config, StreamConfig::default());
    }

    #[test]
    fn test_parse_rejects_zero_buffer() {
        let err = StreamConfig::from_toml_str("[stream]\nmax_buffer = 0\n").unwrap_err();
        assert!(matches!(err, StreamError::SchedulerExhausted { .. }));
    }

    #[test]
    fn test_parse_reports_syntax_errors() {
        let err = StreamConfig::from_toml_str("[stream\nmax_threads = ").unwrap_err();
        assert!(matches!(err, StreamError::Config { .. }));
    }

    #[test]
    fn test_rate_too_small_for_an_interval_rejected() {
        let err = StreamConfig::default()
            .with_yield_rate_limit(1e-30)
            .validate()
            .unwrap_err();
        assert!(matches!(err, StreamError::InvalidRate(rate) if rate == 1e-30));

        assert!(StreamConfig::default().with_yield_rate_limit(1e-3).validate().is_ok());
    }

    #[test]
    fn test_initial_budget_clamped() {
        let config = StreamConfig::default()
            .with_max_threads(2)
            .with_min_workers(5);
        assert_eq!(config.initial_budget(), 2);
    }
}
