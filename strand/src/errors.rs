///
/// Stream error types.
///
/// Every error that can escape a `Driver` run: failed effects inside a
/// stream, panicking workers, and configuration problems detected before
/// any worker is started.
///

use std::path::PathBuf;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type StreamResult<T> = Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Source failed: {message}")]
    SourceFailure {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Worker {worker} panicked: {message}")]
    WorkerPanicked { worker: usize, message: String },

    #[error("Scheduler exhausted: `{option}` must be greater than zero (got {value})")]
    SchedulerExhausted { option: &'static str, value: usize },

    #[error("Invalid yield rate limit {0}: expected a finite, positive number")]
    InvalidRate(f64),

    #[error("Failed to parse config at {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    /// A failed effect described only by a message.
    pub fn source_failure(message: impl Into<String>) -> Self {
        StreamError::SourceFailure {
            message: message.into(),
            source: None,
        }
    }

    /// A failed effect wrapping the error that caused it.
    pub fn from_source(err: impl Into<BoxError>) -> Self {
        let source = err.into();
        StreamError::SourceFailure {
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn is_source_failure(&self) -> bool {
        matches!(
            self,
            StreamError::SourceFailure { .. } | StreamError::WorkerPanicked { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display_messages() {
        let err = StreamError::source_failure("disk on fire");
        assert_eq!(err.to_string(), "Source failed: disk on fire");
        assert!(err.source().is_none());

        let err = StreamError::WorkerPanicked {
            worker: 3,
            message: "boom".to_string(),
        };
        assert!(err.to_string().contains("Worker 3"));
        assert!(err.to_string().contains("boom"));

        let err = StreamError::SchedulerExhausted {
            option: "max_threads",
            value: 0,
        };
        assert!(err.to_string().contains("max_threads"));
        assert!(err.to_string().contains("got 0"));

        let err = StreamError::InvalidRate(-1.0);
        assert!(err.to_string().contains("-1"));

        let err = StreamError::Config {
            path: PathBuf::from("/tmp/strand.toml"),
            reason: "bad table".to_string(),
        };
        assert!(err.to_string().contains("/tmp/strand.toml"));
        assert!(err.to_string().contains("bad table"));
    }

    #[test]
    fn test_from_source_keeps_cause() {
        let io = std::io::Error::other("pipe closed");
        let err = StreamError::from_source(io);
        assert_eq!(err.to_string(), "Source failed: pipe closed");
        assert!(err.source().is_some());
        assert!(err.is_source_failure());
    }

    #[test]
    fn test_config_errors_are_not_source_failures() {
        let err = StreamError::SchedulerExhausted {
            option: "max_buffer",
            value: 0,
        };
        assert!(!err.is_source_failure());
    }
}
