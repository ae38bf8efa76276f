//!
//! Evaluation context handed to every opened stream.
//!
//! Carries the validated configuration and the statistics sink. Cloning is
//! cheap; workers receive their own clone so that nested concurrent regions
//! opened on a worker thread share the same limits and counters.
//!

use std::sync::Arc;

use crate::config::StreamConfig;
use crate::stats::SchedulerStats;

#[derive(Debug, Clone)]
pub struct Runtime {
    config: Arc<StreamConfig>,
    stats: Arc<SchedulerStats>,
}

impl Runtime {
    /// `config` must already be validated.
    pub(crate) fn new(config: StreamConfig) -> Self {
        Self {
            config: Arc::new(config),
            stats: Arc::new(SchedulerStats::new()),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<SchedulerStats> {
        &self.stats
    }
}
