//!
//! Driver: the consumer loop
//!
//! Opens a stream and pulls steps until it stops, feeding each element to a
//! fold. The fold may end the run early by returning `ControlFlow::Break`;
//! the driver then cancels the stream instead of simply abandoning it, so
//! every worker beneath it is halted and joined before the call returns.
//!
//! Errors are returned as soon as they are observed. Elements folded before
//! the error stay folded.
//!

use std::ops::ControlFlow;

use tracing::debug;

use crate::config::StreamConfig;
use crate::errors::StreamResult;
use crate::runtime::Runtime;
use crate::stats::StatsSnapshot;
use crate::step::Step;
use crate::stream::Stream;

#[derive(Debug, Clone)]
pub struct Driver {
    rt: Runtime,
}

impl Default for Driver {
    fn default() -> Self {
        Self {
            rt: Runtime::new(StreamConfig::default()),
        }
    }
}

impl Driver {
    pub fn new(config: StreamConfig) -> StreamResult<Self> {
        config.validate()?;
        Ok(Self {
            rt: Runtime::new(config),
        })
    }

    pub fn config(&self) -> &StreamConfig {
        self.rt.config()
    }

    /// Scheduler counters accumulated over every run of this driver.
    pub fn stats(&self) -> StatsSnapshot {
        self.rt.stats().snapshot()
    }

    /// The general consumer loop; every other entry point goes through it.
    pub fn fold_until<T, A, F>(&self, stream: &Stream<T>, init: A, mut f: F) -> StreamResult<A>
    where
        T: Send + 'static,
        F: FnMut(A, T) -> StreamResult<ControlFlow<A, A>>,
    {
        let mut cursor = stream.open(&self.rt);
        let mut acc = init;
        let mut pulled = 0usize;

        loop {
            let step = match cursor.step() {
                Ok(step) => step,
                Err(err) => {
                    cursor.cancel();
                    return Err(err);
                }
            };

            match step {
                Step::Yield(item, ()) => {
                    pulled += 1;
                    match f(acc, item) {
                        Ok(ControlFlow::Continue(next)) => acc = next,
                        Ok(ControlFlow::Break(done)) => {
                            debug!(pulled, "fold stopped early; cancelling stream");
                            cursor.cancel();
                            return Ok(done);
                        }
                        Err(err) => {
                            cursor.cancel();
                            return Err(err);
                        }
                    }
                }
                Step::Skip(()) => {}
                Step::Stop => return Ok(acc),
            }
        }
    }

    /// Fold with an effectful step function.
    pub fn fold_m<T, A, F>(&self, stream: &Stream<T>, init: A, mut f: F) -> StreamResult<A>
    where
        T: Send + 'static,
        F: FnMut(A, T) -> StreamResult<A>,
    {
        self.fold_until(stream, init, |acc, item| f(acc, item).map(ControlFlow::Continue))
    }

    pub fn fold<T, A, F>(&self, stream: &Stream<T>, init: A, mut f: F) -> StreamResult<A>
    where
        T: Send + 'static,
        F: FnMut(A, T) -> A,
    {
        self.fold_m(stream, init, |acc, item| Ok(f(acc, item)))
    }

    pub fn to_vec<T: Send + 'static>(&self, stream: &Stream<T>) -> StreamResult<Vec<T>> {
        self.fold(stream, Vec::new(), |mut out, item| {
            out.push(item);
            out
        })
    }

    /// Run for effects only; returns how many elements were produced.
    pub fn drain<T: Send + 'static>(&self, stream: &Stream<T>) -> StreamResult<usize> {
        self.fold(stream, 0, |count, _| count + 1)
    }
}

/// `Driver::fold` under the default configuration.
pub fn run_fold<T, A, F>(stream: &Stream<T>, init: A, f: F) -> StreamResult<A>
where
    T: Send + 'static,
    F: FnMut(A, T) -> A,
{
    Driver::default().fold(stream, init, f)
}

/// `Driver::fold_m` under the default configuration.
pub fn run_fold_m<T, A, F>(stream: &Stream<T>, init: A, f: F) -> StreamResult<A>
where
    T: Send + 'static,
    F: FnMut(A, T) -> StreamResult<A>,
{
    Driver::default().fold_m(stream, init, f)
}

pub fn to_vec<T: Send + 'static>(stream: &Stream<T>) -> StreamResult<Vec<T>> {
    Driver::default().to_vec(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StreamError;
    use crate::style::Style;

    #[test]
    fn test_fold_sums() {
        let total = run_fold(&Stream::iter(1..=4), 0, |acc, x| acc + x).unwrap();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_fold_m_error_is_returned() {
        let err = run_fold_m(&Stream::iter(vec![1, 2, 3]), 0, |acc, x| {
            if x == 3 {
                Err(StreamError::source_failure("sink refused"))
            } else {
                Ok(acc + x)
            }
        })
        .unwrap_err();
        assert!(err.to_string().contains("sink refused"));
    }

    #[test]
    fn test_fold_until_cancels_parallel_workers() {
        let driver = Driver::new(StreamConfig::default().with_max_threads(2).with_max_buffer(4)).unwrap();
        let stream = crate::merge(
            Stream::repeat(|| Ok(1u8)),
            Stream::repeat(|| Ok(2u8)),
            Style::Parallel,
        );

        let seen = driver
            .fold_until(&stream, 0usize, |n, _| {
                Ok(if n + 1 == 5 {
                    ControlFlow::Break(n + 1)
                } else {
                    ControlFlow::Continue(n + 1)
                })
            })
            .unwrap();

        assert_eq!(seen, 5);
        let stats = driver.stats();
        assert_eq!(stats.threads_live, 0);
        assert_eq!(stats.threads_spawned, stats.threads_joined);
    }

    #[test]
    fn test_invalid_config_rejected_up_front() {
        let err = Driver::new(StreamConfig::default().with_max_buffer(0)).unwrap_err();
        assert!(matches!(err, StreamError::SchedulerExhausted { .. }));

        let err = Driver::new(StreamConfig::default().with_yield_rate_limit(1e-30)).unwrap_err();
        assert!(matches!(err, StreamError::InvalidRate(_)));
    }

    #[test]
    fn test_drain_counts() {
        let count = Driver::default().drain(&Stream::iter(0..7)).unwrap();
        assert_eq!(count, 7);
    }
}
