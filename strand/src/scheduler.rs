//!
//! Worker scheduler for concurrent regions
//!
//! Every Async or Parallel merge/bind becomes a *region*: one shared
//! channel, a set of jobs, and the OS threads running them. The region is
//! itself a cursor, so a concurrent composition can be nested anywhere a
//! serial one can.
//!
//! - Thread spawning happens only on the consuming side, inside `step`,
//!   so the arena of join handles has a single owner.
//! - Parallel starts with the full `max_threads` budget and spawns a worker
//!   for each job as soon as a slot is free.
//! - Async starts with `min_workers` and grows the budget by one whenever
//!   the consumer waits on an empty channel while work is still queued.
//! - A worker that finishes its job may take the next queued job instead
//!   of exiting (always for Parallel, on outstanding demand for Async).
//! - Dropping or cancelling the region halts the channel and joins every
//!   worker before returning.
//!

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::channel::{Enqueue, Pull, SharedChannel};
use crate::errors::{StreamError, StreamResult};
use crate::runtime::Runtime;
use crate::stats::SchedulerStats;
use crate::step::{Cursor, Step};
use crate::stream::Stream;
use crate::style::Style;

/// Work owned by a concurrent region.
pub(crate) enum Job<T> {
    /// Evaluate a stream, publishing its elements.
    Drain(Stream<T>),
    /// Advance an outer stream, queueing the inner streams it generates.
    Expand(Box<dyn Cursor<Stream<T>>>),
}

type Channel<T> = SharedChannel<T, Job<T>>;

/// The entry point for every concurrent merge and bind.
pub(crate) fn run_concurrently<T: Send + 'static>(
    jobs: Vec<Job<T>>,
    style: Style,
    rt: &Runtime,
) -> Box<dyn Cursor<T>> {
    Box::new(Region::new(jobs, style, rt.clone()))
}

/// Join handles indexed by worker id. Slots of joined workers are reused.
#[derive(Default)]
struct WorkerArena {
    slots: Vec<Option<JoinHandle<()>>>,
    free: Vec<usize>,
}

impl WorkerArena {
    fn insert_with<E>(
        &mut self,
        spawn: impl FnOnce(usize) -> Result<JoinHandle<()>, E>,
    ) -> Result<usize, E> {
        let id = self.free.pop().unwrap_or(self.slots.len());
        let handle = match spawn(id) {
            Ok(handle) => handle,
            Err(err) => {
                if id < self.slots.len() {
                    self.free.push(id);
                }
                return Err(err);
            }
        };
        if id == self.slots.len() {
            self.slots.push(Some(handle));
        } else {
            self.slots[id] = Some(handle);
        }
        Ok(id)
    }

    /// Join workers that have already exited.
    fn reap(&mut self, stats: &SchedulerStats) {
        for (id, slot) in self.slots.iter_mut().enumerate() {
            if slot.as_ref().is_some_and(JoinHandle::is_finished) {
                if let Some(handle) = slot.take() {
                    join_worker(id, handle, stats);
                    self.free.push(id);
                }
            }
        }
    }

    fn join_all(&mut self, stats: &SchedulerStats) {
        for (id, slot) in self.slots.iter_mut().enumerate() {
            if let Some(handle) = slot.take() {
                join_worker(id, handle, stats);
            }
        }
        self.slots.clear();
        self.free.clear();
    }

    fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

fn join_worker(id: usize, handle: JoinHandle<()>, stats: &SchedulerStats) {
    // Worker bodies catch their own panics; a join error here means the
    // bookkeeping after the job panicked, which is reported and ignored.
    if handle.join().is_err() {
        warn!(worker = id, "worker thread panicked outside its job");
    }
    stats.thread_joined();
}

/// Consumer side of a concurrent region.
pub(crate) struct Region<T> {
    channel: Arc<Channel<T>>,
    workers: WorkerArena,
    rt: Runtime,
    finished: bool,
}

impl<T: Send + 'static> Region<T> {
    fn new(jobs: Vec<Job<T>>, style: Style, rt: Runtime) -> Self {
        let config = rt.config();
        let budget = match style {
            Style::Parallel => config.max_threads,
            _ => config.initial_budget(),
        };
        let channel = Arc::new(SharedChannel::new(
            style,
            config.max_buffer,
            budget,
            config.max_threads,
            config.yield_rate_limit,
            Arc::clone(rt.stats()),
        ));
        channel.seed(jobs);

        Self {
            channel,
            workers: WorkerArena::default(),
            rt,
            finished: false,
        }
    }

    fn spawn(&mut self, job: Job<T>) -> StreamResult<()> {
        self.workers.reap(self.rt.stats());

        let channel = Arc::clone(&self.channel);
        let rt = self.rt.clone();
        self.rt.stats().thread_started();
        let spawned = self.workers.insert_with(|id| {
            thread::Builder::new()
                .name(format!("strand-worker-{}", id))
                .spawn(move || worker_main(id, job, channel, rt))
        });

        match spawned {
            Ok(id) => {
                debug!(worker = id, live = self.workers.len(), "worker spawned");
                Ok(())
            }
            Err(err) => {
                self.rt.stats().spawn_aborted();
                self.channel.unreserve();
                Err(StreamError::from_source(err))
            }
        }
    }
}

impl<T> Region<T> {
    /// Halt the channel and wait for every worker to leave.
    fn shutdown(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.channel.cancel();
        self.workers.join_all(self.rt.stats());
        debug!("region shut down");
    }
}

impl<T: Send + 'static> Cursor<T> for Region<T> {
    fn step(&mut self) -> StreamResult<Step<T>> {
        if self.finished {
            return Ok(Step::Stop);
        }

        self.channel.request();
        loop {
            match self.channel.pull() {
                Pull::Item(item) => return Ok(Step::item(item)),
                Pull::Spawn(job) => {
                    if let Err(err) = self.spawn(job) {
                        self.shutdown();
                        return Err(err);
                    }
                }
                Pull::Failed(err) => {
                    self.shutdown();
                    return Err(err);
                }
                Pull::Drained => {
                    self.shutdown();
                    return Ok(Step::Stop);
                }
            }
        }
    }

    fn cancel(&mut self) {
        self.shutdown();
    }
}

impl<T> Drop for Region<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Restores the live-thread count however the worker body ends.
struct ThreadGuard(Arc<SchedulerStats>);

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        self.0.thread_exited();
    }
}

fn worker_main<T: Send + 'static>(id: usize, first: Job<T>, channel: Arc<Channel<T>>, rt: Runtime) {
    let _guard = ThreadGuard(Arc::clone(rt.stats()));
    let mut next = Some(first);

    while let Some(job) = next.take() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_job(job, &channel, &rt)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => channel.fail(err),
            Err(payload) => channel.fail(StreamError::WorkerPanicked {
                worker: id,
                message: panic_message(payload.as_ref()),
            }),
        }
        next = channel.retire_or_reuse(id);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_job<T: Send + 'static>(job: Job<T>, channel: &Channel<T>, rt: &Runtime) -> StreamResult<()> {
    match job {
        Job::Drain(stream) => drain(stream.open(rt), channel),
        Job::Expand(generator) => expand(generator, channel, rt),
    }
}

/// Evaluate one stream into the channel, polling for cancellation at
/// every step.
fn drain<T: Send + 'static>(mut cursor: Box<dyn Cursor<T>>, channel: &Channel<T>) -> StreamResult<()> {
    loop {
        if channel.is_halted() {
            cursor.cancel();
            return Ok(());
        }
        match cursor.step()? {
            Step::Yield(item, ()) => {
                if !channel.publish(item) {
                    cursor.cancel();
                    return Ok(());
                }
            }
            Step::Skip(()) => {}
            Step::Stop => return Ok(()),
        }
    }
}

/// Advance the outer stream of a bind, queueing each inner stream. When
/// the backlog is full the inner stream is drained right here, so the
/// generator never waits on workers that may be waiting on it.
fn expand<T: Send + 'static>(
    mut generator: Box<dyn Cursor<Stream<T>>>,
    channel: &Channel<T>,
    rt: &Runtime,
) -> StreamResult<()> {
    loop {
        if channel.is_halted() {
            generator.cancel();
            return Ok(());
        }
        match generator.step()? {
            Step::Yield(inner, ()) => match channel.enqueue(Job::Drain(inner)) {
                Enqueue::Queued => {}
                Enqueue::Halted => {
                    generator.cancel();
                    return Ok(());
                }
                Enqueue::Full(job) => run_job(job, channel, rt)?,
            },
            Step::Skip(()) => {}
            Step::Stop => return Ok(()),
        }
    }
}
