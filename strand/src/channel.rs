//!
//! Shared channel for concurrent regions
//!
//! One channel is created per Async/Parallel region. It is the only piece
//! of shared mutable state between the workers of the region and the
//! consumer that drains it:
//!
//! - a bounded queue of produced elements, in publish order
//! - a bounded queue of not-yet-started work (`J`)
//! - the live-worker count and the worker budget
//! - the pending-demand counter
//! - a terminal slot (running, cancelled, or failed with the first error)
//!
//! All of it sits behind one `Mutex` with two `Condvar`s: `consumer` wakes
//! the draining side, `producers` wakes workers blocked on a full queue.
//! The `halted` flag mirrors the terminal slot so that workers can poll for
//! cancellation at every step without taking the lock.
//!

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::errors::StreamError;
use crate::stats::SchedulerStats;
use crate::style::Style;

/// How long an Async consumer waits on an empty channel before it asks
/// for one more worker.
pub(crate) const ASYNC_GROW_DELAY: Duration = Duration::from_millis(1);

enum Terminal {
    Running,
    Cancelled,
    Failed(StreamError),
    Reported,
}

struct ChannelState<T, J> {
    items: VecDeque<T>,
    pending: VecDeque<J>,
    live_workers: usize,
    budget: usize,
    pending_demand: usize,
    terminal: Terminal,
}

/// What the consumer should do next.
pub(crate) enum Pull<T, J> {
    Item(T),
    /// Start a worker for this job; a live-worker slot is already reserved.
    Spawn(J),
    Failed(StreamError),
    Drained,
}

/// Outcome of handing new work to the channel.
pub(crate) enum Enqueue<J> {
    Queued,
    Halted,
    /// The pending queue is at capacity; the caller keeps the job.
    Full(J),
}

pub(crate) struct SharedChannel<T, J> {
    state: Mutex<ChannelState<T, J>>,
    consumer: Condvar,
    producers: Condvar,
    halted: AtomicBool,
    style: Style,
    capacity: usize,
    max_workers: usize,
    limiter: Option<RateLimiter>,
    stats: Arc<SchedulerStats>,
}

impl<T, J> SharedChannel<T, J> {
    pub(crate) fn new(
        style: Style,
        capacity: usize,
        budget: usize,
        max_workers: usize,
        rate: Option<f64>,
        stats: Arc<SchedulerStats>,
    ) -> Self {
        let capacity = capacity.max(1);
        let max_workers = max_workers.max(1);
        let budget = budget.clamp(1, max_workers);
        debug!(%style, capacity, budget, max_workers, "shared channel created");

        Self {
            state: Mutex::new(ChannelState {
                items: VecDeque::with_capacity(capacity),
                pending: VecDeque::new(),
                live_workers: 0,
                budget,
                pending_demand: 0,
                terminal: Terminal::Running,
            }),
            consumer: Condvar::new(),
            producers: Condvar::new(),
            halted: AtomicBool::new(false),
            style,
            capacity,
            max_workers,
            limiter: rate.and_then(RateLimiter::new),
            stats,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState<T, J>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cheap cancellation poll for workers.
    pub(crate) fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Queue work before any worker exists. Not bounded by capacity.
    pub(crate) fn seed(&self, jobs: impl IntoIterator<Item = J>) {
        let mut state = self.lock();
        state.pending.extend(jobs);
    }

    /// Publish one element, blocking while the queue is full.
    /// Returns `false` once the channel has been halted.
    pub(crate) fn publish(&self, item: T) -> bool {
        if self.is_halted() {
            return false;
        }

        let mut state = self.lock();
        if let Some(limiter) = &self.limiter {
            match self.wait_until(state, limiter.next_slot()) {
                Some(next) => state = next,
                None => return false,
            }
        }

        loop {
            if !matches!(state.terminal, Terminal::Running) {
                return false;
            }
            if state.items.len() < self.capacity {
                state.items.push_back(item);
                let depth = state.items.len();
                self.stats.published(depth);
                trace!(depth, "element published");
                self.consumer.notify_one();
                return true;
            }
            state = self
                .producers
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Sleep on the producer condvar until `deadline`, so that a halt cuts
    /// the wait short. `None` once the channel has been halted.
    fn wait_until<'a>(
        &'a self,
        mut state: MutexGuard<'a, ChannelState<T, J>>,
        deadline: Instant,
    ) -> Option<MutexGuard<'a, ChannelState<T, J>>> {
        loop {
            if !matches!(state.terminal, Terminal::Running) {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return Some(state);
            }
            state = self
                .producers
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Hand a new job to the scheduler without blocking.
    pub(crate) fn enqueue(&self, job: J) -> Enqueue<J> {
        let mut state = self.lock();
        if !matches!(state.terminal, Terminal::Running) {
            return Enqueue::Halted;
        }
        if state.pending.len() >= self.capacity {
            return Enqueue::Full(job);
        }
        state.pending.push_back(job);
        self.consumer.notify_one();
        Enqueue::Queued
    }

    /// Called by a worker whose job has finished. Either hands it the next
    /// pending job (the worker stays live) or retires it.
    pub(crate) fn retire_or_reuse(&self, worker: usize) -> Option<J> {
        let mut state = self.lock();
        let wanted = match self.style {
            Style::Parallel => true,
            _ => state.pending_demand > 0 || state.items.is_empty(),
        };

        if matches!(state.terminal, Terminal::Running) && wanted {
            if let Some(job) = state.pending.pop_front() {
                debug!(worker, "worker reused for pending source");
                return Some(job);
            }
        }

        state.live_workers = state.live_workers.saturating_sub(1);
        debug!(worker, live = state.live_workers, "worker retired");
        self.consumer.notify_one();
        None
    }

    /// Record a failure. The first one wins; the region is halted.
    pub(crate) fn fail(&self, err: StreamError) {
        let mut state = self.lock();
        if matches!(state.terminal, Terminal::Running) {
            warn!(error = %err, "worker failed; cancelling region");
            self.stats.failed();
            state.terminal = Terminal::Failed(err);
            self.halt();
        } else {
            debug!(error = %err, "failure after halt discarded");
        }
    }

    /// Stop the region. Workers observe this at their next step boundary.
    pub(crate) fn cancel(&self) {
        let mut state = self.lock();
        if matches!(state.terminal, Terminal::Running) {
            debug!(live = state.live_workers, "region cancelled");
            state.terminal = Terminal::Cancelled;
        }
        state.pending.clear();
        self.halt();
    }

    fn halt(&self) {
        self.halted.store(true, Ordering::Release);
        self.consumer.notify_all();
        self.producers.notify_all();
    }

    /// Register that the consumer wants one more element.
    pub(crate) fn request(&self) {
        self.lock().pending_demand += 1;
    }

    /// Consumer side: block until there is an element, a job to start, a
    /// failure to report, or nothing left at all.
    pub(crate) fn pull(&self) -> Pull<T, J> {
        let mut state = self.lock();
        loop {
            match std::mem::replace(&mut state.terminal, Terminal::Reported) {
                Terminal::Failed(err) => {
                    state.pending_demand = state.pending_demand.saturating_sub(1);
                    return Pull::Failed(err);
                }
                Terminal::Running => state.terminal = Terminal::Running,
                _ => {
                    state.pending_demand = state.pending_demand.saturating_sub(1);
                    return Pull::Drained;
                }
            }

            // Parallel starts queued work as soon as a slot is free, even
            // when elements are waiting.
            if self.style == Style::Parallel
                && !state.pending.is_empty()
                && state.live_workers < state.budget
            {
                return self.reserve(state);
            }

            if let Some(item) = state.items.pop_front() {
                state.pending_demand = state.pending_demand.saturating_sub(1);
                self.producers.notify_all();
                return Pull::Item(item);
            }

            if !state.pending.is_empty() {
                if state.live_workers < state.budget || state.live_workers == 0 {
                    return self.reserve(state);
                }
            } else if state.live_workers == 0 {
                state.pending_demand = state.pending_demand.saturating_sub(1);
                return Pull::Drained;
            }

            let can_grow = self.style == Style::Async
                && !state.pending.is_empty()
                && state.budget < self.max_workers;
            if !can_grow {
                state = self
                    .consumer
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            }

            let (next, timeout) = self
                .consumer
                .wait_timeout(state, ASYNC_GROW_DELAY)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;

            let starved = timeout.timed_out()
                && state.items.is_empty()
                && state.pending_demand > 0
                && !state.pending.is_empty()
                && matches!(state.terminal, Terminal::Running);
            if starved {
                state.budget += 1;
                self.stats.budget_grew();
                debug!(budget = state.budget, "async budget grown on unmet demand");
            }
        }
    }

    fn reserve(&self, mut state: MutexGuard<'_, ChannelState<T, J>>) -> Pull<T, J> {
        match state.pending.pop_front() {
            Some(job) => {
                state.live_workers += 1;
                self.producers.notify_all();
                Pull::Spawn(job)
            }
            None => Pull::Drained,
        }
    }

    /// Give back a reserved slot when a worker thread could not be started.
    pub(crate) fn unreserve(&self) {
        let mut state = self.lock();
        state.live_workers = state.live_workers.saturating_sub(1);
    }

    #[cfg(test)]
    pub(crate) fn live_workers(&self) -> usize {
        self.lock().live_workers
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> usize {
        self.lock().items.len()
    }
}

/// Spaces publishes `1/rate` seconds apart across all workers of a region.
struct RateLimiter {
    interval: Duration,
    next: Mutex<Instant>,
}

impl RateLimiter {
    /// `None` when `1/rate` is not a representable interval.
    fn new(rate: f64) -> Option<Self> {
        let interval = Duration::try_from_secs_f64(1.0 / rate).ok()?;
        Some(Self {
            interval,
            next: Mutex::new(Instant::now()),
        })
    }

    /// Claim the next publish slot and return when it opens.
    fn next_slot(&self) -> Instant {
        let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = (*next).max(Instant::now());
        *next = slot.checked_add(self.interval).unwrap_or(slot);
        slot
    }
}
