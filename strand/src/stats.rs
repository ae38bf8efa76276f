//!
//! Scheduler statistics
//!
//! Lock-free counters shared by every concurrent region opened under one
//! `Driver`. They make thread lifetime and buffer depth observable, so
//! callers can assert that cancellation joined every worker and that the
//! shared channel never held more than `max_buffer` unconsumed elements.
//!

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct SchedulerStats {
    threads_spawned: AtomicUsize,
    threads_live: AtomicUsize,
    threads_joined: AtomicUsize,
    peak_queue_depth: AtomicUsize,
    items_published: AtomicUsize,
    budget_grows: AtomicUsize,
    failures: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub threads_spawned: usize,
    pub threads_live: usize,
    pub threads_joined: usize,
    pub peak_queue_depth: usize,
    pub items_published: usize,
    pub budget_grows: usize,
    pub failures: usize,
}

impl SchedulerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn thread_started(&self) {
        self.threads_spawned.fetch_add(1, Ordering::SeqCst);
        self.threads_live.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn spawn_aborted(&self) {
        self.threads_spawned.fetch_sub(1, Ordering::SeqCst);
        self.threads_live.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn thread_exited(&self) {
        self.threads_live.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn thread_joined(&self) {
        self.threads_joined.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn published(&self, depth: usize) {
        self.items_published.fetch_add(1, Ordering::Relaxed);
        self.peak_queue_depth.fetch_max(depth, Ordering::Relaxed);
    }

    pub(crate) fn budget_grew(&self) {
        self.budget_grows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn live_threads(&self) -> usize {
        self.threads_live.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            threads_spawned: self.threads_spawned.load(Ordering::SeqCst),
            threads_live: self.threads_live.load(Ordering::SeqCst),
            threads_joined: self.threads_joined.load(Ordering::SeqCst),
            peak_queue_depth: self.peak_queue_depth.load(Ordering::Relaxed),
            items_published: self.items_published.load(Ordering::Relaxed),
            budget_grows: self.budget_grows.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}
