//! C5 — Delayed Scheduler & Thread Pool.
//!
//! A handle-based `schedule`/`unschedule` pair backed by a bounded worker
//! pool: `tokio::spawn` plus a counting [`Semaphore`] caps how many
//! scheduled callbacks run concurrently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Opaque handle returned by [`DelayedScheduler::schedule`], used to cancel
/// a not-yet-fired callback.
pub type ScheduleHandle = u64;

/// Schedules callbacks to run after a delay, bounding concurrent execution
/// to a fixed worker count.
pub struct DelayedScheduler {
    semaphore: Arc<Semaphore>,
    pending: DashMap<ScheduleHandle, JoinHandle<()>>,
    next_handle: AtomicU64,
}

impl DelayedScheduler {
    /// Builds a scheduler whose callbacks run with at most `worker_count`
    /// concurrently in flight (clamped to at least 1).
    #[must_use]
    pub fn new(worker_count: usize) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(worker_count.max(1))),
            pending: DashMap::new(),
            next_handle: AtomicU64::new(1),
        })
    }

    /// Schedules `task` to run after `delay_ms`, or immediately if zero.
    /// Returns a handle that can be passed to [`Self::unschedule`].
    #[instrument(skip(self, task), fields(delay_ms = delay_ms))]
    pub fn schedule<F>(self: &Arc<Self>, delay_ms: u64, task: F) -> ScheduleHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let scheduler = Arc::clone(self);
        let semaphore = Arc::clone(&self.semaphore);
        let join = tokio::spawn(async move {
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };
            task();
            scheduler.pending.remove(&handle);
        });
        self.pending.insert(handle, join);
        handle
    }

    /// Cancels a not-yet-fired callback. Idempotent: cancelling an unknown,
    /// already-fired, or already-cancelled handle is a no-op, and it is
    /// safe to call from inside a callback that is unscheduling itself.
    #[instrument(skip(self))]
    pub fn unschedule(&self, handle: ScheduleHandle) {
        if let Some((_, join)) = self.pending.remove(&handle) {
            join.abort();
        }
    }

    /// Number of callbacks currently scheduled but not yet fired.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Cancels every pending callback, draining in-flight work before
    /// returning.
    pub async fn shutdown(&self) {
        let handles: Vec<ScheduleHandle> = self.pending.iter().map(|e| *e.key()).collect();
        for handle in handles {
            if let Some((_, join)) = self.pending.remove(&handle) {
                join.abort();
                let _ = join.await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    #[tokio::test]
    async fn zero_delay_runs_promptly() {
        let scheduler = DelayedScheduler::new(2);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        scheduler.schedule(0, move || flag.store(true, Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unschedule_before_firing_prevents_execution() {
        let scheduler = DelayedScheduler::new(2);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let handle = scheduler.schedule(50, move || flag.store(true, Ordering::SeqCst));
        scheduler.unschedule(handle);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unschedule_is_idempotent() {
        let scheduler = DelayedScheduler::new(2);
        let handle = scheduler.schedule(50, || {});
        scheduler.unschedule(handle);
        scheduler.unschedule(handle);
        scheduler.unschedule(999);
    }

    #[tokio::test]
    async fn callback_can_unschedule_itself_safely() {
        let scheduler = DelayedScheduler::new(2);
        let handle_slot: Arc<Mutex<Option<ScheduleHandle>>> = Arc::new(Mutex::new(None));
        let scheduler_for_task = scheduler.clone();
        let slot_for_task = handle_slot.clone();
        let handle = scheduler.schedule(0, move || {
            if let Some(h) = *slot_for_task.lock().unwrap() {
                scheduler_for_task.unschedule(h);
            }
        });
        *handle_slot.lock().unwrap() = Some(handle);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn shutdown_drains_pending_handles() {
        let scheduler = DelayedScheduler::new(1);
        scheduler.schedule(1_000, || {});
        scheduler.schedule(1_000, || {});
        assert_eq!(scheduler.pending_count(), 2);
        scheduler.shutdown().await;
        assert_eq!(scheduler.pending_count(), 0);
    }
}
