//! C7 — Reply Caller Directory.
//!
//! Grounded on the same handle-plus-timer shape as [`crate::scheduler`]:
//! a reply caller is stored keyed by its correlating id, with a TTL timer
//! scheduled through C5; whichever of `take()` or the timer fires first
//! wins, and the invariant "a caller fires at most once" falls directly out
//! of `DashMap::remove` being atomic.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::instrument;

use crate::domain::RequestReplyId;
use crate::scheduler::{DelayedScheduler, ScheduleHandle};

/// Errors raised by the reply caller directory.
#[derive(Debug, Error)]
pub enum ReplyCallerError {
    /// The reply's TTL elapsed before a matching reply arrived.
    #[error("reply caller for {0} timed out")]
    Expired(RequestReplyId),
}

/// A pending caller awaiting either a reply or a timeout.
pub type ReplyCaller = Box<dyn FnOnce(ReplyOutcome) + Send>;

/// What eventually happens to a registered reply caller.
pub enum ReplyOutcome {
    /// A reply arrived before the TTL elapsed.
    Reply(crate::domain::Message),
    /// The TTL elapsed with no reply.
    TimedOut,
}

struct Entry {
    caller: ReplyCaller,
    timer_handle: ScheduleHandle,
}

/// Tracks outstanding requests awaiting a correlated reply.
pub struct ReplyCallerDirectory {
    scheduler: Arc<DelayedScheduler>,
    entries: DashMap<RequestReplyId, Entry>,
}

impl ReplyCallerDirectory {
    /// Builds an empty directory scheduling timeouts through `scheduler`.
    #[must_use]
    pub fn new(scheduler: Arc<DelayedScheduler>) -> Arc<Self> {
        Arc::new(Self {
            scheduler,
            entries: DashMap::new(),
        })
    }

    /// Registers `caller` under `request_reply_id`, scheduling a timeout
    /// that fires `caller` with [`ReplyOutcome::TimedOut`] after `ttl_ms`
    /// if [`Self::take`] is not called first.
    #[instrument(skip(self, caller), fields(request_reply_id = %request_reply_id, ttl_ms = ttl_ms))]
    pub fn add(self: &Arc<Self>, request_reply_id: RequestReplyId, caller: ReplyCaller, ttl_ms: u64) {
        let directory = Arc::clone(self);
        let id_for_timer = request_reply_id;
        let timer_handle = self.scheduler.schedule(ttl_ms, move || {
            if let Some((_, entry)) = directory.entries.remove(&id_for_timer) {
                (entry.caller)(ReplyOutcome::TimedOut);
            }
        });
        self.entries.insert(
            request_reply_id,
            Entry {
                caller,
                timer_handle,
            },
        );
    }

    /// Removes and returns the caller for `request_reply_id`, cancelling
    /// its timeout timer. Returns `None` if no caller is registered (already
    /// taken, already timed out, or never registered).
    #[instrument(skip(self), fields(request_reply_id = %request_reply_id))]
    pub fn take(&self, request_reply_id: RequestReplyId) -> Option<ReplyCaller> {
        let (_, entry) = self.entries.remove(&request_reply_id)?;
        self.scheduler.unschedule(entry.timer_handle);
        Some(entry.caller)
    }

    /// Number of callers currently awaiting a reply or timeout.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no callers are currently registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
