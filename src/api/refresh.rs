//! Single-flight refresh coordination
//!
//! Tracks whether a token refresh is outstanding and holds the callers that
//! hit a 401 while it was. The flag and the queue share one mutex so the
//! check-then-set on entry is atomic under a multi-threaded runtime; the lock
//! is never held across an await point.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;

use super::envelope::ApiError;

/// Outcome delivered to a queued caller: the new access token or the refresh error.
pub type RefreshOutcome = Result<String, ApiError>;

/// Identifies one refresh. A ticket goes stale once its refresh is reset from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// How a caller that hit a 401 participates in the refresh.
pub enum Entry {
    /// No refresh was running; this caller now owns it and must call `complete`.
    Leader(Ticket),
    /// A refresh is running; await the receiver for its outcome.
    Queued(oneshot::Receiver<RefreshOutcome>),
}

#[derive(Default)]
struct State {
    in_flight: bool,
    generation: u64,
    queue: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

impl State {
    fn release(&mut self) -> VecDeque<oneshot::Sender<RefreshOutcome>> {
        self.in_flight = false;
        std::mem::take(&mut self.queue)
    }
}

#[derive(Default)]
pub struct RefreshCoordinator {
    state: Mutex<State>,
}

fn settle(waiters: VecDeque<oneshot::Sender<RefreshOutcome>>, outcome: &RefreshOutcome) {
    tracing::debug!("Releasing {} queued request(s)", waiters.len());
    for waiter in waiters {
        // A dropped receiver means that caller gave up; nothing to deliver.
        let _ = waiter.send(outcome.clone());
    }
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Become the refresh leader, or join the queue behind the current one.
    pub fn enter(&self) -> Entry {
        let mut state = self.lock();
        if state.in_flight {
            let (tx, rx) = oneshot::channel();
            state.queue.push_back(tx);
            Entry::Queued(rx)
        } else {
            state.in_flight = true;
            state.generation += 1;
            Entry::Leader(Ticket(state.generation))
        }
    }

    /// Settle the refresh `ticket` leads.
    ///
    /// `commit` runs while the slot is still held, so no other caller can lead
    /// a refresh until its effects are visible. Queued callers are then
    /// released in arrival order with `outcome`. Returns `false`, without
    /// running `commit`, when the ticket is stale.
    pub fn complete(
        &self,
        ticket: Ticket,
        outcome: RefreshOutcome,
        commit: impl FnOnce(),
    ) -> bool {
        let waiters = {
            let mut state = self.lock();
            if !state.in_flight || state.generation != ticket.0 {
                return false;
            }
            commit();
            state.release()
        };
        settle(waiters, &outcome);
        true
    }

    /// Return to idle unconditionally, rejecting anyone still queued. Any
    /// running leader's ticket goes stale.
    pub fn reset(&self, reason: ApiError) {
        let waiters = {
            let mut state = self.lock();
            state.generation += 1;
            state.release()
        };
        settle(waiters, &Err(reason));
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().in_flight
    }

    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }
}
