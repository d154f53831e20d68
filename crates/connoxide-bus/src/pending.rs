//! Pending call tracking and loop lifecycle state
//!
//! The loop may only exit once it has been asked to stop *and* every
//! outstanding call has completed. Both facts live under one mutex so the
//! check and the transition are a single critical section.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, error};

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct LoopState {
    /// The loop marker ran (or the loop thread gave up)
    started: bool,
    /// Cleared by a stop request
    running: bool,
    /// The loop thread has left its dispatch loop
    exited: bool,
    /// Outstanding operations
    pending: usize,
    /// Operations dispatched over the connection lifetime
    dispatched: u64,
    /// Operations completed over the connection lifetime
    completed: u64,
}

/// Counters observed by an external monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopStats {
    /// Outstanding operations
    pub pending: usize,
    /// Total dispatched
    pub dispatched: u64,
    /// Total completed
    pub completed: u64,
    /// The loop is running and accepting work
    pub running: bool,
}

/// Shared lifecycle state of one connection's loop
#[derive(Debug, Default)]
pub(crate) struct LoopControl {
    state: Mutex<LoopState>,
    ready: Condvar,
    exit: Notify,
}

impl LoopControl {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Called once by the marker task when the loop can accept work
    pub(crate) fn mark_ready(&self) {
        let mut state = lock(&self.state);
        state.started = true;
        state.running = true;
        drop(state);
        self.ready.notify_all();
        debug!("Dispatch loop ready");
    }

    /// Called by the loop thread on the way out, including after a failure
    pub(crate) fn mark_exited(&self) {
        let mut state = lock(&self.state);
        state.started = true;
        state.running = false;
        state.exited = true;
        drop(state);
        self.ready.notify_all();
    }

    /// Block until the loop marker has run
    pub(crate) fn wait_started(&self) {
        let state = lock(&self.state);
        let _state = self
            .ready
            .wait_while(state, |s| !s.started)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Block until the loop thread has left its dispatch loop
    pub(crate) fn wait_exited(&self) {
        let state = lock(&self.state);
        let _state = self
            .ready
            .wait_while(state, |s| !s.exited)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Mark the loop as not running and request exit once nothing is pending.
    ///
    /// Returns the number of operations still outstanding.
    pub(crate) fn request_stop(&self) -> usize {
        let mut state = lock(&self.state);
        state.running = false;
        let pending = state.pending;
        drop(state);

        if pending == 0 {
            self.exit.notify_one();
        } else {
            debug!("Stop deferred until {} pending calls complete", pending);
        }
        pending
    }

    /// Resolves when the loop should exit
    pub(crate) async fn exit_requested(&self) {
        self.exit.notified().await
    }

    /// Count one outstanding operation
    pub(crate) fn track(self: &Arc<Self>) -> PendingCall {
        let mut state = lock(&self.state);
        state.pending += 1;
        state.dispatched += 1;
        drop(state);
        PendingCall {
            control: Arc::clone(self),
        }
    }

    fn decrement(&self) {
        let mut state = lock(&self.state);
        if state.pending == 0 {
            error!("Pending call counter underflow");
            return;
        }
        state.pending -= 1;
        state.completed += 1;
        let drained = state.pending == 0 && state.started && !state.running && !state.exited;
        drop(state);

        if drained {
            debug!("Last pending call completed, releasing loop");
            self.exit.notify_one();
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    pub(crate) fn has_exited(&self) -> bool {
        lock(&self.state).exited
    }

    pub(crate) fn stats(&self) -> LoopStats {
        let state = lock(&self.state);
        LoopStats {
            pending: state.pending,
            dispatched: state.dispatched,
            completed: state.completed,
            running: state.running,
        }
    }
}

/// One outstanding operation.
///
/// Dropping the guard completes the operation, so the counter is released
/// even when the continuation panics.
#[derive(Debug)]
pub(crate) struct PendingCall {
    control: Arc<LoopControl>,
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.control.decrement();
    }
}
