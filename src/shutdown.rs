//! Cooperative shutdown coordination
//!
//! `Running → Stopping → Stopped`, driven by an atomic so the transition is
//! safe from a signal context: `begin` is one atomic compare-and-swap plus a
//! waiter wake-up, no allocation and no locks. Every select loop in the
//! server waits on [`Shutdown::stopping`] and tears down cooperatively.

use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::Notify;

const RUNNING: u8 = 0;
const STOPPING: u8 = 1;
const STOPPED: u8 = 2;

/// Shutdown lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Serving normally
    Running,
    /// Shutdown requested, teardown in progress
    Stopping,
    /// All transports released, server loop returned
    Stopped,
}

/// Shared shutdown flag and wake-up
#[derive(Debug, Default)]
pub struct Shutdown {
    state: AtomicU8,
    notify: Notify,
}

impl Shutdown {
    /// Create a coordinator in the `Running` state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown (`Running → Stopping`).
    ///
    /// Returns false if shutdown was already underway. Safe to call from a
    /// signal task; does nothing but an atomic store and a waiter wake-up.
    pub fn begin(&self) -> bool {
        let transitioned = self
            .state
            .compare_exchange(RUNNING, STOPPING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if transitioned {
            self.notify.notify_waiters();
        }
        transitioned
    }

    /// Mark teardown finished (`Stopping → Stopped`)
    pub fn complete(&self) {
        self.state.store(STOPPED, Ordering::Release);
    }

    /// Current lifecycle state
    pub fn state(&self) -> State {
        match self.state.load(Ordering::Acquire) {
            RUNNING => State::Running,
            STOPPING => State::Stopping,
            _ => State::Stopped,
        }
    }

    /// Whether shutdown has been requested (or already finished)
    pub fn is_stopping(&self) -> bool {
        self.state.load(Ordering::Acquire) != RUNNING
    }

    /// Wait until shutdown is requested.
    ///
    /// Returns immediately if it already was. The flag is re-checked around
    /// the notified future so a `begin` racing with this call is never lost.
    pub async fn stopping(&self) {
        while !self.is_stopping() {
            let notified = self.notify.notified();
            if self.is_stopping() {
                return;
            }
            notified.await;
        }
    }
}
