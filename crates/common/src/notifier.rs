//! Edge-triggered wake signal shared between the tick driver and the status
//! polling loop.
//!
//! The signal is level-held once set: a `set()` that happens while nobody is
//! waiting is not lost, the next `wait()` returns immediately. The consumer
//! calls `reset()` after finishing its cycle so the next tick starts a fresh
//! edge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Wait-for-signal / reset-after-consume primitive.
#[derive(Debug, Default)]
pub struct PollNotifier {
    flag: AtomicBool,
    notify: Notify,
}

/// Shared handle to a [`PollNotifier`].
pub type SharedPollNotifier = Arc<PollNotifier>;

/// Create a new shared notifier in the unset state.
pub fn create_poll_notifier() -> SharedPollNotifier {
    Arc::new(PollNotifier::new())
}

impl PollNotifier {
    /// Create a notifier in the unset state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake every waiter.
    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Whether the signal is currently raised.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Lower the signal.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }

    /// Wait until the signal is raised. Returns immediately if already set.
    pub async fn wait(&self) {
        loop {
            // Register interest before checking the flag so a concurrent set()
            // between the check and the await cannot be missed.
            let notified = self.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}
