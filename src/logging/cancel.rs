//! Cancellation for blocking mode waits

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::mode::ModeMonitor;

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,

    /// Monitors with a wait currently parked on this token
    waiters: Mutex<Vec<Weak<ModeMonitor>>>,
}

/// Shared flag that aborts `wait_for_mode_transition_with`.
///
/// Cancelling wakes any wait parked on the token right away.
#[derive(Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        let waiters = std::mem::take(&mut *self.state.waiters.lock());
        for monitor in waiters.iter().filter_map(Weak::upgrade) {
            monitor.wake_all();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Must be called before the waiter takes the monitor lock
    pub(crate) fn register(&self, monitor: &Arc<ModeMonitor>) {
        self.state.waiters.lock().push(Arc::downgrade(monitor));
    }

    pub(crate) fn unregister(&self, monitor: &Arc<ModeMonitor>) {
        self.state
            .waiters
            .lock()
            .retain(|waiter| !std::ptr::eq(waiter.as_ptr(), Arc::as_ptr(monitor)));
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
