//! Wake flag shared between the scheduler and its event sources.

use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;

/// Sticky "run a pass now" request.
///
/// Signals set a flag that persists until the scheduler consumes it, so a
/// signal raised while nobody is waiting (for example mid-pass) is not lost.
/// Any number of signals before consumption collapse into one request.
#[derive(Debug, Default)]
pub struct WakeSignal {
    requested: Mutex<bool>,
    notify: Notify,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an immediate pass and wake the waiter, if any.
    pub fn signal(&self) {
        *self.requested.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.notify.notify_one();
    }

    pub fn is_set(&self) -> bool {
        *self.requested.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        std::mem::take(&mut *self.requested.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Resolves on the next `signal`, or immediately if one arrived since the
    /// last wakeup. Callers must re-check `is_set` afterwards.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
