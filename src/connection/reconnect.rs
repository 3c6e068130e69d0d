//! Per-connection reconnect timer.
//!
//! States are `idle` (no task) and `armed` (a repeating tokio task).
//! Arming an armed timer is a no-op; cancelling aborts the task
//! synchronously. The first tick fires one full interval after arming.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{trace, warn};

// ============================================================================
// ReconnectTimer
// ============================================================================

/// Single cancellable repeating timer.
#[derive(Debug, Default)]
pub(crate) struct ReconnectTimer {
    task: Option<JoinHandle<()>>,
}

impl ReconnectTimer {
    /// Returns `true` while a timer task is alive.
    pub(crate) fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Starts calling `tick` every `period` until it returns `false` or
    /// the timer is cancelled.
    ///
    /// Returns `false` if the timer was already armed or no tokio runtime
    /// is available.
    pub(crate) fn arm<F>(&mut self, period: Duration, mut tick: F) -> bool
    where
        F: FnMut() -> bool + Send + 'static,
    {
        if self.is_armed() {
            trace!("Reconnect timer already armed");
            return false;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!("No tokio runtime, reconnect timer not armed");
            return false;
        };

        self.task = Some(runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !tick() {
                    break;
                }
            }
        }));

        true
    }

    /// Stops the timer. Returns `true` if it was armed.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ============================================================================
// Tests
// ============================================================================
