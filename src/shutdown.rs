//! Lifecycle and graceful shutdown for Vitals.
//!
//! Tracks in-flight collection cycles so shutdown can drain them before the
//! owned singletons are torn down. Cycles still running when the drain
//! timeout expires are cancelled through the shared [`CancellationToken`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    Draining,
    Stopped,
}

/// Result of a shutdown operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    Timeout { remaining: u32 },
}

/// Coordinates in-flight collection cycles and shutdown.
pub struct Lifecycle {
    state: RwLock<LifecycleState>,
    in_flight: Arc<AtomicU32>,
    notify: Arc<Notify>,
    cancel: CancellationToken,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LifecycleState::Running),
            in_flight: Arc::new(AtomicU32::new(0)),
            notify: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// Check if new collection cycles may start.
    pub fn is_accepting(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Token cancelled when draining gives up on in-flight cycles.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Track an in-flight cycle. Returns None if shutting down.
    pub fn track(&self) -> Option<CycleGuard> {
        if !self.is_accepting() {
            return None;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(CycleGuard {
            counter: Arc::clone(&self.in_flight),
            notify: Arc::clone(&self.notify),
        })
    }

    pub fn in_flight_count(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting, wait up to `timeout` for in-flight cycles, then
    /// cancel whatever is left.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownResult {
        *self.state.write() = LifecycleState::Draining;
        tracing::info!(in_flight = self.in_flight_count(), "draining collection cycles");

        let result = self.wait_for_drain(timeout).await;
        if let ShutdownResult::Timeout { remaining } = result {
            tracing::warn!(remaining, "drain timed out, cancelling in-flight cycles");
        }
        self.cancel.cancel();

        *self.state.write() = LifecycleState::Stopped;
        result
    }

    async fn wait_for_drain(&self, timeout: Duration) -> ShutdownResult {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.notify.notified();
            let count = self.in_flight_count();
            if count == 0 {
                return ShutdownResult::Complete;
            }

            let remaining_time = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining_time.is_zero() {
                return ShutdownResult::Timeout { remaining: count };
            }

            tokio::select! {
                _ = notified => continue,
                _ = tokio::time::sleep(remaining_time) => {
                    let final_count = self.in_flight_count();
                    if final_count == 0 {
                        return ShutdownResult::Complete;
                    }
                    return ShutdownResult::Timeout { remaining: final_count };
                }
            }
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for in-flight cycle tracking.
pub struct CycleGuard {
    counter: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}
