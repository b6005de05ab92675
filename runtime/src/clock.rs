//! Time source and cooperative cancellation for the capture/playback loops.
//!
//! The loops only suspend inside [`Clock::sleep_until`], and that is also
//! where a pending cancellation is noticed. A bus read or write in flight is
//! never interrupted.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::cell::Cell;
use std::time::{Duration, Instant};

/// Tail of each wait that is spun instead of parked, for sub-millisecond pacing.
const SPIN_MARGIN: Duration = Duration::from_millis(2);

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Elapsed,
    Cancelled,
}

/// Monotonic time source the loops are paced against.
pub trait Clock {
    /// Time since the clock's epoch.
    fn now(&self) -> Duration;

    /// Block until `deadline` on this clock's timeline, or until `cancel`
    /// fires. A deadline in the past returns immediately.
    fn sleep_until(&mut self, deadline: Duration, cancel: &CancelToken) -> Wake;
}

/// Wall clock backed by [`Instant`].
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn sleep_until(&mut self, deadline: Duration, cancel: &CancelToken) -> Wake {
        let remaining = deadline.saturating_sub(self.now());
        if cancel.wait(remaining) {
            Wake::Cancelled
        } else {
            Wake::Elapsed
        }
    }
}

/// Create a linked cancellation handle/token pair.
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = bounded(1);
    (
        CancelHandle { tx },
        CancelToken {
            rx,
            cancelled: Cell::new(false),
        },
    )
}

/// Sending side. Cheap to clone and safe to move into a signal handler.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Sender<()>,
}

impl CancelHandle {
    /// Request cancellation. Repeated requests collapse into one.
    pub fn cancel(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Receiving side, checked by the loop at iteration boundaries.
/// Once cancelled it stays cancelled until [`reset`](Self::reset).
pub struct CancelToken {
    rx: Receiver<()>,
    cancelled: Cell<bool>,
}

impl CancelToken {
    /// A token no one can cancel.
    pub fn never() -> Self {
        cancellation().1
    }

    pub fn is_cancelled(&self) -> bool {
        if !self.cancelled.get() && self.rx.try_recv().is_ok() {
            self.cancelled.set(true);
        }
        self.cancelled.get()
    }

    /// Clear a previous cancellation so the token can guard another run.
    pub fn reset(&self) {
        self.cancelled.set(false);
        while self.rx.try_recv().is_ok() {}
    }

    /// Wait up to `timeout`. Returns true if cancelled before or during the wait.
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }

        let deadline = Instant::now() + timeout;
        let parked = timeout.saturating_sub(SPIN_MARGIN);
        if !parked.is_zero() {
            match self.rx.recv_timeout(parked) {
                Ok(()) => {
                    self.cancelled.set(true);
                    return true;
                }
                // Every handle dropped: nothing can cancel, sleep out the rest.
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
            }
        }

        spin_sleep::sleep(deadline.saturating_duration_since(Instant::now()));
        self.is_cancelled()
    }
}
