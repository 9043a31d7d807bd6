//! # Periodic Ticking
//!
//! A running counter holds a [`Ticker`]: the period and the wall-clock time
//! the next tick is due. Nothing fires on its own. The host event loop asks
//! the counter for its [`crate::Counter::next_deadline`], waits, and calls
//! [`crate::Counter::run_pending`]. [`drive`] is that loop on `tokio`.
//!
//! When the loop falls behind (a suspended laptop, a blocked thread) the
//! missed periods are skipped, not replayed: one tick fires and the next
//! one is scheduled on the same grid.

use std::time::Duration;

use tracing::{debug, trace};

use crate::counter::Counter;
use crate::surface::Surface;
use crate::Timestamp;

/// Handle of a live periodic tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticker {
    period_ms: u64,
    next_due: Timestamp,
}

impl Ticker {
    /// A ticker whose first tick is one period after `now`.
    pub fn new(now: Timestamp, period_ms: u64) -> Self {
        let period_ms = period_ms.max(1);
        Self {
            period_ms,
            next_due: now.saturating_add(period_ms as i64),
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    pub fn next_due(&self) -> Timestamp {
        self.next_due
    }

    /// True if a tick is due at `now`. Consumes the tick and any periods
    /// missed since.
    ///
    /// ```
    /// use counter_clock_lib::ticker::Ticker;
    ///
    /// let mut ticker = Ticker::new(0, 1000);
    /// assert!(!ticker.poll(999));
    /// assert!(ticker.poll(1000));
    /// assert!(!ticker.poll(1000));
    ///
    /// // three periods late: one tick, back on the grid
    /// assert!(ticker.poll(4500));
    /// assert_eq!(ticker.next_due(), 5000);
    /// ```
    pub fn poll(&mut self, now: Timestamp) -> bool {
        if now < self.next_due {
            return false;
        }
        let period = self.period_ms as i64;
        let missed = (now - self.next_due) / period;
        if missed > 0 {
            trace!(missed, "skipping missed ticks");
        }
        self.next_due = self.next_due.saturating_add((missed + 1).saturating_mul(period));
        true
    }
}

/// Run the counter's ticks until it stops running.
///
/// Sleeps on the `tokio` timer until the next deadline, then lets the
/// counter tick. The counter is not `Send`; run this on a current-thread
/// runtime or inside a `LocalSet`. Returns when the counter is stopped or
/// destroyed, usually by one of its own listeners.
pub async fn drive<S: Surface + 'static>(counter: &mut Counter<S>) {
    drive_with(counter, |_| {}).await;
}

/// Like [`drive`], calling `after_tick` after every tick that fired.
pub async fn drive_with<S, F>(counter: &mut Counter<S>, mut after_tick: F)
where
    S: Surface + 'static,
    F: FnMut(&Counter<S>),
{
    debug!("driving counter");
    while let Some(due) = counter.next_deadline() {
        let wait = due.saturating_sub(counter.now_millis());
        if wait > 0 {
            tokio::time::sleep(Duration::from_millis(wait as u64)).await;
        }
        if counter.run_pending() {
            after_tick(counter);
        }
    }
    debug!("counter no longer running");
}
