//! # Offset Calculation
//!
//! Turns "now" and a target timestamp into a signed whole-second offset and
//! its day/hour/minute/second decomposition. The sign of the offset tells
//! whether the target is in the past (positive, counting up) or in the
//! future (negative, counting down); the decomposed fields are always
//! magnitudes.
//!
//! ## Rounding
//! The millisecond difference is rounded to the nearest second, halves
//! toward positive infinity: -1.5 s is -1, 1.5 s is 2.
//!
//! ## Clocks
//! The counter never reads the wall clock directly. It asks a [`Clock`],
//! which is [`SystemClock`] in production and [`ManualClock`] in tests
//! that need to simulate the passage of time. [`TokioClock`] follows the
//! `tokio` timer, so a runtime with paused time drives it.

use std::cell::Cell;
use std::rc::Rc;

use chrono::Utc;
use tokio::time::Instant;

use crate::Offset;

const SECS_PER_DAY: u64 = 24 * 60 * 60;
const SECS_PER_HOUR: u64 = 60 * 60;
const SECS_PER_MINUTE: u64 = 60;

/// Compute the offset from `target_millis` to `now_millis`.
///
/// # Example
/// ```
/// use counter_clock_lib::offset::compute;
///
/// // 1 day, 2 hours, 3 minutes and 4 seconds before the target
/// let target = 1_000_000_000;
/// let now = target - (86_400 + 2 * 3_600 + 3 * 60 + 4) * 1_000;
/// let offset = compute(now, target);
///
/// assert_eq!(offset.signed_seconds, -93_784);
/// assert_eq!((offset.days, offset.hours, offset.minutes, offset.seconds), (1, 2, 3, 4));
/// ```
pub fn compute(now_millis: i64, target_millis: i64) -> Offset {
    let raw = now_millis.saturating_sub(target_millis);
    let signed_seconds = round_to_seconds(raw);

    let mut rest = signed_seconds.unsigned_abs();
    let days = rest / SECS_PER_DAY;
    rest -= days * SECS_PER_DAY;
    let hours = rest / SECS_PER_HOUR;
    rest -= hours * SECS_PER_HOUR;
    let minutes = rest / SECS_PER_MINUTE;
    rest -= minutes * SECS_PER_MINUTE;

    Offset {
        signed_seconds,
        days,
        hours,
        minutes,
        seconds: rest,
    }
}

/// Milliseconds to seconds, rounding halves toward positive infinity.
fn round_to_seconds(millis: i64) -> i64 {
    let whole = millis.div_euclid(1000);
    if millis.rem_euclid(1000) >= 500 {
        whole + 1
    } else {
        whole
    }
}

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock {
    fn now_millis(&self) -> i64;
}

/// The host wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can keep one handle
/// and give another to the counter.
///
/// ```
/// use counter_clock_lib::offset::{Clock, ManualClock};
///
/// let clock = ManualClock::new(5_000);
/// let handle = clock.clone();
/// clock.advance(1_500);
/// assert_eq!(handle.now_millis(), 6_500);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<i64>>,
}

impl ManualClock {
    pub fn new(now_millis: i64) -> Self {
        Self {
            now: Rc::new(Cell::new(now_millis)),
        }
    }

    pub fn set(&self, now_millis: i64) {
        self.now.set(now_millis);
    }

    pub fn advance(&self, millis: i64) {
        self.now.set(self.now.get() + millis);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.get()
    }
}

/// Wall-clock time that advances with `tokio::time::Instant`.
///
/// Anchored to a wall-clock reading when created. Under
/// `#[tokio::test(start_paused = true)]` it only moves when the runtime
/// auto-advances or `tokio::time::advance` is called.
#[derive(Clone, Copy, Debug)]
pub struct TokioClock {
    anchor_millis: i64,
    anchored_at: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now().timestamp_millis())
    }

    pub fn starting_at(now_millis: i64) -> Self {
        Self {
            anchor_millis: now_millis,
            anchored_at: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> i64 {
        let elapsed = i64::try_from(self.anchored_at.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.anchor_millis.saturating_add(elapsed)
    }
}
