//! # Counter Clock Core Library
//!
//! A countdown/count-up timer widget engine. Given a target timestamp, a
//! [`counter::Counter`] periodically recomputes the offset between "now" and
//! the target and writes the digits into marked nodes of a presentation
//! surface.
//!
//! ## Design Philosophy
//!
//! ### The surface is a collaborator, not a dependency
//! The counter never assumes a particular UI toolkit. It talks to a
//! [`surface::Surface`]: something that can parse a markup fragment, insert
//! and remove nodes, and read and write node text. [`document::Document`]
//! is the in-memory implementation used by the terminal binary and the tests.
//!
//! ### Every transition can be vetoed
//! `start`, `stop`, `tick`, `reset` and `destroy` are announced through an
//! [`events::EventBus`] before they take effect. A listener returning
//! [`events::Flow::Prevent`] cancels the transition. Listeners get the
//! counter itself and may call back into it; the counter re-checks its own
//! state after every dispatch.
//!
//! ### Markers, not layout
//! Which digit goes where is declared by class markers on the template's
//! nodes (`day`/`hrs`/`min`/`sec` plus `charN`). They are parsed once per
//! attach into [`digits::SlotMarkers`].
//!
//! ## Data Flow
//! 1. **Recompute**: [`offset::compute`] from the clock and the stored timestamp
//! 2. **Announce**: trigger the event, bail out if a listener prevented it
//! 3. **Render**: [`digits::render`] for each slot, writing only changed text
//!
//! ## Core Types
//! - [`Offset`]: the decomposed offset, recomputed on every tick
//! - [`Timestamp`]: milliseconds since the Unix epoch

use serde::{Deserialize, Serialize};

pub mod config;
pub mod counter;
pub mod digits;
pub mod document;
pub mod events;
pub mod offset;
pub mod options;
pub mod surface;
pub mod ticker;

pub use counter::{Counter, CounterBuilder, CounterError, State};
pub use document::{Document, NodeId};
pub use events::{BubblingBus, Event, EventKind, Flow, ListenerId, LocalBus};
pub use options::{OptionValue, Options};
pub use surface::{Surface, Target};

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// The offset between "now" and the target timestamp.
///
/// `signed_seconds` is positive once the target has passed and negative
/// while it is still ahead. The other fields are the magnitude of
/// `signed_seconds` split into days, hours (0-23), minutes (0-59) and
/// seconds (0-59); they never carry a sign.
///
/// # Example
/// ```
/// use counter_clock_lib::Offset;
///
/// let offset = Offset { signed_seconds: -3_661, days: 0, hours: 1, minutes: 1, seconds: 1 };
/// assert!(offset.is_pending());
/// assert_eq!(offset.total_seconds(), 3_661);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    /// Rounded whole seconds from the target to now
    pub signed_seconds: i64,
    /// Whole days in the magnitude
    pub days: u64,
    /// Remaining hours (0-23)
    pub hours: u64,
    /// Remaining minutes (0-59)
    pub minutes: u64,
    /// Remaining seconds (0-59)
    pub seconds: u64,
}

impl Offset {
    /// True while the target is still in the future.
    pub fn is_pending(&self) -> bool {
        self.signed_seconds < 0
    }

    /// Magnitude of the offset in seconds.
    pub fn total_seconds(&self) -> u64 {
        self.signed_seconds.unsigned_abs()
    }
}
