//! # The Counter Engine
//!
//! [`Counter`] ties the pieces together: it owns the options, the element
//! built from the template, the discovered slots and the ticker, and runs
//! every transition through the event bus.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized --attach--> Idle <--start/stop--> Running
//!        \                   |                       |
//!         `------------------+------destroy----------+--> Destroyed
//! ```
//!
//! `start`, `stop`, `reset` and `destroy` announce themselves first and are
//! abandoned if a listener prevents the event. Attaching, detaching and
//! changing options are infrastructure and announce nothing.
//!
//! ## One Tick
//! 1. recompute the offset
//! 2. trigger `tick`; stop here if prevented
//! 3. stop here if a listener stopped or destroyed the counter
//! 4. render
//!
//! Rendering writes a slot only when its text actually changes, so the host
//! surface is not disturbed once per second for digits that stay put.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, trace};

use crate::digits::{self, SlotMarkers};
use crate::events::{self, Event, EventBus, EventKind, Flow, ListenerId, LocalBus};
use crate::offset::{self, Clock, SystemClock};
use crate::options::{OptionKey, OptionStore, OptionValue, Options};
use crate::surface::{MarkupError, Surface, Target};
use crate::ticker::Ticker;
use crate::{Offset, Timestamp};

/// Class every slot node carries.
pub const SLOT_CLASS: &str = "digit";

/// Errors raised while building the counter element.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    /// The template must have exactly one top-level node
    #[error("template error: expected one top-level node, found {roots} (wrap everything around one element)")]
    Template { roots: usize },

    /// The surface could not parse the template
    #[error("template markup: {0}")]
    Markup(#[from] MarkupError),
}

/// Where a counter is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Not attached and not running
    Uninitialized,
    /// Attached, not ticking
    Idle,
    /// A ticker is live
    Running,
    /// Torn down; every operation is a no-op
    Destroyed,
}

/// A discovered slot: the node and its parsed markers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot<N> {
    pub node: N,
    pub markers: SlotMarkers,
}

type DynBus<S> = Box<dyn EventBus<Counter<S>, <S as Surface>::Node>>;

/// Countdown/count-up timer attached to a presentation surface.
///
/// # Example
/// ```
/// use counter_clock_lib::offset::ManualClock;
/// use counter_clock_lib::{Counter, Document, Options, Surface, Target};
///
/// let clock = ManualClock::new(1_000_000);
/// let doc = Document::parse(r#"<main id="app"></main>"#);
/// let mut counter = Counter::builder(doc)
///     .clock(clock.clone())
///     .options(Options::new().timestamp(1_000_000 - 93_784_000))
///     .build();
///
/// counter.attach(Target::selector("#app")).unwrap();
/// let root = counter.root().unwrap();
/// assert_eq!(counter.surface().text(root), "001020304");
/// assert_eq!(counter.offset(), Some(93_784));
/// ```
pub struct Counter<S: Surface + 'static> {
    surface: S,
    options: OptionStore,
    bus: DynBus<S>,
    clock: Box<dyn Clock>,
    root: Option<S::Node>,
    slots: Vec<Slot<S::Node>>,
    ticker: Option<Ticker>,
    calc: Option<Offset>,
    destroyed: bool,
}

/// Collects what a [`Counter`] is built from.
pub struct CounterBuilder<S: Surface + 'static> {
    surface: S,
    options: Options,
    bus: Option<DynBus<S>>,
    clock: Option<Box<dyn Clock>>,
}

impl<S: Surface + 'static> CounterBuilder<S> {
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Event strategy; [`LocalBus`] when not set.
    pub fn bus<B>(mut self, bus: B) -> Self
    where
        B: EventBus<Counter<S>, S::Node> + 'static,
    {
        self.bus = Some(Box::new(bus));
        self
    }

    /// Time source; [`SystemClock`] when not set.
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Build and initialize the counter without attaching it.
    pub fn build(self) -> Counter<S> {
        let clock: Box<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Box::new(SystemClock),
        };
        let bus: DynBus<S> = match self.bus {
            Some(bus) => bus,
            None => Box::new(LocalBus::<Counter<S>>::new()),
        };
        let options = OptionStore::with_options(clock.now_millis(), &self.options);
        let mut counter = Counter {
            surface: self.surface,
            options,
            bus,
            clock,
            root: None,
            slots: Vec::new(),
            ticker: None,
            calc: None,
            destroyed: false,
        };
        counter.init();
        counter
    }

    /// Build, attach to `target`, and start if `autostart` is set.
    pub fn mount(self, target: impl Into<Target<S::Node>>) -> Result<Counter<S>, CounterError> {
        let mut counter = self.build();
        counter.attach(target)?;
        if counter.options.autostart() {
            counter.start();
        }
        Ok(counter)
    }
}

impl<S: Surface + 'static> Counter<S> {
    pub fn builder(surface: S) -> CounterBuilder<S> {
        CounterBuilder {
            surface,
            options: Options::new(),
            bus: None,
            clock: None,
        }
    }

    /// A detached counter with default options.
    pub fn new(surface: S) -> Self {
        Self::builder(surface).build()
    }

    /// A detached counter with `options` merged over the defaults.
    pub fn with_options(surface: S, options: Options) -> Self {
        Self::builder(surface).options(options).build()
    }

    /// Build, attach and optionally autostart in one go.
    pub fn mount(
        surface: S,
        target: impl Into<Target<S::Node>>,
        options: Options,
    ) -> Result<Self, CounterError> {
        Self::builder(surface).options(options).mount(target)
    }

    /// Compute the initial offset.
    pub fn init(&mut self) {
        self.recalc();
    }

    // -- Lifecycle --

    /// Build the element from the template and append it to `target`.
    ///
    /// The current element, if any, is removed first. The template is parsed
    /// before anything else happens, so a bad template leaves the current
    /// attachment in place. Ticking is not affected.
    pub fn attach(&mut self, target: impl Into<Target<S::Node>>) -> Result<(), CounterError> {
        if self.destroyed {
            return Ok(());
        }
        let target = target.into();
        let element = self.build_element()?;

        self.release_root();
        match target.resolve(&self.surface) {
            Some(parent) => self.surface.append_child(parent, element),
            None => debug!("attaching counter without a parent"),
        }

        self.slots = self
            .surface
            .descendants(element)
            .into_iter()
            .filter_map(|node| {
                let class_name = self.surface.class_name(node);
                class_name
                    .split_whitespace()
                    .any(|class| class == SLOT_CLASS)
                    .then(|| Slot {
                        node,
                        markers: SlotMarkers::parse(&class_name),
                    })
            })
            .collect();
        self.root = Some(element);
        debug!(slots = self.slots.len(), "counter attached");

        self.recalc();
        self.render();
        Ok(())
    }

    fn build_element(&mut self) -> Result<S::Node, CounterError> {
        let mut nodes = self.surface.parse_fragment(self.options.template())?;
        if nodes.len() != 1 {
            let roots = nodes.len();
            for node in nodes {
                self.surface.discard(node);
            }
            return Err(CounterError::Template { roots });
        }
        Ok(nodes.remove(0))
    }

    /// Stop ticking and take the element out of the surface.
    pub fn detach(&mut self) {
        if self.ticker.take().is_some() {
            debug!("ticker cancelled by detach");
        }
        self.release_root();
    }

    fn release_root(&mut self) {
        if let Some(root) = self.root.take() {
            self.surface.remove(root);
            self.surface.discard(root);
        }
        self.slots.clear();
    }

    /// Start ticking. A listener may prevent it.
    pub fn start(&mut self) {
        if self.destroyed || self.ticker.is_some() {
            return;
        }
        self.recalc();
        if !self.trigger(EventKind::Start) {
            return;
        }
        // a start listener may have destroyed or started us already
        if self.destroyed || self.ticker.is_some() {
            return;
        }
        self.render();
        self.ticker = Some(Ticker::new(self.now_millis(), self.options.interval_ms()));
        debug!(interval_ms = self.options.interval_ms(), "counter started");
    }

    /// Stop ticking. A listener may prevent it.
    pub fn stop(&mut self) {
        if self.destroyed || self.ticker.is_none() {
            return;
        }
        self.recalc();
        if !self.trigger(EventKind::Stop) {
            return;
        }
        self.ticker = None;
        debug!("counter stopped");
    }

    pub fn toggle(&mut self) {
        if self.ticker.is_some() {
            self.stop();
        } else {
            self.start();
        }
    }

    /// Zero every slot, bypassing the formatter. A listener may prevent it.
    pub fn reset(&mut self) {
        if self.destroyed {
            return;
        }
        if !self.trigger(EventKind::Reset) {
            return;
        }
        for slot in &self.slots {
            if self.surface.text(slot.node) != "0" {
                self.surface.set_text(slot.node, "0");
            }
        }
    }

    /// Tear the counter down. A listener may prevent it, in which case
    /// nothing at all happens.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        if !self.trigger(EventKind::Destroy) {
            return;
        }
        if self.destroyed {
            return;
        }
        self.ticker = None;
        self.release_root();
        self.calc = None;
        for kind in EventKind::ALL {
            self.bus.off(kind, None);
        }
        self.destroyed = true;
        debug!("counter destroyed");
    }

    // -- Ticking --

    /// When the next tick is due, if running.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.ticker.map(|ticker| ticker.next_due())
    }

    /// Fire the tick if it is due. Returns whether it fired.
    pub fn run_pending(&mut self) -> bool {
        let now = self.now_millis();
        let due = self.ticker.as_mut().is_some_and(|ticker| ticker.poll(now));
        if due {
            self.tick();
        }
        due
    }

    fn tick(&mut self) {
        self.recalc();
        if !self.trigger(EventKind::Tick) {
            return;
        }
        // a tick listener may have stopped or destroyed us
        if self.ticker.is_none() {
            return;
        }
        self.render();
    }

    // -- Values --

    /// Signed seconds of the last computation.
    pub fn offset(&self) -> Option<i64> {
        self.calc.map(|calc| calc.signed_seconds)
    }

    /// The full last computed offset.
    pub fn current(&self) -> Option<Offset> {
        self.calc
    }

    pub fn timestamp(&self) -> Timestamp {
        self.options.timestamp()
    }

    /// Set the target from anything that reads as a number: integers, finite
    /// floats, numeric text. Other values are ignored.
    pub fn set_timestamp(&mut self, value: impl Into<OptionValue>) -> bool {
        if self.destroyed {
            return false;
        }
        let value = value.into();
        let Some(millis) = value.to_integer() else {
            debug!(%value, "ignoring timestamp that is not a number");
            return false;
        };
        self.options
            .write(OptionKey::Timestamp, &OptionValue::Integer(millis));
        self.recalc();
        self.render();
        true
    }

    pub fn option(&self, name: &str) -> Option<OptionValue> {
        self.options.get(name).cloned()
    }

    /// Change one option.
    ///
    /// Unknown keys and values of the wrong kind are ignored (`Ok(false)`).
    /// A new template rebuilds the element under the same parent; if the
    /// template is invalid the old one is kept and the error returned.
    pub fn set_option(
        &mut self,
        name: &str,
        value: impl Into<OptionValue>,
    ) -> Result<bool, CounterError> {
        if self.destroyed {
            return Ok(false);
        }
        let Some(key) = OptionKey::from_name(name) else {
            debug!(option = name, "ignoring unknown option");
            return Ok(false);
        };
        let previous = self.options.get(name).cloned();
        if !self.options.write(key, &value.into()) {
            return Ok(false);
        }

        match key {
            OptionKey::Template => {
                let parent = self.root.and_then(|root| self.surface.parent(root));
                if let Err(err) = self.attach(parent) {
                    match previous {
                        Some(previous) => {
                            self.options.write(key, &previous);
                        }
                        None => self.options.restore_default(key),
                    }
                    return Err(err);
                }
            }
            OptionKey::Interval => {
                if self.ticker.is_some() {
                    self.ticker = Some(Ticker::new(self.now_millis(), self.options.interval_ms()));
                }
            }
            OptionKey::Timestamp | OptionKey::Autostart => {}
        }

        self.recalc();
        self.render();
        Ok(true)
    }

    pub fn template(&self) -> &str {
        self.options.template()
    }

    pub fn set_template(&mut self, template: impl Into<String>) -> Result<bool, CounterError> {
        self.set_option(OptionKey::Template.name(), template.into())
    }

    pub fn options(&self) -> &OptionStore {
        &self.options
    }

    // -- Events --

    /// Listen on the counter.
    pub fn on<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&mut Self, &Event) -> Flow + 'static,
    {
        self.bus.on(kind, Rc::new(listener))
    }

    /// Listen on a node of the surface; only bubbling buses support this.
    pub fn on_node<F>(&mut self, node: S::Node, kind: EventKind, listener: F) -> Option<ListenerId>
    where
        F: Fn(&mut Self, &Event) -> Flow + 'static,
    {
        self.bus.on_node(node, kind, Rc::new(listener))
    }

    /// Remove listener `id`, or all listeners for `kind`.
    pub fn off(&mut self, kind: EventKind, id: Option<ListenerId>) -> usize {
        self.bus.off(kind, id)
    }

    /// Announce `kind`; `true` if nobody prevented it.
    fn trigger(&mut self, kind: EventKind) -> bool {
        let ancestors = self.ancestors();
        let listeners = self.bus.route(kind, &ancestors);
        if listeners.is_empty() {
            return true;
        }
        let event = Event {
            kind,
            name: self.bus.event_name(kind),
            offset: self.calc.unwrap_or_default(),
            time_stamp: self.now_millis(),
        };
        let proceed = events::dispatch(self, &listeners, &event);
        if !proceed {
            debug!(event = %event.name, "event prevented");
        }
        proceed
    }

    fn ancestors(&self) -> Vec<S::Node> {
        let mut out = Vec::new();
        let mut current = self.root.and_then(|root| self.surface.parent(root));
        while let Some(node) = current {
            out.push(node);
            current = self.surface.parent(node);
        }
        out
    }

    // -- Rendering --

    fn recalc(&mut self) {
        let offset = offset::compute(self.now_millis(), self.options.timestamp());
        trace!(signed_seconds = offset.signed_seconds, "recalculated");
        self.calc = Some(offset);
    }

    fn render(&mut self) {
        let Some(offset) = self.calc else {
            return;
        };
        for slot in &self.slots {
            let Some(text) = digits::render(&offset, &slot.markers) else {
                continue;
            };
            if self.surface.text(slot.node) != text {
                self.surface.set_text(slot.node, &text);
            }
        }
    }

    // -- Accessors --

    pub fn state(&self) -> State {
        if self.destroyed {
            State::Destroyed
        } else if self.ticker.is_some() {
            State::Running
        } else if self.root.is_some() {
            State::Idle
        } else {
            State::Uninitialized
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn is_attached(&self) -> bool {
        self.root.is_some()
    }

    /// The counter element.
    pub fn root(&self) -> Option<S::Node> {
        self.root
    }

    pub fn slots(&self) -> &[Slot<S::Node>] {
        &self.slots
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Mutable access to the surface. Editing the counter's own subtree
    /// behind its back is not supported.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn now_millis(&self) -> Timestamp {
        self.clock.now_millis()
    }
}

impl<S: Surface + 'static> fmt::Debug for Counter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("state", &self.state())
            .field("root", &self.root)
            .field("slots", &self.slots.len())
            .field("ticker", &self.ticker)
            .field("offset", &self.offset())
            .finish()
    }
}
