//! # Cancelable Events
//!
//! Every counter transition is announced before it happens. Listeners get
//! the counter itself plus an [`Event`], and answer with a [`Flow`]:
//! `Continue` lets the transition proceed, `Prevent` cancels it and stops
//! any further listeners from running.
//!
//! Where listeners live and in which order they run is decided by an
//! [`EventBus`] strategy chosen when the counter is built:
//!
//! - [`LocalBus`]: a private listener table. Listeners run newest first.
//! - [`BubblingBus`]: listeners hang off the counter element and its
//!   ancestors in the presentation tree. The event starts at the counter
//!   element and bubbles outward; on each node listeners run in
//!   registration order. Event names are namespaced (`counter:tick`).
//!
//! The dispatcher snapshots the listener list before calling anyone, so a
//! listener may register or remove listeners, or call back into the counter,
//! without disturbing the dispatch in progress.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::{Offset, Timestamp};

/// The transitions a counter announces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Stop,
    Tick,
    Reset,
    Destroy,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Start,
        EventKind::Stop,
        EventKind::Tick,
        EventKind::Reset,
        EventKind::Destroy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Stop => "stop",
            EventKind::Tick => "tick",
            EventKind::Reset => "reset",
            EventKind::Destroy => "destroy",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A listener's answer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Flow {
    #[default]
    Continue,
    /// Cancel the pending transition and skip the remaining listeners
    Prevent,
}

/// What a listener is told about the transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// Name as dispatched, including any namespace
    pub name: String,
    /// The offset computed just before dispatch
    pub offset: Offset,
    /// Wall-clock time of the dispatch
    pub time_stamp: Timestamp,
}

/// Handle returned by `on`, used to remove exactly that listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// A listener over context `C` (the counter, in practice).
pub type Listener<C> = Rc<dyn Fn(&mut C, &Event) -> Flow>;

/// Listener storage and routing strategy.
///
/// `N` is the node handle of the presentation surface; strategies that do
/// not care about the tree ignore it.
pub trait EventBus<C, N> {
    /// Register a listener on the counter itself.
    fn on(&mut self, kind: EventKind, listener: Listener<C>) -> ListenerId;

    /// Register a listener on a node of the presentation tree. Strategies
    /// without a notion of tree return `None` and drop the listener.
    fn on_node(&mut self, _node: N, _kind: EventKind, _listener: Listener<C>) -> Option<ListenerId> {
        None
    }

    /// Remove the listener `id`, or every listener for `kind` when `id` is
    /// `None`. Returns how many were removed.
    fn off(&mut self, kind: EventKind, id: Option<ListenerId>) -> usize;

    /// The name the event is dispatched under.
    fn event_name(&self, kind: EventKind) -> String {
        kind.name().to_string()
    }

    /// Listeners to call for `kind`, in call order. `ancestors` lists the
    /// parents of the counter element from nearest to farthest.
    fn route(&self, kind: EventKind, ancestors: &[N]) -> Vec<Listener<C>>;

    fn listener_count(&self, kind: EventKind) -> usize;
}

/// Call `listeners` in order until one prevents the event.
///
/// Returns `true` if nobody prevented it.
pub fn dispatch<C>(ctx: &mut C, listeners: &[Listener<C>], event: &Event) -> bool {
    for listener in listeners {
        if (**listener)(ctx, event) == Flow::Prevent {
            return false;
        }
    }
    true
}

#[derive(Debug, Default)]
struct IdSource(u64);

impl IdSource {
    fn next(&mut self) -> ListenerId {
        self.0 += 1;
        ListenerId(self.0)
    }
}

/// Private listener table; newest listener runs first.
pub struct LocalBus<C> {
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener<C>)>>,
    ids: IdSource,
}

impl<C> LocalBus<C> {
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
            ids: IdSource::default(),
        }
    }
}

impl<C> Default for LocalBus<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for LocalBus<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self
            .listeners
            .iter()
            .map(|(kind, list)| (kind.name(), list.len()))
            .collect();
        f.debug_struct("LocalBus").field("listeners", &counts).finish()
    }
}

impl<C, N> EventBus<C, N> for LocalBus<C> {
    fn on(&mut self, kind: EventKind, listener: Listener<C>) -> ListenerId {
        let id = self.ids.next();
        self.listeners.entry(kind).or_default().push((id, listener));
        id
    }

    fn off(&mut self, kind: EventKind, id: Option<ListenerId>) -> usize {
        let Some(list) = self.listeners.get_mut(&kind) else {
            return 0;
        };
        let before = list.len();
        match id {
            Some(id) => list.retain(|(existing, _)| *existing != id),
            None => list.clear(),
        }
        before - list.len()
    }

    fn route(&self, kind: EventKind, _ancestors: &[N]) -> Vec<Listener<C>> {
        self.listeners
            .get(&kind)
            .map(|list| list.iter().rev().map(|(_, l)| Rc::clone(l)).collect())
            .unwrap_or_default()
    }

    fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }
}

/// Where a bubbling listener is attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scope<N> {
    /// Whatever element the counter is currently attached as
    Element,
    Node(N),
}

struct Registration<C, N> {
    scope: Scope<N>,
    kind: EventKind,
    id: ListenerId,
    listener: Listener<C>,
}

/// Listeners attached to the presentation tree, dispatched by bubbling.
pub struct BubblingBus<C, N> {
    namespace: String,
    registrations: Vec<Registration<C, N>>,
    ids: IdSource,
}

/// Namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = "counter";

impl<C, N> BubblingBus<C, N> {
    pub fn new() -> Self {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }

    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            registrations: Vec::new(),
            ids: IdSource::default(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl<C, N> Default for BubblingBus<C, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, N> fmt::Debug for BubblingBus<C, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BubblingBus")
            .field("namespace", &self.namespace)
            .field("registrations", &self.registrations.len())
            .finish()
    }
}

impl<C, N: Copy + PartialEq> EventBus<C, N> for BubblingBus<C, N> {
    fn on(&mut self, kind: EventKind, listener: Listener<C>) -> ListenerId {
        let id = self.ids.next();
        self.registrations.push(Registration {
            scope: Scope::Element,
            kind,
            id,
            listener,
        });
        id
    }

    fn on_node(&mut self, node: N, kind: EventKind, listener: Listener<C>) -> Option<ListenerId> {
        let id = self.ids.next();
        self.registrations.push(Registration {
            scope: Scope::Node(node),
            kind,
            id,
            listener,
        });
        Some(id)
    }

    fn off(&mut self, kind: EventKind, id: Option<ListenerId>) -> usize {
        let before = self.registrations.len();
        self.registrations
            .retain(|r| r.kind != kind || id.is_some_and(|id| r.id != id));
        before - self.registrations.len()
    }

    fn event_name(&self, kind: EventKind) -> String {
        format!("{}:{}", self.namespace, kind.name())
    }

    fn route(&self, kind: EventKind, ancestors: &[N]) -> Vec<Listener<C>> {
        let scopes = std::iter::once(Scope::Element).chain(ancestors.iter().map(|&n| Scope::Node(n)));
        let mut out = Vec::new();
        for scope in scopes {
            out.extend(
                self.registrations
                    .iter()
                    .filter(|r| r.kind == kind && r.scope == scope)
                    .map(|r| Rc::clone(&r.listener)),
            );
        }
        out
    }

    fn listener_count(&self, kind: EventKind) -> usize {
        self.registrations.iter().filter(|r| r.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Vec<&'static str>;

    fn event(kind: EventKind) -> Event {
        Event {
            kind,
            name: kind.name().to_string(),
            offset: Offset::default(),
            time_stamp: 0,
        }
    }

    fn record(tag: &'static str, flow: Flow) -> Listener<Log> {
        Rc::new(move |log: &mut Log, _: &Event| {
            log.push(tag);
            flow
        })
    }

    fn trigger<B: EventBus<Log, u32>>(bus: &B, kind: EventKind, ancestors: &[u32]) -> (Log, bool) {
        let mut log = Log::new();
        let listeners = bus.route(kind, ancestors);
        let proceed = dispatch(&mut log, &listeners, &event(kind));
        (log, proceed)
    }

    #[test]
    fn test_local_bus_runs_newest_first() {
        let mut bus = LocalBus::<Log>::new();
        EventBus::<Log, u32>::on(&mut bus, EventKind::Tick, record("a", Flow::Continue));
        EventBus::<Log, u32>::on(&mut bus, EventKind::Tick, record("b", Flow::Continue));

        let (log, proceed) = trigger(&bus, EventKind::Tick, &[]);
        assert_eq!(log, vec!["b", "a"]);
        assert!(proceed);
    }

    #[test]
    fn test_prevent_stops_remaining_listeners() {
        let mut bus = LocalBus::<Log>::new();
        EventBus::<Log, u32>::on(&mut bus, EventKind::Tick, record("a", Flow::Continue));
        EventBus::<Log, u32>::on(&mut bus, EventKind::Tick, record("b", Flow::Prevent));

        let (log, proceed) = trigger(&bus, EventKind::Tick, &[]);
        assert_eq!(log, vec!["b"]);
        assert!(!proceed);
    }

    #[test]
    fn test_events_without_listeners_proceed() {
        let bus = LocalBus::<Log>::new();
        let (log, proceed) = trigger(&bus, EventKind::Destroy, &[]);
        assert!(log.is_empty());
        assert!(proceed);
    }

    #[test]
    fn test_local_off() {
        let mut bus = LocalBus::<Log>::new();
        let a = EventBus::<Log, u32>::on(&mut bus, EventKind::Start, record("a", Flow::Continue));
        EventBus::<Log, u32>::on(&mut bus, EventKind::Start, record("b", Flow::Continue));
        EventBus::<Log, u32>::on(&mut bus, EventKind::Stop, record("c", Flow::Continue));

        assert_eq!(EventBus::<Log, u32>::off(&mut bus, EventKind::Start, Some(a)), 1);
        assert_eq!(trigger(&bus, EventKind::Start, &[]).0, vec!["b"]);

        // ids are per listener, not per kind
        assert_eq!(EventBus::<Log, u32>::off(&mut bus, EventKind::Stop, Some(a)), 0);

        assert_eq!(EventBus::<Log, u32>::off(&mut bus, EventKind::Start, None), 1);
        assert_eq!(EventBus::<Log, u32>::listener_count(&bus, EventKind::Start), 0);
        assert_eq!(EventBus::<Log, u32>::listener_count(&bus, EventKind::Stop), 1);
        assert_eq!(EventBus::<Log, u32>::off(&mut bus, EventKind::Reset, None), 0);
    }

    #[test]
    fn test_bubbling_order() {
        let mut bus = BubblingBus::<Log, u32>::new();
        bus.on_node(2, EventKind::Tick, record("grandparent", Flow::Continue));
        bus.on_node(1, EventKind::Tick, record("parent-1", Flow::Continue));
        bus.on(EventKind::Tick, record("element-1", Flow::Continue));
        bus.on(EventKind::Tick, record("element-2", Flow::Continue));
        bus.on_node(1, EventKind::Tick, record("parent-2", Flow::Continue));
        bus.on_node(9, EventKind::Tick, record("elsewhere", Flow::Continue));

        let (log, proceed) = trigger(&bus, EventKind::Tick, &[1, 2]);
        assert_eq!(
            log,
            vec!["element-1", "element-2", "parent-1", "parent-2", "grandparent"]
        );
        assert!(proceed);
    }

    #[test]
    fn test_bubbling_prevent_stops_propagation() {
        let mut bus = BubblingBus::<Log, u32>::new();
        bus.on(EventKind::Stop, record("element", Flow::Prevent));
        bus.on_node(1, EventKind::Stop, record("parent", Flow::Continue));

        let (log, proceed) = trigger(&bus, EventKind::Stop, &[1]);
        assert_eq!(log, vec!["element"]);
        assert!(!proceed);
    }

    #[test]
    fn test_bubbling_names_and_off() {
        let mut bus = BubblingBus::<Log, u32>::with_namespace("clock");
        assert_eq!(bus.event_name(EventKind::Reset), "clock:reset");

        let a = bus.on(EventKind::Tick, record("a", Flow::Continue));
        bus.on_node(1, EventKind::Tick, record("b", Flow::Continue));
        bus.on(EventKind::Start, record("c", Flow::Continue));

        assert_eq!(bus.off(EventKind::Tick, Some(a)), 1);
        assert_eq!(bus.listener_count(EventKind::Tick), 1);
        assert_eq!(bus.off(EventKind::Tick, None), 1);
        assert_eq!(bus.listener_count(EventKind::Start), 1);
    }

    #[test]
    fn test_event_kind_names() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(EventKind::from_name("pause"), None);
    }
}
