//! Typed, namespaced publish/subscribe used by the context and by metrics.
//!
//! Listeners are registered under a [`ListenerKey`]: an [`EventType`] plus a
//! free-form qualifier, so several independent subscribers can listen to the
//! same event type and each can be removed on its own. The textual form
//! `"type.qualifier"` is accepted through [`FromStr`].
//!
//! Emission is synchronous and runs on the caller's thread. The listener list
//! is snapshotted before any listener runs, so a listener may subscribe,
//! unsubscribe or emit again from inside its callback.

use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;

use crate::error::Error;
use crate::time::{Timestamp, Window};

// ─────────────────────────────────────────────────────────────────────────────
// EventType
// ─────────────────────────────────────────────────────────────────────────────

/// The four phases a context broadcasts.
///
/// Within one tick the order is always `Prepare`, `BeforeChange`, `Change`,
/// `Focus`. `Focus` is additionally emitted on its own whenever the focus
/// index is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Prepare,
    BeforeChange,
    Change,
    Focus,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::Prepare,
        EventType::BeforeChange,
        EventType::Change,
        EventType::Focus,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            EventType::Prepare => "prepare",
            EventType::BeforeChange => "beforechange",
            EventType::Change => "change",
            EventType::Focus => "focus",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::UnknownEvent(s.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ListenerKey
// ─────────────────────────────────────────────────────────────────────────────

/// Identifies one subscription: `(event type, qualifier)`.
///
/// The empty qualifier is the "bare" subscription, i.e. `"change"` as opposed
/// to `"change.axis"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerKey {
    pub event: EventType,
    pub qualifier: String,
}

impl ListenerKey {
    pub fn new(event: EventType, qualifier: impl Into<String>) -> Self {
        Self {
            event,
            qualifier: qualifier.into(),
        }
    }

    pub fn bare(event: EventType) -> Self {
        Self::new(event, String::new())
    }

    pub fn prepare(qualifier: impl Into<String>) -> Self {
        Self::new(EventType::Prepare, qualifier)
    }

    pub fn before_change(qualifier: impl Into<String>) -> Self {
        Self::new(EventType::BeforeChange, qualifier)
    }

    pub fn change(qualifier: impl Into<String>) -> Self {
        Self::new(EventType::Change, qualifier)
    }

    pub fn focus(qualifier: impl Into<String>) -> Self {
        Self::new(EventType::Focus, qualifier)
    }
}

impl std::fmt::Display for ListenerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.qualifier.is_empty() {
            write!(f, "{}", self.event)
        } else {
            write!(f, "{}.{}", self.event, self.qualifier)
        }
    }
}

impl FromStr for ListenerKey {
    type Err = Error;

    /// Parse `"type"` or `"type.qualifier"`. Only the first dot separates; the
    /// qualifier may itself contain dots.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (event, qualifier) = match s.split_once('.') {
            Some((event, qualifier)) => (event, qualifier),
            None => (s, ""),
        };
        Ok(Self::new(event.parse()?, qualifier))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Anything that can be dispatched through an [`EventHub`].
pub trait Event {
    fn event_type(&self) -> EventType;
}

/// Events broadcast by a [`Context`](crate::Context).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextEvent {
    /// The window about to be displayed; metrics fetch the missing tail.
    Prepare(Window),
    /// The new window is being adopted; metrics slide their buffers.
    BeforeChange(Window),
    /// The new window is active; renderers redraw.
    Change(Window),
    /// The focused sample index (or none).
    Focus(Option<usize>),
}

impl ContextEvent {
    /// The window carried by the three tick phases.
    pub fn window(&self) -> Option<Window> {
        match self {
            ContextEvent::Prepare(w) | ContextEvent::BeforeChange(w) | ContextEvent::Change(w) => {
                Some(*w)
            }
            ContextEvent::Focus(_) => None,
        }
    }
}

impl Event for ContextEvent {
    fn event_type(&self) -> EventType {
        match self {
            ContextEvent::Prepare(_) => EventType::Prepare,
            ContextEvent::BeforeChange(_) => EventType::BeforeChange,
            ContextEvent::Change(_) => EventType::Change,
            ContextEvent::Focus(_) => EventType::Focus,
        }
    }
}

/// Events emitted by a [`Metric`](crate::Metric).
///
/// `start`/`stop` are unset until the metric has adopted its first window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricEvent {
    Change {
        start: Option<Timestamp>,
        stop: Option<Timestamp>,
    },
}

impl Event for MetricEvent {
    fn event_type(&self) -> EventType {
        match self {
            MetricEvent::Change { .. } => EventType::Change,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EventHub
// ─────────────────────────────────────────────────────────────────────────────

/// A registered callback.
pub type Listener<E> = Rc<dyn Fn(&E)>;

struct Entry<E> {
    key: ListenerKey,
    listener: Listener<E>,
}

/// Single-threaded registry of listeners keyed by [`ListenerKey`].
///
/// A key holds at most one listener; registering again replaces the previous
/// listener in place, keeping its position in the dispatch order.
pub struct EventHub<E> {
    entries: RefCell<Vec<Entry<E>>>,
}

impl<E: Event> EventHub<E> {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }

    /// Register `listener` under `key`, returning the listener it replaced.
    pub fn on(&self, key: ListenerKey, listener: Listener<E>) -> Option<Listener<E>> {
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.iter_mut().find(|e| e.key == key) {
            return Some(std::mem::replace(&mut entry.listener, listener));
        }
        entries.push(Entry { key, listener });
        None
    }

    /// Remove the listener registered under `key`.
    pub fn off(&self, key: &ListenerKey) -> Option<Listener<E>> {
        let mut entries = self.entries.borrow_mut();
        let pos = entries.iter().position(|e| &e.key == key)?;
        Some(entries.remove(pos).listener)
    }

    /// Exact lookup.
    pub fn listener(&self, key: &ListenerKey) -> Option<Listener<E>> {
        self.entries
            .borrow()
            .iter()
            .find(|e| &e.key == key)
            .map(|e| e.listener.clone())
    }

    pub fn contains(&self, key: &ListenerKey) -> bool {
        self.entries.borrow().iter().any(|e| &e.key == key)
    }

    /// First listener registered for `event`, whatever its qualifier.
    pub fn first(&self, event: EventType) -> Option<Listener<E>> {
        self.entries
            .borrow()
            .iter()
            .find(|e| e.key.event == event)
            .map(|e| e.listener.clone())
    }

    pub fn count(&self, event: EventType) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.key.event == event)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Invoke every listener for the event's type, in registration order.
    pub fn emit(&self, event: &E) {
        let event_type = event.event_type();
        let listeners: Vec<Listener<E>> = self
            .entries
            .borrow()
            .iter()
            .filter(|e| e.key.event == event_type)
            .map(|e| e.listener.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}

impl<E: Event> Default for EventHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────────────────────────
