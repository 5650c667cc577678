//! Metrics: time-aligned sample buffers, either fetched from a data source
//! (leaf) or derived from two other metrics (composite).
//!
//! [`Metric`] is the uniform handle renderers and callers work with; it is a
//! tagged variant over [`RegularMetric`] and [`CompositeMetric`]. Handles are
//! cheap to clone and clones refer to the same metric.

mod buffer;
mod composite;
mod regular;

use std::rc::Rc;

pub use buffer::{MetricBuffer, LOOKAHEAD};
pub use composite::CompositeMetric;
pub use regular::RegularMetric;

use crate::events::{Listener, ListenerKey, MetricEvent};
use crate::time::Timestamp;

// ─────────────────────────────────────────────────────────────────────────────
// Operator
// ─────────────────────────────────────────────────────────────────────────────

/// Binary operator of a composite metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operator {
    /// Symbol used in the default composite name.
    pub const fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
        }
    }

    #[inline]
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            Operator::Add => a + b,
            Operator::Subtract => a - b,
            Operator::Multiply => a * b,
            Operator::Divide => a / b,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum Metric {
    Regular(RegularMetric),
    Composite(CompositeMetric),
}

impl Metric {
    pub fn name(&self) -> String {
        match self {
            Metric::Regular(m) => m.name(),
            Metric::Composite(m) => m.name(),
        }
    }

    /// Rename the metric; returns the same handle for chaining.
    pub fn alias(self, name: impl Into<String>) -> Self {
        let name = name.into();
        match &self {
            Metric::Regular(m) => m.set_name(name),
            Metric::Composite(m) => m.set_name(name),
        }
        self
    }

    /// Sample at index `i` of the visible window; `NaN` when unknown.
    pub fn value_at(&self, i: usize) -> f64 {
        match self {
            Metric::Regular(m) => m.value_at(i),
            Metric::Composite(m) => m.value_at(i),
        }
    }

    /// `[min, max]` over the buffer; `[inf, -inf]` when there is nothing.
    pub fn extent(&self) -> [f64; 2] {
        match self {
            Metric::Regular(m) => m.extent(),
            Metric::Composite(m) => m.extent(),
        }
    }

    /// Subscribe `listener` under `key`.
    ///
    /// The first listener activates the metric: it starts following the
    /// context's ticks and fetches right away. `Change` listeners immediately
    /// receive the buffer's current `start`/`stop`.
    pub fn on<F>(&self, key: ListenerKey, listener: F)
    where
        F: Fn(&MetricEvent) + 'static,
    {
        self.subscribe(key, Rc::new(listener));
    }

    pub fn subscribe(&self, key: ListenerKey, listener: Listener<MetricEvent>) {
        match self {
            Metric::Regular(m) => m.subscribe(key, listener),
            Metric::Composite(m) => m.subscribe(key, listener),
        }
    }

    /// Remove the listener under `key`. Removing the last one makes the metric
    /// dormant: no further fetches are issued.
    pub fn off(&self, key: &ListenerKey) -> Option<Listener<MetricEvent>> {
        match self {
            Metric::Regular(m) => m.off(key),
            Metric::Composite(m) => m.off(key),
        }
    }

    pub fn listener(&self, key: &ListenerKey) -> Option<Listener<MetricEvent>> {
        match self {
            Metric::Regular(m) => m.listener(key),
            Metric::Composite(m) => m.listener(key),
        }
    }

    pub fn listener_count(&self) -> usize {
        match self {
            Metric::Regular(m) => m.listener_count(),
            Metric::Composite(m) => m.listener_count(),
        }
    }

    /// Whether the metric currently follows the context.
    pub fn is_active(&self) -> bool {
        match self {
            Metric::Regular(m) => m.listener_count() > 0,
            Metric::Composite(m) => m.is_active(),
        }
    }

    /// Fetch what is missing for the window starting at `start1`.
    pub fn prepare(&self, start1: Timestamp, stop: Timestamp) {
        match self {
            Metric::Regular(m) => m.prepare(start1, stop),
            Metric::Composite(m) => m.prepare(start1, stop),
        }
    }

    /// The same series moved by `offset` ms, e.g. `-86_400_000` for "yesterday".
    pub fn shift(&self, offset: i64) -> Metric {
        match self {
            Metric::Regular(m) => Metric::Regular(m.shift(offset)),
            Metric::Composite(m) => Metric::Composite(m.shift(offset)),
        }
    }

    pub fn combine(&self, other: &Metric, operator: Operator) -> Metric {
        Metric::Composite(CompositeMetric::new(self.clone(), other.clone(), operator))
    }

    pub fn add(&self, other: &Metric) -> Metric {
        self.combine(other, Operator::Add)
    }

    pub fn subtract(&self, other: &Metric) -> Metric {
        self.combine(other, Operator::Subtract)
    }

    pub fn multiply(&self, other: &Metric) -> Metric {
        self.combine(other, Operator::Multiply)
    }

    pub fn divide(&self, other: &Metric) -> Metric {
        self.combine(other, Operator::Divide)
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

impl std::fmt::Debug for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Regular(m) => std::fmt::Debug::fmt(m, f),
            Metric::Composite(m) => std::fmt::Debug::fmt(m, f),
        }
    }
}

impl From<RegularMetric> for Metric {
    fn from(m: RegularMetric) -> Self {
        Metric::Regular(m)
    }
}

impl From<CompositeMetric> for Metric {
    fn from(m: CompositeMetric) -> Self {
        Metric::Composite(m)
    }
}

macro_rules! impl_metric_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait<&Metric> for &Metric {
            type Output = Metric;

            fn $method(self, rhs: &Metric) -> Metric {
                self.combine(rhs, $op)
            }
        }
    };
}

impl_metric_op!(Add, add, Operator::Add);
impl_metric_op!(Sub, sub, Operator::Subtract);
impl_metric_op!(Mul, mul, Operator::Multiply);
impl_metric_op!(Div, div, Operator::Divide);
