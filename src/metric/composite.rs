//! Derived metric combining two operands with a binary operator.

use std::cell::RefCell;
use std::rc::Rc;

use super::{Metric, Operator};
use crate::events::{Listener, ListenerKey, MetricEvent};
use crate::time::Timestamp;

struct CompositeInner {
    left: Metric,
    right: Metric,
    operator: Operator,
    name: RefCell<String>,
}

/// `left <op> right`, computed on every access.
///
/// Holds no buffer and no data source of its own. Listeners and `prepare`
/// calls are forwarded to both operands, which keep fetching and sliding
/// independently; operands may be shared with other charts.
#[derive(Clone)]
pub struct CompositeMetric {
    inner: Rc<CompositeInner>,
}

impl CompositeMetric {
    pub fn new(left: Metric, right: Metric, operator: Operator) -> Self {
        let name = format!("{} {} {}", left, operator.symbol(), right);
        Self {
            inner: Rc::new(CompositeInner {
                left,
                right,
                operator,
                name: RefCell::new(name),
            }),
        }
    }

    pub fn left(&self) -> &Metric {
        &self.inner.left
    }

    pub fn right(&self) -> &Metric {
        &self.inner.right
    }

    pub fn operator(&self) -> Operator {
        self.inner.operator
    }

    pub fn name(&self) -> String {
        self.inner.name.borrow().clone()
    }

    pub fn set_name(&self, name: String) {
        *self.inner.name.borrow_mut() = name;
    }

    pub fn value_at(&self, i: usize) -> f64 {
        self.inner
            .operator
            .apply(self.inner.left.value_at(i), self.inner.right.value_at(i))
    }

    /// Extent of the left operand only; an approximation of the true extent.
    pub fn extent(&self) -> [f64; 2] {
        self.inner.left.extent()
    }

    /// Register `listener` on both operands. It may therefore fire once per
    /// operand for the same tick.
    pub fn subscribe(&self, key: ListenerKey, listener: Listener<MetricEvent>) {
        self.inner.left.subscribe(key.clone(), listener.clone());
        self.inner.right.subscribe(key, listener);
    }

    /// Remove the listener from both operands, returning the left one's.
    pub fn off(&self, key: &ListenerKey) -> Option<Listener<MetricEvent>> {
        let removed = self.inner.left.off(key);
        self.inner.right.off(key);
        removed
    }

    /// Lookup goes to the left operand, which stands in for the pair.
    pub fn listener(&self, key: &ListenerKey) -> Option<Listener<MetricEvent>> {
        self.inner.left.listener(key)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.left.listener_count()
    }

    pub fn is_active(&self) -> bool {
        self.inner.left.is_active() || self.inner.right.is_active()
    }

    pub fn prepare(&self, start1: Timestamp, stop: Timestamp) {
        self.inner.left.prepare(start1, stop);
        self.inner.right.prepare(start1, stop);
    }

    /// Shift both operands; the operator is kept.
    pub fn shift(&self, offset: i64) -> CompositeMetric {
        CompositeMetric::new(
            self.inner.left.shift(offset),
            self.inner.right.shift(offset),
            self.inner.operator,
        )
    }
}

impl std::fmt::Debug for CompositeMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeMetric")
            .field("name", &*self.inner.name.borrow())
            .field("operator", &self.inner.operator)
            .field("left", &self.inner.left)
            .field("right", &self.inner.right)
            .finish()
    }
}
