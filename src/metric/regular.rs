//! Leaf metric: bridges one [`DataSource`] into the fetch-and-slide lifecycle.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use super::buffer::{MetricBuffer, LOOKAHEAD};
use crate::context::Context;
use crate::events::{EventHub, EventType, Listener, ListenerKey, MetricEvent};
use crate::source::{DataSource, FetchResult, ShiftedSource};
use crate::time::{Timestamp, Window};

struct RegularInner {
    id: u64,
    context: Context,
    source: Rc<dyn DataSource>,
    name: RefCell<String>,
    buffer: RefCell<MetricBuffer>,
    events: EventHub<MetricEvent>,
    /// Number of distinct listener keys; non-zero means attached to the context.
    listening: Cell<usize>,
}

impl RegularInner {
    fn qualifier(&self) -> String {
        format!("metric-{}", self.id)
    }

    fn detach(&self) {
        let qualifier = self.qualifier();
        self.context.off(&ListenerKey::prepare(qualifier.clone()));
        self.context.off(&ListenerKey::before_change(qualifier));
    }
}

impl Drop for RegularInner {
    fn drop(&mut self) {
        if self.listening.get() > 0 {
            self.detach();
        }
    }
}

/// A metric whose samples come from a data source.
///
/// Dormant while nobody listens to it. The first listener attaches it to the
/// context's `Prepare` and `BeforeChange` events; removing the last one
/// detaches it again, after which it issues no further requests.
#[derive(Clone)]
pub struct RegularMetric {
    inner: Rc<RegularInner>,
}

impl RegularMetric {
    pub fn new(context: Context, source: Rc<dyn DataSource>, name: String) -> Self {
        Self {
            inner: Rc::new(RegularInner {
                id: context.generate_id(),
                context,
                source,
                name: RefCell::new(name),
                buffer: RefCell::new(MetricBuffer::new()),
                events: EventHub::new(),
                listening: Cell::new(0),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn name(&self) -> String {
        self.inner.name.borrow().clone()
    }

    pub fn set_name(&self, name: String) {
        *self.inner.name.borrow_mut() = name;
    }

    /// A copy of the current buffer.
    pub fn snapshot(&self) -> MetricBuffer {
        self.inner.buffer.borrow().clone()
    }

    pub fn value_at(&self, i: usize) -> f64 {
        self.inner.buffer.borrow().value_at(i)
    }

    pub fn extent(&self) -> [f64; 2] {
        let size = self.inner.context.size();
        self.inner.buffer.borrow().extent(size)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listening.get()
    }

    /// A metric over the same source with every request moved by `offset` ms.
    pub fn shift(&self, offset: i64) -> RegularMetric {
        let source = Rc::new(ShiftedSource::new(self.inner.source.clone(), offset));
        RegularMetric::new(self.inner.context.clone(), source, self.name())
    }

    // ── Listeners ───────────────────────────────────────────────────────

    pub fn subscribe(&self, key: ListenerKey, listener: Listener<MetricEvent>) {
        let event_type = key.event;
        if !self.inner.events.contains(&key) {
            let listening = self.inner.listening.get() + 1;
            self.inner.listening.set(listening);
            if listening == 1 {
                self.attach();
            }
        }
        self.inner.events.on(key, listener.clone());

        if event_type == EventType::Change {
            let (start, stop) = {
                let buffer = self.inner.buffer.borrow();
                (buffer.start(), buffer.stop())
            };
            listener(&MetricEvent::Change { start, stop });
        }
    }

    pub fn off(&self, key: &ListenerKey) -> Option<Listener<MetricEvent>> {
        let removed = self.inner.events.off(key)?;
        let listening = self.inner.listening.get().saturating_sub(1);
        self.inner.listening.set(listening);
        if listening == 0 {
            debug!(metric = %self.name(), "last listener removed, detaching");
            self.inner.detach();
        }
        Some(removed)
    }

    pub fn listener(&self, key: &ListenerKey) -> Option<Listener<MetricEvent>> {
        self.inner.events.listener(key)
    }

    fn attach(&self) {
        let qualifier = self.inner.qualifier();

        let weak = Rc::downgrade(&self.inner);
        self.inner
            .context
            .on(ListenerKey::prepare(qualifier.clone()), move |event| {
                if let (Some(window), Some(inner)) = (event.window(), weak.upgrade()) {
                    RegularMetric { inner }.prepare(window.start, window.stop);
                }
            });

        let weak = Rc::downgrade(&self.inner);
        self.inner
            .context
            .on(ListenerKey::before_change(qualifier), move |event| {
                if let (Some(window), Some(inner)) = (event.window(), weak.upgrade()) {
                    RegularMetric { inner }.before_change(window);
                }
            });
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Fetch the samples missing for the window starting at `start1`.
    ///
    /// Requests `steps + LOOKAHEAD` samples ending at `stop`, where `steps` is
    /// how far the buffer is behind. No-op when nothing is missing or a fetch
    /// is already in flight.
    pub fn prepare(&self, start1: Timestamp, stop: Timestamp) {
        let context = &self.inner.context;
        let (step, size) = (context.step(), context.size());
        let count = {
            let mut buffer = self.inner.buffer.borrow_mut();
            let steps = buffer.steps_behind(start1, step, size);
            if steps <= 0 || buffer.is_fetching() {
                return;
            }
            buffer.set_fetching(true);
            steps + LOOKAHEAD
        };

        let fetch_start = stop - count * step;
        debug!(
            metric = %self.name(),
            start = fetch_start,
            stop,
            samples = count,
            "requesting samples"
        );
        let weak: Weak<RegularInner> = Rc::downgrade(&self.inner);
        self.inner.source.request(
            fetch_start,
            stop,
            step,
            Box::new(move |result| {
                if let Some(inner) = weak.upgrade() {
                    RegularMetric { inner }.complete(start1, fetch_start, stop, result);
                }
            }),
        );
    }

    fn complete(&self, start1: Timestamp, fetch_start: Timestamp, stop: Timestamp, result: FetchResult) {
        let context = &self.inner.context;
        let (step, size) = (context.step(), context.size());
        let event = {
            let mut buffer = self.inner.buffer.borrow_mut();
            buffer.set_fetching(false);
            match result {
                Err(err) => {
                    warn!(metric = %self.name(), error = %err, "fetch failed, keeping stale samples");
                    return;
                }
                Ok(data) if data.is_empty() => {
                    warn!(metric = %self.name(), "fetch returned no data");
                    return;
                }
                Ok(data) => {
                    buffer.splice_at(start1, fetch_start, step, size, &data);
                    MetricEvent::Change {
                        start: buffer.start(),
                        stop: Some(stop),
                    }
                }
            }
        };
        self.inner.events.emit(&event);
    }

    /// Slide the buffer so index 0 corresponds to `window.start`.
    pub fn before_change(&self, window: Window) {
        let context = &self.inner.context;
        let (step, size) = (context.step(), context.size());
        self.inner.buffer.borrow_mut().slide_to(window, step, size);
    }
}

impl std::fmt::Debug for RegularMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegularMetric")
            .field("id", &self.inner.id)
            .field("name", &*self.inner.name.borrow())
            .field("listening", &self.inner.listening.get())
            .field("buffer", &*self.inner.buffer.borrow())
            .finish()
    }
}
