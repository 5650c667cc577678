//! The shared clock and scheduler of one visualization session.
//!
//! A [`Context`] owns the authoritative notion of "now": the window currently
//! displayed (`start0..stop0`), the window being prepared (`start1..stop1`),
//! the focused sample, and the time scale. Once started, its scheduler runs a
//! tick every `step` milliseconds:
//!
//! 1. `Prepare(start1, stop1)`: metrics fetch the samples they are missing.
//! 2. after `client_delay` ms: `BeforeChange`, `Change`, then `Focus`, in that
//!    order. Metrics slide their buffers on `BeforeChange`, renderers redraw on
//!    `Change` and reposition the crosshair on `Focus`.
//!
//! Everything is single-threaded. The scheduler is a `tokio::task::spawn_local`
//! task and needs a `LocalSet`; hosts with their own frame loop can instead call
//! [`Context::tick_prepare`] and [`Context::tick_change`] directly.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::ContextConfig;
use crate::error::{Error, Result};
use crate::events::{ContextEvent, EventHub, EventType, Listener, ListenerKey};
use crate::metric::{Metric, RegularMetric};
use crate::scale::TimeScale;
use crate::source::DataSource;
use crate::time::{align_down, Clock, SystemClock, Window};

struct ContextState {
    config: ContextConfig,
    /// Displayed window, `start0..stop0`.
    current: Window,
    /// Window of the next change, `start1..stop1`.
    next: Window,
    focus: Option<usize>,
    scale: TimeScale,
}

impl ContextState {
    fn new(config: ContextConfig, now: i64) -> Self {
        let mut state = Self {
            config,
            current: Window::new(0, 0),
            next: Window::new(0, 0),
            focus: None,
            scale: TimeScale::new([0, 0], [0.0, config.size as f64]),
        };
        state.recompute(now);
        state
    }

    /// Derive both windows and the scale from the configuration and `now`.
    fn recompute(&mut self, now: i64) {
        let cfg = self.config;
        let span = cfg.span();
        let stop0 = align_down(now.saturating_sub(cfg.server_delay + cfg.client_delay), cfg.step);
        self.current = Window::new(stop0 - span, stop0);
        let stop1 = align_down(now.saturating_sub(cfg.server_delay), cfg.step);
        self.next = Window::new(stop1 - span, stop1);
        self.scale.set_domain([self.current.start, self.current.stop]);
        self.scale.set_range([0.0, cfg.size as f64]);
        if self.focus.is_some_and(|i| i >= cfg.size) {
            self.focus = None;
        }
    }
}

struct ContextInner {
    state: RefCell<ContextState>,
    events: EventHub<ContextEvent>,
    scheduler: RefCell<Option<JoinHandle<()>>>,
    clock: Rc<dyn Clock>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if let Some(handle) = self.scheduler.get_mut().take() {
            handle.abort();
        }
    }
}

/// Handle to a session clock. Clones share the same state.
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

impl Context {
    /// A context with default configuration and the system clock.
    pub fn new() -> Self {
        Self::build(ContextConfig::default(), Rc::new(SystemClock::new()))
    }

    pub fn with_config(config: ContextConfig) -> Result<Self> {
        Self::with_clock(config, Rc::new(SystemClock::new()))
    }

    pub fn with_clock(config: ContextConfig, clock: Rc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, clock))
    }

    fn build(config: ContextConfig, clock: Rc<dyn Clock>) -> Self {
        let state = ContextState::new(config, clock.now());
        Self {
            inner: Rc::new(ContextInner {
                state: RefCell::new(state),
                events: EventHub::new(),
                scheduler: RefCell::new(None),
                clock,
            }),
        }
    }

    /// A process-wide unique id, used to namespace listener qualifiers.
    pub fn generate_id(&self) -> u64 {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        NEXT_ID.fetch_add(1, Ordering::Relaxed)
    }

    // ── Configuration ───────────────────────────────────────────────────

    pub fn config(&self) -> ContextConfig {
        self.inner.state.borrow().config
    }

    /// Sample interval in milliseconds.
    pub fn step(&self) -> i64 {
        self.inner.state.borrow().config.step
    }

    /// Number of samples in the visible window.
    pub fn size(&self) -> usize {
        self.inner.state.borrow().config.size
    }

    pub fn server_delay(&self) -> i64 {
        self.inner.state.borrow().config.server_delay
    }

    pub fn client_delay(&self) -> i64 {
        self.inner.state.borrow().config.client_delay
    }

    pub fn set_step(&self, step: i64) -> Result<()> {
        self.reconfigure(|cfg| cfg.step = step)
    }

    /// Change the window size. A focus index that no longer fits is cleared.
    pub fn set_size(&self, size: usize) -> Result<()> {
        self.reconfigure(|cfg| cfg.size = size)
    }

    pub fn set_server_delay(&self, delay: i64) -> Result<()> {
        self.reconfigure(|cfg| cfg.server_delay = delay)
    }

    pub fn set_client_delay(&self, delay: i64) -> Result<()> {
        self.reconfigure(|cfg| cfg.client_delay = delay)
    }

    /// Validate the changed configuration as a whole, then adopt it.
    fn reconfigure(&self, apply: impl FnOnce(&mut ContextConfig)) -> Result<()> {
        let mut candidate = self.config();
        apply(&mut candidate);
        candidate.validate()?;
        let now = self.inner.clock.now();
        let mut state = self.inner.state.borrow_mut();
        state.config = candidate;
        state.recompute(now);
        Ok(())
    }

    // ── Derived state ───────────────────────────────────────────────────

    /// The displayed window, `start0..stop0`.
    pub fn window(&self) -> Window {
        self.inner.state.borrow().current
    }

    /// The window the next change will adopt, `start1..stop1`.
    pub fn next_window(&self) -> Window {
        self.inner.state.borrow().next
    }

    /// Maps the displayed window onto `[0, size]`.
    pub fn scale(&self) -> TimeScale {
        self.inner.state.borrow().scale
    }

    // ── Focus ───────────────────────────────────────────────────────────

    pub fn focus(&self) -> Option<usize> {
        self.inner.state.borrow().focus
    }

    /// Set or clear the focused index and notify focus listeners immediately.
    pub fn set_focus(&self, focus: Option<usize>) -> Result<()> {
        {
            let mut state = self.inner.state.borrow_mut();
            if let Some(index) = focus {
                let size = state.config.size;
                if index >= size {
                    return Err(Error::FocusOutOfRange { index, size });
                }
            }
            state.focus = focus;
        }
        self.inner.events.emit(&ContextEvent::Focus(focus));
        Ok(())
    }

    // ── Subscriptions ───────────────────────────────────────────────────

    /// Register `listener` under `key` and immediately replay the current state
    /// to it.
    ///
    /// Replayed values per event type:
    /// - `Prepare`: `start1..stop1`
    /// - `BeforeChange` and `Change`: `start0..stop0`
    /// - `Focus`: the current focus
    ///
    /// This lets a chart that joins late draw right away, and a metric start
    /// fetching without waiting for the next tick.
    pub fn on<F>(&self, key: ListenerKey, listener: F)
    where
        F: Fn(&ContextEvent) + 'static,
    {
        self.subscribe(key, Rc::new(listener));
    }

    /// Like [`on`](Self::on), for an already shared listener.
    pub fn subscribe(&self, key: ListenerKey, listener: Listener<ContextEvent>) {
        let event_type = key.event;
        self.inner.events.on(key, listener.clone());
        let replay = {
            let state = self.inner.state.borrow();
            match event_type {
                EventType::Prepare => ContextEvent::Prepare(state.next),
                EventType::BeforeChange => ContextEvent::BeforeChange(state.current),
                EventType::Change => ContextEvent::Change(state.current),
                EventType::Focus => ContextEvent::Focus(state.focus),
            }
        };
        listener(&replay);
    }

    /// Subscribe to `Change` with a window-only callback.
    pub fn on_change<F>(&self, qualifier: impl Into<String>, listener: F)
    where
        F: Fn(Window) + 'static,
    {
        self.on(ListenerKey::change(qualifier), move |event| {
            if let ContextEvent::Change(window) = event {
                listener(*window);
            }
        });
    }

    pub fn on_prepare<F>(&self, qualifier: impl Into<String>, listener: F)
    where
        F: Fn(Window) + 'static,
    {
        self.on(ListenerKey::prepare(qualifier), move |event| {
            if let ContextEvent::Prepare(window) = event {
                listener(*window);
            }
        });
    }

    pub fn on_focus<F>(&self, qualifier: impl Into<String>, listener: F)
    where
        F: Fn(Option<usize>) + 'static,
    {
        self.on(ListenerKey::focus(qualifier), move |event| {
            if let ContextEvent::Focus(focus) = event {
                listener(*focus);
            }
        });
    }

    /// Remove the listener registered under `key`, returning it.
    pub fn off(&self, key: &ListenerKey) -> Option<Listener<ContextEvent>> {
        self.inner.events.off(key)
    }

    pub fn listener(&self, key: &ListenerKey) -> Option<Listener<ContextEvent>> {
        self.inner.events.listener(key)
    }

    /// Number of listeners currently registered for `event`.
    pub fn listener_count(&self, event: EventType) -> usize {
        self.inner.events.count(event)
    }

    // ── Metrics ─────────────────────────────────────────────────────────

    /// A leaf metric backed by `source`.
    pub fn metric<S>(&self, source: S, name: impl Into<String>) -> Metric
    where
        S: DataSource + 'static,
    {
        self.metric_from(Rc::new(source), name)
    }

    pub fn metric_from(&self, source: Rc<dyn DataSource>, name: impl Into<String>) -> Metric {
        Metric::Regular(RegularMetric::new(self.clone(), source, name.into()))
    }

    // ── Ticks ───────────────────────────────────────────────────────────

    /// First half of a tick: compute the next window from the clock and emit
    /// `Prepare`.
    pub fn tick_prepare(&self) {
        let next = {
            let now = self.inner.clock.now();
            let mut state = self.inner.state.borrow_mut();
            let cfg = state.config;
            let stop1 = align_down(now.saturating_sub(cfg.server_delay), cfg.step);
            state.next = Window::new(stop1 - cfg.span(), stop1);
            state.next
        };
        debug!(window = %next, "prepare");
        self.inner.events.emit(&ContextEvent::Prepare(next));
    }

    /// Second half of a tick: adopt the prepared window and emit
    /// `BeforeChange`, `Change` and `Focus`.
    pub fn tick_change(&self) {
        let (window, focus) = {
            let mut state = self.inner.state.borrow_mut();
            state.current = state.next;
            let current = state.current;
            state.scale.set_domain([current.start, current.stop]);
            (current, state.focus)
        };
        debug!(window = %window, "change");
        self.inner.events.emit(&ContextEvent::BeforeChange(window));
        self.inner.events.emit(&ContextEvent::Change(window));
        self.inner.events.emit(&ContextEvent::Focus(focus));
    }

    // ── Scheduler ───────────────────────────────────────────────────────

    /// Start (or restart) the repeating tick.
    ///
    /// The first `Prepare` fires when data for the next aligned step should be
    /// available server-side; if that leaves less than `client_delay` to
    /// prefetch, it is pushed back by one step.
    ///
    /// # Panics
    ///
    /// Panics when called outside a `tokio::task::LocalSet`.
    pub fn start(&self) {
        self.abort_scheduler();
        let delay = {
            let now = self.inner.clock.now();
            let mut state = self.inner.state.borrow_mut();
            state.recompute(now);
            first_prepare_delay(state.next.stop, now, &state.config)
        };
        let handle = tokio::task::spawn_local(run_scheduler(Rc::downgrade(&self.inner), delay));
        *self.inner.scheduler.borrow_mut() = Some(handle);
        info!(delay_ms = delay, step_ms = self.step(), size = self.size(), "context started");
    }

    /// Cancel the pending tick. The context stays readable, frozen at its last
    /// window. Calling it again is a no-op.
    pub fn stop(&self) {
        if self.abort_scheduler() {
            info!("context stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .scheduler
            .borrow()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn abort_scheduler(&self) -> bool {
        match self.inner.scheduler.borrow_mut().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Context")
            .field("config", &state.config)
            .field("window", &state.current)
            .field("next_window", &state.next)
            .field("focus", &state.focus)
            .finish()
    }
}

/// Milliseconds until the first `Prepare`, given the aligned `stop1`.
pub(crate) fn first_prepare_delay(stop1: i64, now: i64, cfg: &ContextConfig) -> i64 {
    let delay = stop1 + cfg.server_delay - now;
    if delay < cfg.client_delay {
        delay + cfg.step
    } else {
        delay
    }
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

async fn run_scheduler(context: Weak<ContextInner>, first_delay: i64) {
    let mut next_prepare = Instant::now() + millis(first_delay);
    loop {
        tokio::time::sleep_until(next_prepare).await;
        let client_delay = {
            let Some(inner) = context.upgrade() else { return };
            let context = Context { inner };
            context.tick_prepare();
            context.client_delay()
        };

        tokio::time::sleep(millis(client_delay)).await;
        let step = {
            let Some(inner) = context.upgrade() else { return };
            let context = Context { inner };
            context.tick_change();
            context.step()
        };

        next_prepare += millis(step);
    }
}
