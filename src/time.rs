//! Timestamps, visible windows and the clock abstraction driving the scheduler.
//!
//! All times are plain `i64` milliseconds since the UNIX epoch. `chrono` is used
//! only at the edges (conversion and formatting).

use std::cell::Cell;
use std::rc::Rc;

use chrono::{DateTime, TimeZone, Utc};

/// Milliseconds since the UNIX epoch.
pub type Timestamp = i64;

/// Convert a [`Timestamp`] to a UTC date-time. Out-of-range values clamp to the epoch.
pub fn to_datetime(t: Timestamp) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(t).single().unwrap_or_default()
}

pub fn from_datetime(dt: DateTime<Utc>) -> Timestamp {
    dt.timestamp_millis()
}

/// Floor `t` to a multiple of `step`. Also correct for times before the epoch.
#[inline]
pub fn align_down(t: Timestamp, step: i64) -> Timestamp {
    t.div_euclid(step) * step
}

// ─────────────────────────────────────────────────────────────────────────────
// Window
// ─────────────────────────────────────────────────────────────────────────────

/// A half-open time window `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub start: Timestamp,
    pub stop: Timestamp,
}

impl Window {
    pub const fn new(start: Timestamp, stop: Timestamp) -> Self {
        Self { start, stop }
    }

    /// Length of the window in milliseconds.
    #[inline]
    pub const fn span(&self) -> i64 {
        self.stop - self.start
    }

    /// Number of whole samples of `step` milliseconds that fit in the window.
    #[inline]
    pub fn samples(&self, step: i64) -> i64 {
        self.span() / step
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {})",
            to_datetime(self.start).format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            to_datetime(self.stop).format("%Y-%m-%dT%H:%M:%S%.3fZ")
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────────────────────────────────────

/// Source of "now" for a [`Context`](crate::Context).
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Wall clock that advances with the tokio timer.
///
/// The wall time is sampled once at construction and then advanced by
/// `tokio::time::Instant`, so a paused tokio runtime (`start_paused = true`)
/// moves this clock exactly as far as its timers move.
#[derive(Debug, Clone)]
pub struct SystemClock {
    anchor: Timestamp,
    anchor_instant: tokio::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::anchored_at(Utc::now().timestamp_millis())
    }

    /// A clock that reads `anchor` right now and advances from there.
    pub fn anchored_at(anchor: Timestamp) -> Self {
        Self {
            anchor,
            anchor_instant: tokio::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let elapsed = tokio::time::Instant::now().saturating_duration_since(self.anchor_instant);
        self.anchor + elapsed.as_millis() as i64
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Timestamp>>,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.set(now);
    }

    pub fn advance(&self, by_ms: i64) {
        self.now.set(self.now.get() + by_ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.get()
    }
}
