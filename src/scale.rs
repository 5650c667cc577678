//! Linear time scale mapping the displayed window onto sample (pixel) columns.

use crate::time::{align_down, to_datetime, Timestamp};

/// Maps a time domain `[d0, d1]` linearly onto a range `[r0, r1]`.
///
/// The context keeps the domain at the displayed window and the range at
/// `[0, size]`, so `apply(t)` yields the (fractional) sample column for `t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeScale {
    domain: [Timestamp; 2],
    range: [f64; 2],
}

impl TimeScale {
    pub fn new(domain: [Timestamp; 2], range: [f64; 2]) -> Self {
        Self { domain, range }
    }

    pub fn domain(&self) -> [Timestamp; 2] {
        self.domain
    }

    pub fn range(&self) -> [f64; 2] {
        self.range
    }

    pub fn set_domain(&mut self, domain: [Timestamp; 2]) {
        self.domain = domain;
    }

    pub fn set_range(&mut self, range: [f64; 2]) {
        self.range = range;
    }

    /// Map a timestamp to the output range. A zero-length domain maps to `r0`.
    pub fn apply(&self, t: Timestamp) -> f64 {
        let span = (self.domain[1] - self.domain[0]) as f64;
        if span == 0.0 {
            return self.range[0];
        }
        let k = (t - self.domain[0]) as f64 / span;
        self.range[0] + k * (self.range[1] - self.range[0])
    }

    /// Map an output value back to a timestamp (rounded to the millisecond).
    pub fn invert(&self, x: f64) -> Timestamp {
        let extent = self.range[1] - self.range[0];
        if extent == 0.0 {
            return self.domain[0];
        }
        let k = (x - self.range[0]) / extent;
        self.domain[0] + (k * (self.domain[1] - self.domain[0]) as f64).round() as Timestamp
    }

    /// Up to `count` tick positions inside the domain, each a multiple of
    /// `every` milliseconds.
    ///
    /// The tick interval is the smallest multiple of `every` that yields at
    /// most `count` ticks.
    pub fn ticks(&self, every: i64, count: usize) -> Vec<Timestamp> {
        if every <= 0 || count == 0 || self.domain[1] <= self.domain[0] {
            return Vec::new();
        }
        let span = self.domain[1] - self.domain[0];
        let per_tick = every.saturating_mul(i64::try_from(count).unwrap_or(i64::MAX));
        let interval = every.saturating_mul(span / per_tick + 1);
        let mut t = align_down(self.domain[0], interval);
        if t < self.domain[0] {
            t += interval;
        }
        let mut out = Vec::new();
        while t <= self.domain[1] && out.len() < count {
            out.push(t);
            t += interval;
        }
        out
    }
}

/// Format a tick timestamp (UTC) with a `chrono` format string such as `"%H:%M"`.
pub fn format_tick(t: Timestamp, fmt: &str) -> String {
    to_datetime(t).format(fmt).to_string()
}
