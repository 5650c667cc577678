//! Sliding window of samples owned by a leaf metric.
//!
//! Index `i` of the buffer holds the sample for `start + i * step`. Samples
//! that were never fetched read as `NaN`. The buffer never grows beyond the
//! context size. Fetched samples that belong to the prepared window but lie
//! past the displayed one are staged by timestamp and land on the next slide.

use std::collections::BTreeMap;

use crate::time::{Timestamp, Window};

/// Extra samples requested in front of the missing range, to absorb clock
/// skew and late-arriving backend data.
pub const LOOKAHEAD: i64 = 6;

/// Round a time difference to a whole number of steps, halves rounding up.
#[inline]
pub(crate) fn round_steps(delta: i64, step: i64) -> i64 {
    (delta as f64 / step as f64 + 0.5).floor() as i64
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricBuffer {
    values: Vec<f64>,
    start: Option<Timestamp>,
    stop: Option<Timestamp>,
    fetching: bool,
    /// Samples at or past index `size`, keyed by timestamp.
    staged: BTreeMap<Timestamp, f64>,
}

impl MetricBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Origin of the buffer; unset until the first window or fetch lands.
    pub fn start(&self) -> Option<Timestamp> {
        self.start
    }

    pub fn stop(&self) -> Option<Timestamp> {
        self.stop
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching
    }

    /// Number of samples waiting for the window to advance.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    pub fn value_at(&self, i: usize) -> f64 {
        self.values.get(i).copied().unwrap_or(f64::NAN)
    }

    /// How many steps the window starting at `start1` is ahead of the buffer.
    ///
    /// An unset origin counts as infinitely far behind, i.e. `size` steps.
    pub fn steps_behind(&self, start1: Timestamp, step: i64, size: usize) -> i64 {
        let size = size as i64;
        match self.start {
            Some(start) => round_steps(start1 - start, step).min(size),
            None => size,
        }
    }

    pub(crate) fn set_fetching(&mut self, fetching: bool) {
        self.fetching = fetching;
    }

    /// Write fetched samples whose first element is at `fetch_start`.
    ///
    /// When the origin is still unset, `origin` (the prepared window start)
    /// becomes the origin.
    pub(crate) fn splice_at(
        &mut self,
        origin: Timestamp,
        fetch_start: Timestamp,
        step: i64,
        size: usize,
        data: &[f64],
    ) {
        let origin = *self.start.get_or_insert(origin);
        let offset = round_steps(fetch_start - origin, step);
        for (j, &value) in data.iter().enumerate() {
            let idx = offset + j as i64;
            if idx < 0 {
                continue;
            }
            let idx = idx as usize;
            if idx >= 2 * size {
                break;
            }
            if idx >= size {
                self.staged.insert(origin + idx as i64 * step, value);
                continue;
            }
            self.write(idx, value);
        }
    }

    fn write(&mut self, idx: usize, value: f64) {
        if idx >= self.values.len() {
            self.values.resize(idx + 1, f64::NAN);
        }
        self.values[idx] = value;
    }

    /// Adopt `window` as the new origin, dropping the samples that scrolled out.
    ///
    /// A window that moved backwards shifts the samples right instead, padding
    /// with `NaN`, so index 0 always lines up with `window.start`.
    pub(crate) fn slide_to(&mut self, window: Window, step: i64, size: usize) {
        let origin = self.start.unwrap_or(window.start);
        let shift = round_steps(window.start - origin, step);
        if shift > 0 {
            let n = (shift as usize).min(self.values.len());
            self.values.drain(..n);
        } else if shift < 0 && !self.values.is_empty() {
            let pad = (shift.unsigned_abs() as usize).min(size);
            self.values
                .splice(0..0, std::iter::repeat(f64::NAN).take(pad));
        }
        self.values.truncate(size);
        self.start = Some(window.start);
        self.stop = Some(window.stop);

        for (t, value) in std::mem::take(&mut self.staged) {
            let idx = round_steps(t - window.start, step);
            if (0..size as i64).contains(&idx) {
                self.write(idx as usize, value);
            }
        }
    }

    /// `[min, max]` over the buffer, ignoring missing samples.
    ///
    /// The scan starts at index 1: the oldest sample is about to scroll out and
    /// does not take part in the extent. Identity values are `+inf`/`-inf`.
    pub fn extent(&self, size: usize) -> [f64; 2] {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for i in 1..size.min(self.values.len()) {
            let value = self.values[i];
            if value < min {
                min = value;
            }
            if value > max {
                max = value;
            }
        }
        [min, max]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(start: Timestamp, values: &[f64]) -> MetricBuffer {
        let mut buf = MetricBuffer::new();
        buf.splice_at(start, start, 1_000, 100, values);
        buf
    }

    #[test]
    fn unset_origin_is_a_full_window_behind() {
        let buf = MetricBuffer::new();
        assert_eq!(buf.steps_behind(50_000, 1_000, 10), 10);
    }

    #[test]
    fn steps_behind_is_capped_at_size() {
        let buf = filled(0, &[1.0]);
        assert_eq!(buf.steps_behind(3_000, 1_000, 10), 3);
        assert_eq!(buf.steps_behind(3_400, 1_000, 10), 3);
        assert_eq!(buf.steps_behind(3_500, 1_000, 10), 4);
        assert_eq!(buf.steps_behind(1_000_000, 1_000, 10), 10);
        assert_eq!(buf.steps_behind(0, 1_000, 10), 0);
    }

    #[test]
    fn splice_drops_lookahead_before_origin() {
        let mut buf = MetricBuffer::new();
        // 16 samples ending at 10_000 for a 10-sample window starting at 0.
        let data: Vec<f64> = (0..16).map(|v| v as f64).collect();
        buf.splice_at(0, -6_000, 1_000, 10, &data);
        assert_eq!(buf.start(), Some(0));
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.value_at(0), 6.0);
        assert_eq!(buf.value_at(9), 15.0);
        assert_eq!(buf.staged_len(), 0);

        let mut short = MetricBuffer::new();
        short.splice_at(0, 5_000, 1_000, 8, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(short.len(), 8);
        assert!(short.value_at(0).is_nan());
        assert_eq!(short.value_at(7), 3.0);
        assert_eq!(short.staged_len(), 2);
    }

    #[test]
    fn staged_samples_land_after_the_slide() {
        let mut buf = MetricBuffer::new();
        buf.slide_to(Window::new(0, 4_000), 1_000, 4);
        // Fetch for the prepared window 1_000..5_000 arrives before the change.
        buf.splice_at(1_000, 1_000, 1_000, 4, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buf.len(), 4);
        assert!(buf.value_at(0).is_nan());
        assert_eq!(buf.staged_len(), 1);

        buf.slide_to(Window::new(1_000, 5_000), 1_000, 4);
        assert_eq!(buf.values(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buf.staged_len(), 0);
    }

    #[test]
    fn staged_samples_outside_new_window_are_discarded() {
        let mut buf = MetricBuffer::new();
        buf.splice_at(0, 0, 1_000, 2, &[1.0, 2.0, 3.0]);
        assert_eq!(buf.staged_len(), 1);
        buf.slide_to(Window::new(10_000, 12_000), 1_000, 2);
        assert!(buf.is_empty());
        assert_eq!(buf.staged_len(), 0);
    }

    #[test]
    fn slide_forward_trims_front() {
        let mut buf = filled(0, &[1.0, 2.0, 3.0, 4.0]);
        buf.slide_to(Window::new(2_000, 12_000), 1_000, 10);
        assert_eq!(buf.values(), &[3.0, 4.0]);
        assert_eq!(buf.start(), Some(2_000));
        assert_eq!(buf.stop(), Some(12_000));
    }

    #[test]
    fn slide_past_whole_buffer_empties_it() {
        let mut buf = filled(0, &[1.0, 2.0]);
        buf.slide_to(Window::new(50_000, 60_000), 1_000, 10);
        assert!(buf.is_empty());
    }

    #[test]
    fn slide_backwards_pads_front() {
        let mut buf = filled(5_000, &[1.0, 2.0]);
        buf.slide_to(Window::new(3_000, 13_000), 1_000, 3);
        assert_eq!(buf.len(), 3);
        assert!(buf.value_at(0).is_nan());
        assert!(buf.value_at(1).is_nan());
        assert_eq!(buf.value_at(2), 1.0);
    }

    #[test]
    fn first_slide_on_empty_buffer_adopts_window() {
        let mut buf = MetricBuffer::new();
        buf.slide_to(Window::new(7_000, 17_000), 1_000, 10);
        assert_eq!(buf.start(), Some(7_000));
        assert!(buf.is_empty());
    }

    #[test]
    fn extent_skips_first_sample_and_missing_values() {
        let buf = filled(0, &[-100.0, 3.0, f64::NAN, 7.0, 1.0]);
        assert_eq!(buf.extent(10), [1.0, 7.0]);
        assert_eq!(MetricBuffer::new().extent(10), [f64::INFINITY, f64::NEG_INFINITY]);
    }

    #[test]
    fn value_at_out_of_range_is_nan() {
        assert!(filled(0, &[1.0]).value_at(5).is_nan());
    }
}
