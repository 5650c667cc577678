#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use cubism::{DataSource, FetchResult, RequestCallback, Timestamp};

/// One request seen by a [`RecordingSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub start: Timestamp,
    pub stop: Timestamp,
    pub step: i64,
}

impl Request {
    pub fn samples(&self) -> i64 {
        (self.stop - self.start) / self.step
    }
}

/// Records every request and holds its callback until the test resolves it.
#[derive(Clone, Default)]
pub struct RecordingSource {
    requests: Rc<RefCell<Vec<Request>>>,
    pending: Rc<RefCell<Vec<(Request, RequestCallback)>>>,
}

impl RecordingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Answer the oldest pending request with samples whose value is their
    /// timestamp in seconds.
    pub fn resolve_with_timestamps(&self) -> Request {
        let (request, callback) = self.pending.borrow_mut().remove(0);
        let values = (0..request.samples())
            .map(|j| ((request.start + j * request.step) / 1_000) as f64)
            .collect();
        callback(Ok(values));
        request
    }

    /// Answer the oldest pending request with `result`.
    pub fn resolve(&self, result: FetchResult) -> Request {
        let (request, callback) = self.pending.borrow_mut().remove(0);
        callback(result);
        request
    }
}

impl DataSource for RecordingSource {
    fn request(&self, start: Timestamp, stop: Timestamp, step: i64, callback: RequestCallback) {
        let request = Request { start, stop, step };
        self.requests.borrow_mut().push(request);
        self.pending.borrow_mut().push((request, callback));
    }
}

/// Answers synchronously; the last samples of every answer are `tail`, the rest
/// are missing.
pub struct FixedSource {
    tail: Vec<f64>,
}

impl FixedSource {
    pub fn new(tail: &[f64]) -> Self {
        Self {
            tail: tail.to_vec(),
        }
    }
}

impl DataSource for FixedSource {
    fn request(&self, start: Timestamp, stop: Timestamp, step: i64, callback: RequestCallback) {
        let n = ((stop - start) / step) as usize;
        let mut values = vec![f64::NAN; n.saturating_sub(self.tail.len())];
        values.extend(self.tail.iter().rev().take(n).rev());
        callback(Ok(values));
    }
}

/// Collects string tags from listeners.
#[derive(Clone, Default)]
pub struct Log(Rc<RefCell<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }
}
