//! The data-source adapter contract consumed by leaf metrics.
//!
//! A source is asked for the samples covering `[start, stop)` at `step`
//! millisecond spacing and answers exactly once through a callback. The core
//! knows nothing about how the samples are obtained; backends resample and
//! issue their own requests before answering.

use std::future::Future;
use std::rc::Rc;

use thiserror::Error;

use crate::time::Timestamp;

/// Why a fetch produced no samples. Local to the requesting metric.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("no data")]
    NoData,
}

impl SourceError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        SourceError::Backend(err.to_string())
    }
}

pub type FetchResult = Result<Vec<f64>, SourceError>;

/// Completion callback handed to a [`DataSource`]. `FnOnce`: at most one answer.
pub type RequestCallback = Box<dyn FnOnce(FetchResult)>;

/// An asynchronous sample provider.
///
/// Implementations may invoke `callback` synchronously or later from the same
/// thread (e.g. from a task on the current `LocalSet`).
pub trait DataSource {
    fn request(&self, start: Timestamp, stop: Timestamp, step: i64, callback: RequestCallback);
}

impl<F> DataSource for F
where
    F: Fn(Timestamp, Timestamp, i64, RequestCallback),
{
    fn request(&self, start: Timestamp, stop: Timestamp, step: i64, callback: RequestCallback) {
        self(start, stop, step, callback)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Adapters
// ─────────────────────────────────────────────────────────────────────────────

/// Adapts an `async` fetch function into a [`DataSource`].
///
/// Each request is spawned with `tokio::task::spawn_local`, so requests must be
/// issued from inside a `tokio::task::LocalSet`.
pub struct FutureSource<F> {
    fetch: Rc<F>,
}

impl<F, Fut> FutureSource<F>
where
    F: Fn(Timestamp, Timestamp, i64) -> Fut + 'static,
    Fut: Future<Output = FetchResult> + 'static,
{
    pub fn new(fetch: F) -> Self {
        Self {
            fetch: Rc::new(fetch),
        }
    }
}

impl<F, Fut> DataSource for FutureSource<F>
where
    F: Fn(Timestamp, Timestamp, i64) -> Fut + 'static,
    Fut: Future<Output = FetchResult> + 'static,
{
    fn request(&self, start: Timestamp, stop: Timestamp, step: i64, callback: RequestCallback) {
        let fut = (self.fetch)(start, stop, step);
        tokio::task::spawn_local(async move {
            callback(fut.await);
        });
    }
}

/// Forwards every request to `inner` with both bounds moved by `offset` ms.
pub struct ShiftedSource {
    inner: Rc<dyn DataSource>,
    offset: i64,
}

impl ShiftedSource {
    pub fn new(inner: Rc<dyn DataSource>, offset: i64) -> Self {
        Self { inner, offset }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }
}

impl DataSource for ShiftedSource {
    fn request(&self, start: Timestamp, stop: Timestamp, step: i64, callback: RequestCallback) {
        self.inner
            .request(start + self.offset, stop + self.offset, step, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn closures_are_sources() {
        let source = |start: Timestamp, stop: Timestamp, step: i64, cb: RequestCallback| {
            cb(Ok(vec![(stop - start) as f64 / step as f64]))
        };
        let got = Rc::new(RefCell::new(None));
        let g = got.clone();
        source.request(0, 5_000, 1_000, Box::new(move |r| *g.borrow_mut() = Some(r)));
        assert_eq!(*got.borrow(), Some(Ok(vec![5.0])));
    }

    #[test]
    fn shifted_source_translates_both_bounds() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let inner: Rc<dyn DataSource> = Rc::new(
            move |start: Timestamp, stop: Timestamp, _step: i64, cb: RequestCallback| {
                s.borrow_mut().push((start, stop));
                cb(Err(SourceError::NoData));
            },
        );
        let shifted = ShiftedSource::new(inner, -86_400_000);
        shifted.request(100_000_000, 100_010_000, 1_000, Box::new(|_| {}));
        assert_eq!(*seen.borrow(), vec![(13_600_000, 13_610_000)]);
        assert_eq!(shifted.offset(), -86_400_000);
    }

    #[tokio::test]
    async fn future_source_answers_from_a_local_task() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let source = FutureSource::new(|start, stop, step| async move {
                    Ok(vec![0.0; ((stop - start) / step) as usize])
                });
                let (tx, rx) = tokio::sync::oneshot::channel();
                source.request(0, 3_000, 1_000, Box::new(move |r| {
                    let _ = tx.send(r);
                }));
                assert_eq!(rx.await.unwrap(), Ok(vec![0.0, 0.0, 0.0]));
            })
            .await;
    }

    #[test]
    fn backend_error_wraps_display() {
        let err = SourceError::backend("503 Service Unavailable");
        assert_eq!(err.to_string(), "backend error: 503 Service Unavailable");
    }
}
