//! Cubism crate root: re-exports and module wiring.
//!
//! The core of a real-time scrolling time-series dashboard:
//! - `context`: the shared clock and scheduler emitting prepare/change/focus
//! - `metric`: per-series sample buffers that fetch incrementally and slide
//! - `events`: the namespaced publish/subscribe both of them use
//! - `source`: the asynchronous data-source contract metrics consume
//! - `config`: context timing configuration (JSON/YAML)
//! - `scale`, `time`: time scale, timestamps and clocks
//!
//! Rendering (horizon, comparison, axis, rule) is left to consumers: they read
//! [`Metric::value_at`] / [`Metric::extent`] and the context's size, step,
//! scale and focus, and redraw on `Change`/`Focus`.

pub mod config;
pub mod context;
pub mod error;
pub mod events;
#[cfg(feature = "logging")]
pub mod logging;
pub mod metric;
pub mod scale;
pub mod source;
pub mod time;

// Public re-exports for a compact external API
pub use config::ContextConfig;
pub use context::Context;
pub use error::{Error, Result};
pub use events::{ContextEvent, EventHub, EventType, Listener, ListenerKey, MetricEvent};
pub use metric::{CompositeMetric, Metric, MetricBuffer, Operator, RegularMetric};
pub use scale::TimeScale;
pub use source::{DataSource, FetchResult, FutureSource, RequestCallback, ShiftedSource, SourceError};
pub use time::{Clock, ManualClock, SystemClock, Timestamp, Window};

/// A context with the default configuration, driven by the system clock.
pub fn context() -> Context {
    Context::new()
}
