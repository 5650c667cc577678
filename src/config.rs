//! Context configuration: sample step, window size and latency compensation.
//!
//! Configs can be built in code or loaded from a JSON/YAML file. Every value
//! passes [`ContextConfig::validate`] before a context accepts it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_STEP_MS: i64 = 10_000;
pub const DEFAULT_SIZE: usize = 1440;
pub const DEFAULT_SERVER_DELAY_MS: i64 = 5_000;
pub const DEFAULT_CLIENT_DELAY_MS: i64 = 5_000;

/// Upper bound for either delay: one day.
pub const MAX_DELAY_MS: i64 = 86_400_000;
/// Upper bound for `size * step`: roughly a thousand years.
pub const MAX_SPAN_MS: i64 = 1_000 * 365 * MAX_DELAY_MS;

fn default_step() -> i64 {
    DEFAULT_STEP_MS
}

fn default_size() -> usize {
    DEFAULT_SIZE
}

fn default_server_delay() -> i64 {
    DEFAULT_SERVER_DELAY_MS
}

fn default_client_delay() -> i64 {
    DEFAULT_CLIENT_DELAY_MS
}

/// Timing configuration of a [`Context`](crate::Context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// Sample interval in milliseconds.
    #[serde(default = "default_step")]
    pub step: i64,
    /// Number of samples in the visible window.
    #[serde(default = "default_size")]
    pub size: usize,
    /// Assumed delay (ms) before the backend has data for a timestamp.
    #[serde(default = "default_server_delay")]
    pub server_delay: i64,
    /// Assumed delay (ms) for fetched data to reach the client.
    #[serde(default = "default_client_delay")]
    pub client_delay: i64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            step: DEFAULT_STEP_MS,
            size: DEFAULT_SIZE,
            server_delay: DEFAULT_SERVER_DELAY_MS,
            client_delay: DEFAULT_CLIENT_DELAY_MS,
        }
    }
}

impl ContextConfig {
    pub fn with_step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_server_delay(mut self, delay: i64) -> Self {
        self.server_delay = delay;
        self
    }

    pub fn with_client_delay(mut self, delay: i64) -> Self {
        self.client_delay = delay;
        self
    }

    /// Reject values that would break the window arithmetic.
    pub fn validate(&self) -> Result<()> {
        validate_step(self.step)?;
        validate_size(self.size)?;
        validate_delay("server_delay", self.server_delay)?;
        validate_delay("client_delay", self.client_delay)?;
        validate_span(self.size, self.step)?;
        Ok(())
    }

    /// Length of the visible window in milliseconds. Saturates for configs
    /// that do not pass [`validate`](Self::validate).
    pub fn span(&self) -> i64 {
        i64::try_from(self.size)
            .unwrap_or(i64::MAX)
            .saturating_mul(self.step)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let text = std::fs::read_to_string(path)?;
        match ext.as_str() {
            "json" => Self::from_json_str(&text),
            "yaml" | "yml" => Self::from_yaml_str(&text),
            _ => Err(Error::UnsupportedFormat(ext)),
        }
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn validate_step(step: i64) -> Result<()> {
    if step <= 0 {
        return Err(Error::invalid("step", format!("must be positive, got {step}")));
    }
    Ok(())
}

fn validate_size(size: usize) -> Result<()> {
    if size == 0 {
        return Err(Error::invalid("size", "must be at least one sample"));
    }
    if i64::try_from(size).is_err() {
        return Err(Error::invalid("size", format!("{size} is too large")));
    }
    Ok(())
}

fn validate_delay(field: &'static str, delay: i64) -> Result<()> {
    if delay < 0 {
        return Err(Error::invalid(field, format!("must not be negative, got {delay}")));
    }
    if delay > MAX_DELAY_MS {
        return Err(Error::invalid(
            field,
            format!("must be at most {MAX_DELAY_MS} ms, got {delay}"),
        ));
    }
    Ok(())
}

fn validate_span(size: usize, step: i64) -> Result<()> {
    let span = i64::try_from(size)
        .ok()
        .and_then(|size| size.checked_mul(step));
    match span {
        Some(span) if span <= MAX_SPAN_MS => Ok(()),
        _ => Err(Error::invalid(
            "size",
            format!("window of {size} samples of {step} ms exceeds {MAX_SPAN_MS} ms"),
        )),
    }
}
