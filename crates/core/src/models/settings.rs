use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::CoreError;

/// Prefix shared by every environment variable read by [`Settings::from_env`].
pub const ENV_PREFIX: &str = "STONKGAZE_";

/// Runtime configuration for the analysis pipeline and the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the remote analysis service (no trailing slash needed).
    pub api_base_url: String,

    /// Troll level used until the user picks one (0 = serious, 100 = unhinged).
    pub default_troll_level: u8,

    /// Delay between a page event and reading the page text.
    pub settle_window_ms: u64,

    /// Window in which repeated events for the same URL collapse into one snapshot.
    pub suppression_window_ms: u64,

    /// Quiet period the coordinator waits before admitting a snapshot.
    pub debounce_ms: u64,

    /// Snapshot text is truncated to this many characters.
    pub max_snapshot_chars: usize,

    /// Texts shorter than this are never sent to the service.
    pub min_content_chars: usize,

    pub request_timeout_secs: u64,

    /// Cash in a fresh (or unrecoverable) portfolio.
    pub starting_cash: f64,

    /// Per-context buffer of the message bus.
    pub bus_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            default_troll_level: 50,
            settle_window_ms: 500,
            suppression_window_ms: 2000,
            debounce_ms: 300,
            max_snapshot_chars: 2000,
            min_content_chars: 50,
            request_timeout_secs: 30,
            starting_cash: 10_000.0,
            bus_capacity: 64,
        }
    }
}

impl Settings {
    /// Defaults overlaid with any `STONKGAZE_*` environment variables.
    pub fn from_env() -> Result<Self, CoreError> {
        let mut settings = Self::default();

        if let Ok(url) = env::var(format!("{ENV_PREFIX}API_URL")) {
            settings.api_base_url = url;
        }
        if let Some(v) = read_var("TROLL_LEVEL")? {
            settings.default_troll_level = v;
        }
        if let Some(v) = read_var("SETTLE_WINDOW_MS")? {
            settings.settle_window_ms = v;
        }
        if let Some(v) = read_var("SUPPRESSION_WINDOW_MS")? {
            settings.suppression_window_ms = v;
        }
        if let Some(v) = read_var("DEBOUNCE_MS")? {
            settings.debounce_ms = v;
        }
        if let Some(v) = read_var("MAX_SNAPSHOT_CHARS")? {
            settings.max_snapshot_chars = v;
        }
        if let Some(v) = read_var("MIN_CONTENT_CHARS")? {
            settings.min_content_chars = v;
        }
        if let Some(v) = read_var("REQUEST_TIMEOUT_SECS")? {
            settings.request_timeout_secs = v;
        }
        if let Some(v) = read_var("STARTING_CASH")? {
            settings.starting_cash = v;
        }
        if let Some(v) = read_var("BUS_CAPACITY")? {
            settings.bus_capacity = v;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Reject combinations that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.api_base_url.trim().is_empty() {
            return Err(CoreError::Config("api_base_url must not be empty".into()));
        }
        if self.default_troll_level > 100 {
            return Err(CoreError::Config(format!(
                "default_troll_level must be 0..=100, got {}",
                self.default_troll_level
            )));
        }
        if self.suppression_window_ms == 0 {
            return Err(CoreError::Config("suppression_window_ms must be greater than 0".into()));
        }
        if self.max_snapshot_chars == 0 {
            return Err(CoreError::Config("max_snapshot_chars must be greater than 0".into()));
        }
        if self.min_content_chars > self.max_snapshot_chars {
            return Err(CoreError::Config(format!(
                "min_content_chars ({}) exceeds max_snapshot_chars ({})",
                self.min_content_chars, self.max_snapshot_chars
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config("request_timeout_secs must be greater than 0".into()));
        }
        if !self.starting_cash.is_finite() || self.starting_cash <= 0.0 {
            return Err(CoreError::Config(format!(
                "starting_cash must be positive, got {}",
                self.starting_cash
            )));
        }
        if self.bus_capacity == 0 {
            return Err(CoreError::Config("bus_capacity must be greater than 0".into()));
        }
        Ok(())
    }

    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_window_ms)
    }

    pub fn suppression_window(&self) -> Duration {
        Duration::from_millis(self.suppression_window_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn read_var<T: FromStr>(name: &str) -> Result<Option<T>, CoreError>
where
    T::Err: std::fmt::Display,
{
    let key = format!("{ENV_PREFIX}{name}");
    match env::var(&key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CoreError::Config(format!("{key}={raw:?} is invalid: {e}"))),
        Err(_) => Ok(None),
    }
}
