//! Lab configuration
//!
//! Loaded from TOML; every field has a default, so an empty file is a valid
//! configuration.
//!
//! ```toml
//! tick_interval_ms = 2000
//! max_progress_increment = 10.0
//! reply_delay_ms = 1500
//! seed = 42
//!
//! [resource_ceiling]
//! cpu = 80.0
//! memory = 60.0
//! network = 40.0
//! storage = 30.0
//!
//! [settings]
//! theme = "dark"
//! maxConcurrentExperiments = 3
//! ```

use crate::error::{LabError, Result};
use crate::simulation::{DEFAULT_MAX_INCREMENT, DEFAULT_RESOURCE_CEILING};
use crate::store::DEFAULT_EVENT_BUFFER;
use crate::types::{AppSettings, ResourceUsage, NAME_TOPIC_CHARS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Shortest accepted tick interval
pub const MIN_TICK_INTERVAL_MS: u64 = 1;

/// Lab configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Interval between simulation ticks
    pub tick_interval_ms: u64,
    /// Upper bound of one progress increment
    pub max_progress_increment: f64,
    /// Delay before the scripted assistant reply
    pub reply_delay_ms: u64,
    /// Topic characters kept in experiment names
    pub name_topic_chars: usize,
    /// Capacity of the store notification channel
    pub event_buffer: usize,
    /// Seed for reproducible simulations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Per-channel upper bounds of resource samples (each at most 100)
    pub resource_ceiling: ResourceUsage,
    /// Initial application settings
    pub settings: AppSettings,
}

impl LabConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With tick interval; sub-millisecond intervals round up to 1 ms
    #[inline]
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = u64::try_from(interval.as_millis())
            .unwrap_or(u64::MAX)
            .max(MIN_TICK_INTERVAL_MS);
        self
    }

    /// With reply delay
    #[inline]
    #[must_use]
    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With seed
    #[inline]
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// With initial settings
    #[inline]
    #[must_use]
    pub fn with_settings(mut self, settings: AppSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Tick interval as a duration
    #[inline]
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(MIN_TICK_INTERVAL_MS))
    }

    /// Reply delay as a duration
    #[inline]
    #[must_use]
    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// `Config` on malformed TOML or out-of-range values.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validated()
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// `Io` if the file cannot be read, `Config` if it is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loaded configuration file");
        Self::from_toml_str(&source)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// `Config` if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check ranges; settings are corrected rather than rejected.
    ///
    /// # Errors
    /// `Config` naming the first offending field.
    pub fn validated(mut self) -> Result<Self> {
        if self.tick_interval_ms == 0 {
            return Err(LabError::Config("tick_interval_ms must be positive".into()));
        }
        if !(self.max_progress_increment.is_finite() && self.max_progress_increment > 0.0) {
            return Err(LabError::Config(
                "max_progress_increment must be a positive number".into(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(LabError::Config("event_buffer must be positive".into()));
        }
        let ceiling = self.resource_ceiling;
        for (channel, value) in [
            ("cpu", ceiling.cpu),
            ("memory", ceiling.memory),
            ("network", ceiling.network),
            ("storage", ceiling.storage),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(LabError::Config(format!(
                    "resource_ceiling.{channel} must be within 0..=100"
                )));
            }
        }
        self.settings = self.settings.normalized();
        Ok(self)
    }

    /// Move every field into its accepted range instead of rejecting it.
    ///
    /// A zero tick becomes 1 ms, a non-positive or NaN increment falls back
    /// to the default, larger increments and the ceilings are capped at 100
    /// and the event buffer holds at least one event.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.tick_interval_ms = self.tick_interval_ms.max(MIN_TICK_INTERVAL_MS);
        self.max_progress_increment = if self.max_progress_increment > 0.0 {
            self.max_progress_increment.min(100.0)
        } else {
            DEFAULT_MAX_INCREMENT
        };
        self.event_buffer = self.event_buffer.max(1);
        self.resource_ceiling = self.resource_ceiling.clamped();
        self.settings = self.settings.normalized();
        self
    }
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 2000,
            max_progress_increment: DEFAULT_MAX_INCREMENT,
            reply_delay_ms: 1500,
            name_topic_chars: NAME_TOPIC_CHARS,
            event_buffer: DEFAULT_EVENT_BUFFER,
            seed: None,
            resource_ceiling: DEFAULT_RESOURCE_CEILING,
            settings: AppSettings::default(),
        }
    }
}
