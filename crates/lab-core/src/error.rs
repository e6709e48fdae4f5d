//! Error types for the research lab
//!
//! Nothing here is fatal to the process:
//! - Unknown ids leave the store unchanged
//! - Illegal lifecycle requests are rejected without side effects
//! - Capacity and busy rejections can be retried later

use crate::types::{ExperimentId, ExperimentStatus};

/// Main lab error type
#[derive(Debug, thiserror::Error)]
pub enum LabError {
    /// No experiment with this id
    #[error("experiment not found: {0}")]
    ExperimentNotFound(ExperimentId),

    /// Status change not allowed by the lifecycle
    #[error("illegal transition: {from} -> {to}")]
    IllegalTransition {
        /// Current status
        from: ExperimentStatus,
        /// Requested status
        to: ExperimentStatus,
    },

    /// Running experiments already at the configured maximum
    #[error("at capacity: {limit} experiments already running")]
    AtCapacity {
        /// Configured maximum
        limit: usize,
    },

    /// Submitted topic was blank
    #[error("topic is empty")]
    EmptyTopic,

    /// Previous submission still being processed
    #[error("a submission is already being processed")]
    Busy,

    /// Simulation requested outside a Tokio runtime
    #[error("no Tokio runtime available to run the simulation")]
    NoRuntime,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LabError {
    /// Check if error is a missing-record error
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ExperimentNotFound(_))
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AtCapacity { .. } | Self::Busy)
    }
}

impl From<toml::de::Error> for LabError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for LabError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result alias for lab operations
pub type Result<T, E = LabError> = std::result::Result<T, E>;
