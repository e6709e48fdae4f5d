//! Read-only aggregates for the monitoring view

use crate::store::LabState;
use crate::types::{Experiment, ExperimentStatus, ResourceUsage};
use serde::Serialize;

/// Experiment counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// Pending experiments
    pub pending: usize,
    /// Running experiments
    pub running: usize,
    /// Completed experiments
    pub completed: usize,
    /// Failed experiments
    pub failed: usize,
}

impl StatusCounts {
    /// Total across all statuses
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed
    }
}

/// Snapshot summary shown on the monitoring page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSummary {
    /// Counts per status
    pub counts: StatusCounts,
    /// Mean load across running experiments (zero when none run)
    pub average_usage: ResourceUsage,
}

impl MonitoringSummary {
    /// Summarize a snapshot
    #[must_use]
    pub fn from_state(state: &LabState) -> Self {
        let mut counts = StatusCounts::default();
        for exp in &state.experiments {
            match exp.status {
                ExperimentStatus::Pending => counts.pending += 1,
                ExperimentStatus::Running => counts.running += 1,
                ExperimentStatus::Completed => counts.completed += 1,
                ExperimentStatus::Failed => counts.failed += 1,
            }
        }

        Self {
            counts,
            average_usage: average_usage(state.experiments_with_status(ExperimentStatus::Running)),
        }
    }
}

/// Channel-wise mean of the experiments' load samples
pub fn average_usage<'a>(experiments: impl IntoIterator<Item = &'a Experiment>) -> ResourceUsage {
    let mut total = ResourceUsage::zero();
    let mut n = 0u32;
    for exp in experiments {
        total.cpu += exp.resource_usage.cpu;
        total.memory += exp.resource_usage.memory;
        total.network += exp.resource_usage.network;
        total.storage += exp.resource_usage.storage;
        n += 1;
    }

    if n == 0 {
        return ResourceUsage::zero();
    }
    let n = f64::from(n);
    ResourceUsage::new(
        total.cpu / n,
        total.memory / n,
        total.network / n,
        total.storage / n,
    )
}
