//! Experiment lifecycle transitions
//!
//! ```text
//! pending ──start──> running ──tick(progress >= 100)──> completed
//!    ^                  │
//!    └──────pause───────┤
//!                       └──(reserved)──> failed
//! ```

use crate::error::LabError;
use crate::types::ExperimentStatus;

/// User-facing action on an experiment card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExperimentAction {
    /// Attach the simulation
    Start,
    /// Detach the simulation, back to pending
    Pause,
    /// Select as the active experiment
    View,
    /// Remove the experiment
    Delete,
}

/// Validates a status transition.
pub fn validate_transition(
    from: ExperimentStatus,
    to: ExperimentStatus,
) -> Result<(), LabError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(LabError::IllegalTransition { from, to })
    }
}

/// Statuses reachable from `from` in one step
pub fn allowed_transitions(from: ExperimentStatus) -> Vec<ExperimentStatus> {
    use ExperimentStatus::*;
    match from {
        Pending => vec![Running],
        Running => vec![Pending, Completed, Failed],
        Completed => vec![],
        Failed => vec![],
    }
}

/// Actions a view offers for an experiment in `status`
pub fn available_actions(status: ExperimentStatus) -> Vec<ExperimentAction> {
    use ExperimentAction::*;
    match status {
        ExperimentStatus::Pending => vec![Start, View, Delete],
        ExperimentStatus::Running => vec![Pause, View, Delete],
        ExperimentStatus::Completed | ExperimentStatus::Failed => vec![View, Delete],
    }
}

fn allowed(from: ExperimentStatus, to: ExperimentStatus) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}
