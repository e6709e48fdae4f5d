//! Research Lab Core
//!
//! The experiment lifecycle and shared-state engine behind the research
//! dashboard:
//! - A single observable store for experiments, chat messages and settings
//! - The status rules of an experiment (pending → running → completed)
//! - A timer-driven simulation advancing running experiments
//! - The chat flow that creates experiments from submitted topics
//!
//! # Example
//!
//! ```rust,no_run
//! use lab_core::{Lab, LabConfig, ExperimentStatus};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let lab = Lab::new(LabConfig::new());
//!
//! let submission = lab.submit_topic("quantum computing").await?;
//! lab.start(submission.experiment)?;
//!
//! let state = lab
//!     .wait_for(|s| s.experiments.iter().all(|e| e.status == ExperimentStatus::Completed))
//!     .await;
//! println!("{} experiments done", state.experiments.len());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod chat;
pub mod config;
pub mod engine;
pub mod error;
pub mod lab;
pub mod monitoring;
pub mod simulation;
pub mod state_machine;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use chat::{ChatFlow, Submission};
pub use config::LabConfig;
pub use engine::LifecycleEngine;
pub use error::{LabError, Result};
pub use lab::Lab;
pub use monitoring::{MonitoringSummary, StatusCounts};
pub use simulation::{FixedTickModel, ModelFactory, TickModel, TickOutcome, UniformTickModel};
pub use state_machine::{allowed_transitions, available_actions, validate_transition, ExperimentAction};
pub use store::{LabState, Store, StoreChange, StoreEvent};
pub use types::{
    Agent, AgentId, AgentPerformance, AgentStatus, AppSettings, ChatMessage, Experiment,
    ExperimentId, ExperimentPatch, ExperimentResult, ExperimentStatus, MessageId, MessageSender,
    Page, ResourceUsage, ResultId, ResultKind, SettingsPatch, Theme,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the lab
    pub use crate::{
        ExperimentId, ExperimentPatch, ExperimentStatus, Lab, LabConfig, LabError, LabState,
        SettingsPatch, Store, StoreEvent,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn lab_full_flow() {
        let config = LabConfig::new()
            .with_seed(11)
            .with_tick_interval(Duration::from_millis(100));
        let lab = Lab::new(config);

        let submission = lab.submit_topic("protein folding").await.unwrap();
        lab.start(submission.experiment).unwrap();

        let state = lab
            .wait_for(|s| {
                s.experiment(submission.experiment)
                    .is_some_and(Experiment::is_finished)
            })
            .await;

        let exp = state.experiment(submission.experiment).unwrap();
        assert_eq!(exp.status, ExperimentStatus::Completed);
        assert_eq!(exp.progress, 100.0);
        assert!(exp.end_time.unwrap() >= exp.start_time);
        assert_eq!(lab.engine().active_simulations(), 0);
    }

    #[test]
    fn types_integration() {
        let exp = Experiment::from_topic("soil microbes", types::NAME_TOPIC_CHARS);
        assert_eq!(exp.name, "Research: soil microbes");
        assert_eq!(available_actions(exp.status)[0], ExperimentAction::Start);
    }
}
