//! Testing utilities for the research lab workspace
//!
//! Shared fixtures: deterministic labs, prebuilt experiments and helpers
//! for driving paused-clock simulations.

#![allow(missing_docs)]

use lab_core::{
    AppSettings, Experiment, ExperimentId, ExperimentStatus, FixedTickModel, Lab, LabConfig,
    LabState, ResourceUsage, SettingsPatch, Store,
};
use std::sync::Arc;
use std::time::Duration;

/// Tick interval used by fixture labs
pub const TEST_TICK: Duration = Duration::from_millis(100);

/// Load sample reported by [`fixed_model`]
pub const TEST_USAGE: ResourceUsage = ResourceUsage::new(50.0, 40.0, 20.0, 10.0);

/// A tick model adding `increment` progress per tick
#[must_use]
pub fn fixed_model(increment: f64) -> FixedTickModel {
    FixedTickModel::new(increment, TEST_USAGE)
}

/// Configuration with a short tick, no reply delay and a fixed seed
#[must_use]
pub fn fast_config() -> LabConfig {
    LabConfig::new()
        .with_tick_interval(TEST_TICK)
        .with_reply_delay(Duration::ZERO)
        .with_seed(7)
}

/// A lab whose experiments advance by `increment` every tick
#[must_use]
pub fn fixed_lab(increment: f64) -> Lab {
    Lab::with_models(fast_config(), fixed_model(increment).factory())
}

/// A lab with a fixed model and the given concurrency limit
#[must_use]
pub fn fixed_lab_with_limit(increment: f64, limit: i64) -> Lab {
    let lab = fixed_lab(increment);
    lab.update_settings(SettingsPatch::new().with_max_concurrent(limit));
    lab
}

/// An empty store with default settings
#[must_use]
pub fn test_store() -> Arc<Store> {
    Arc::new(Store::new(AppSettings::default()))
}

/// A pending experiment for `topic`
#[must_use]
pub fn pending_experiment(topic: &str) -> Experiment {
    Experiment::from_topic(topic, lab_core::types::NAME_TOPIC_CHARS)
}

/// An experiment already in `status` with the given progress
#[must_use]
pub fn experiment_with(topic: &str, status: ExperimentStatus, progress: f64) -> Experiment {
    let mut exp = pending_experiment(topic);
    exp.status = status;
    exp.progress = progress;
    if status.is_terminal() {
        exp.end_time = Some(exp.start_time);
    }
    exp
}

/// Add a pending experiment to the lab's store
pub fn seed_pending(lab: &Lab, topic: &str) -> ExperimentId {
    lab.store().add_experiment(pending_experiment(topic))
}

/// Advance the paused clock by `ticks` tick intervals, letting tick tasks run
pub async fn run_ticks(ticks: u32) {
    for _ in 0..ticks {
        tokio::time::sleep(TEST_TICK).await;
    }
    // let tasks woken by the last deadline observe it
    tokio::task::yield_now().await;
}

/// The experiment `id` in `state`, panicking if absent
#[must_use]
pub fn expect_experiment(state: &LabState, id: ExperimentId) -> &Experiment {
    state
        .experiment(id)
        .unwrap_or_else(|| panic!("experiment {id} missing from state"))
}
