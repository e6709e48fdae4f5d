//! Progress and resource-usage simulation
//!
//! A [`TickModel`] supplies the random draws; [`advance`] applies one tick
//! to a running experiment. Both are pure with respect to the store: the
//! lifecycle engine runs `advance` inside an atomic store update.

use crate::types::{
    clamp_progress, Experiment, ExperimentId, ExperimentPatch, ExperimentStatus, ResourceUsage,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default upper bound of one progress increment (percentage points)
pub const DEFAULT_MAX_INCREMENT: f64 = 10.0;

/// Default per-channel upper bounds of a resource sample
pub const DEFAULT_RESOURCE_CEILING: ResourceUsage = ResourceUsage::new(80.0, 60.0, 40.0, 30.0);

/// Source of per-tick draws
pub trait TickModel: Send {
    /// Progress to add this tick; negative values are treated as zero
    fn progress_increment(&mut self) -> f64;

    /// Fresh load sample for this tick
    fn resource_sample(&mut self) -> ResourceUsage;
}

/// Builds one model per started simulation
pub type ModelFactory = Arc<dyn Fn(ExperimentId) -> Box<dyn TickModel> + Send + Sync>;

/// Uniform draws: increment in `[0, max_increment)`, each channel in
/// `[0, ceiling)`. Samples are neither clamped nor smoothed.
#[derive(Debug, Clone)]
pub struct UniformTickModel {
    rng: StdRng,
    max_increment: f64,
    ceiling: ResourceUsage,
}

impl UniformTickModel {
    /// Create from an explicit generator.
    ///
    /// The increment bound and every ceiling are clamped into [0, 100], so
    /// draws always come from a finite range.
    #[must_use]
    pub fn new(rng: StdRng, max_increment: f64, ceiling: ResourceUsage) -> Self {
        Self {
            rng,
            max_increment: clamp_progress(max_increment),
            ceiling: ceiling.clamped(),
        }
    }

    /// Deterministic model
    #[must_use]
    pub fn seeded(seed: u64, max_increment: f64, ceiling: ResourceUsage) -> Self {
        Self::new(StdRng::seed_from_u64(seed), max_increment, ceiling)
    }

    /// Model seeded from the OS
    #[must_use]
    pub fn from_os_rng(max_increment: f64, ceiling: ResourceUsage) -> Self {
        Self::new(StdRng::from_os_rng(), max_increment, ceiling)
    }

    /// Factory handing out uniform models.
    ///
    /// With a seed, the n-th model built gets `seed + n`, so a run is
    /// reproducible as long as experiments start in the same order.
    #[must_use]
    pub fn factory(seed: Option<u64>, max_increment: f64, ceiling: ResourceUsage) -> ModelFactory {
        let counter = AtomicU64::new(0);
        Arc::new(move |_id| -> Box<dyn TickModel> {
            match seed {
                Some(seed) => {
                    let n = counter.fetch_add(1, Ordering::Relaxed);
                    Box::new(Self::seeded(seed.wrapping_add(n), max_increment, ceiling))
                }
                None => Box::new(Self::from_os_rng(max_increment, ceiling)),
            }
        })
    }

    fn draw(&mut self, upper: f64) -> f64 {
        if upper > 0.0 {
            self.rng.random_range(0.0..upper)
        } else {
            0.0
        }
    }
}

impl TickModel for UniformTickModel {
    fn progress_increment(&mut self) -> f64 {
        self.draw(self.max_increment)
    }

    fn resource_sample(&mut self) -> ResourceUsage {
        let ceiling = self.ceiling;
        ResourceUsage {
            cpu: self.draw(ceiling.cpu),
            memory: self.draw(ceiling.memory),
            network: self.draw(ceiling.network),
            storage: self.draw(ceiling.storage),
        }
    }
}

/// Model with fixed output, for reproducible runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedTickModel {
    /// Increment returned every tick
    pub increment: f64,
    /// Sample returned every tick
    pub usage: ResourceUsage,
}

impl FixedTickModel {
    /// Create a fixed model
    #[must_use]
    pub const fn new(increment: f64, usage: ResourceUsage) -> Self {
        Self { increment, usage }
    }

    /// Factory handing out copies of this model
    #[must_use]
    pub fn factory(self) -> ModelFactory {
        Arc::new(move |_id| -> Box<dyn TickModel> { Box::new(self) })
    }
}

impl TickModel for FixedTickModel {
    fn progress_increment(&mut self) -> f64 {
        self.increment
    }

    fn resource_sample(&mut self) -> ResourceUsage {
        self.usage
    }
}

/// Result of one applied tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Progress moved and resources were resampled
    Advanced {
        /// Progress after the tick
        progress: f64,
    },
    /// Progress had reached 100; the experiment is now completed
    Completed,
}

/// Apply one tick to `experiment`.
///
/// Returns `None` (leaving the record untouched) unless the experiment is
/// running. A running experiment whose progress already reached 100 is
/// completed instead of advanced.
pub fn advance(experiment: &mut Experiment, model: &mut dyn TickModel) -> Option<TickOutcome> {
    if experiment.status != ExperimentStatus::Running {
        return None;
    }

    if experiment.progress >= 100.0 {
        experiment.apply(
            ExperimentPatch::new()
                .with_progress(100.0)
                .with_status(ExperimentStatus::Completed),
        );
        return Some(TickOutcome::Completed);
    }

    // f64::max drops NaN, so a bad draw never moves progress backwards
    let increment = model.progress_increment().max(0.0);
    experiment.progress = clamp_progress(experiment.progress + increment);
    experiment.resource_usage = model.resource_sample();

    Some(TickOutcome::Advanced {
        progress: experiment.progress,
    })
}
