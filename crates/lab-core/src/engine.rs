//! Lifecycle engine
//!
//! Drives experiments from `pending` to `completed`:
//! - `start` moves a pending experiment to running and attaches a tick task
//! - each tick advances progress and resamples resource usage
//! - `pause` detaches the task and returns the experiment to pending
//! - `delete` detaches the task and removes the record
//!
//! Tick tasks hold only the experiment id and resolve the record through
//! the store on every tick, inside an atomic store update.

use crate::error::{LabError, Result};
use crate::simulation::{advance, ModelFactory, TickModel, TickOutcome};
use crate::state_machine::validate_transition;
use crate::store::{Commit, Store, StoreChange};
use crate::types::{Experiment, ExperimentId, ExperimentPatch, ExperimentStatus};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Handle of one attached tick task
#[derive(Debug)]
struct SimulationHandle {
    /// Distinguishes a restarted simulation from the one it replaced
    generation: u64,
    task: JoinHandle<()>,
}

impl SimulationHandle {
    /// Stop the task; aborting twice is harmless
    fn cancel(&self) {
        self.task.abort();
    }
}

type Simulations = Arc<DashMap<ExperimentId, SimulationHandle>>;

/// Shortest tick interval the engine schedules
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Timer-driven experiment lifecycle
pub struct LifecycleEngine {
    store: Arc<Store>,
    tick_interval: Duration,
    models: ModelFactory,
    simulations: Simulations,
    generations: AtomicU64,
}

impl std::fmt::Debug for LifecycleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleEngine")
            .field("tick_interval", &self.tick_interval)
            .field("active_simulations", &self.simulations.len())
            .finish_non_exhaustive()
    }
}

impl LifecycleEngine {
    /// Create an engine over `store`; the interval is at least 1 ms
    #[must_use]
    pub fn new(store: Arc<Store>, tick_interval: Duration, models: ModelFactory) -> Self {
        Self {
            store,
            tick_interval: tick_interval.max(MIN_TICK_INTERVAL),
            models,
            simulations: Arc::new(DashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    /// Store this engine mutates
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Tick interval
    #[inline]
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Start a pending experiment.
    ///
    /// Progress is kept, so starting a paused experiment resumes it. The
    /// status change and the tick task registration happen under one store
    /// commit.
    ///
    /// # Errors
    /// - `NoRuntime` outside a Tokio runtime (nothing changes)
    /// - `ExperimentNotFound` for an unknown id
    /// - `IllegalTransition` unless the experiment is pending
    /// - `AtCapacity` when `max_concurrent_experiments` experiments are
    ///   already running
    pub fn start(&self, id: ExperimentId) -> Result<()> {
        let result = Handle::try_current()
            .map_err(|_| LabError::NoRuntime)
            .and_then(|runtime| {
                self.store.commit(|state| {
                    let limit = state.settings.max_concurrent_experiments;
                    let running = state.running_count();
                    let idx = state
                        .position(id)
                        .ok_or(LabError::ExperimentNotFound(id))?;
                    let Some(experiment) = state.experiments.get_mut(idx) else {
                        return Err(LabError::ExperimentNotFound(id));
                    };

                    validate_transition(experiment.status, ExperimentStatus::Running)?;
                    if running >= limit {
                        return Err(LabError::AtCapacity { limit });
                    }

                    experiment.apply(ExperimentPatch::new().with_status(ExperimentStatus::Running));
                    self.attach(&runtime, id);
                    Ok(Commit::Changed(StoreChange::ExperimentUpdated(id), limit))
                })
            });

        match result {
            Ok(limit) => {
                tracing::info!(experiment = %id, limit, "experiment started");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(experiment = %id, error = %err, "start rejected");
                Err(err)
            }
        }
    }

    /// Pause a running experiment back to pending.
    ///
    /// Progress is not reset. Pausing a pending experiment changes nothing.
    /// The tick task is cancelled inside the same store commit as the status
    /// change, so a concurrent `start` can never lose its new task.
    ///
    /// # Errors
    /// - `ExperimentNotFound` for an unknown id
    /// - `IllegalTransition` for a completed or failed experiment
    pub fn pause(&self, id: ExperimentId) -> Result<()> {
        let paused = self.store.commit(|state| {
            let idx = state
                .position(id)
                .ok_or(LabError::ExperimentNotFound(id))?;
            let Some(experiment) = state.experiments.get_mut(idx) else {
                return Err(LabError::ExperimentNotFound(id));
            };

            match experiment.status {
                ExperimentStatus::Pending => {
                    self.detach(id);
                    Ok(Commit::Unchanged(false))
                }
                status => {
                    validate_transition(status, ExperimentStatus::Pending)?;
                    experiment.apply(ExperimentPatch::new().with_status(ExperimentStatus::Pending));
                    self.detach(id);
                    Ok(Commit::Changed(StoreChange::ExperimentUpdated(id), true))
                }
            }
        })?;

        if paused {
            tracing::info!(experiment = %id, "experiment paused");
        }
        Ok(())
    }

    /// Stop any simulation of `id` and remove the experiment.
    ///
    /// # Errors
    /// `ExperimentNotFound` for an unknown id (the store is unchanged).
    pub fn delete(&self, id: ExperimentId) -> Result<Experiment> {
        let removed = self.store.commit(|state| {
            self.detach(id);
            let removed = state
                .remove_experiment(id)
                .ok_or(LabError::ExperimentNotFound(id))?;
            Ok(Commit::Changed(StoreChange::ExperimentDeleted(id), removed))
        })?;
        tracing::info!(experiment = %id, "experiment deleted");
        Ok(removed)
    }

    /// Select an experiment (or clear the selection)
    pub fn select(&self, id: Option<ExperimentId>) {
        self.store.set_active_experiment(id);
    }

    /// Whether a tick task is attached to `id`
    #[must_use]
    pub fn is_simulating(&self, id: ExperimentId) -> bool {
        self.simulations.contains_key(&id)
    }

    /// Number of attached tick tasks
    #[must_use]
    pub fn active_simulations(&self) -> usize {
        self.simulations.len()
    }

    /// Detach every tick task and return the affected experiments to
    /// pending. Returns how many simulations were stopped.
    pub fn shutdown(&self) -> usize {
        let ids: Vec<ExperimentId> = self.simulations.iter().map(|e| *e.key()).collect();
        let mut stopped = 0;
        for id in ids {
            let detached = self.store.commit(|state| {
                let detached = self.detach(id);
                let running = state
                    .position(id)
                    .and_then(|idx| state.experiments.get_mut(idx))
                    .filter(|exp| exp.status == ExperimentStatus::Running);
                Ok(match running {
                    Some(exp) => {
                        exp.apply(ExperimentPatch::new().with_status(ExperimentStatus::Pending));
                        Commit::Changed(StoreChange::ExperimentUpdated(id), detached)
                    }
                    None => Commit::Unchanged(detached),
                })
            });
            if matches!(detached, Ok(true)) {
                stopped += 1;
            }
        }
        if stopped > 0 {
            tracing::info!(stopped, "lifecycle engine shut down");
        }
        stopped
    }

    /// Spawn the tick task for `id`, replacing any previous one.
    ///
    /// Called with the store lock held.
    fn attach(&self, runtime: &Handle, id: ExperimentId) {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let model = (self.models)(id);

        // Holding the entry keeps the task from deregistering before the
        // handle is stored.
        let entry = self.simulations.entry(id);
        let task = runtime.spawn(run_simulation(
            Arc::clone(&self.store),
            Arc::clone(&self.simulations),
            id,
            generation,
            self.tick_interval,
            model,
        ));
        let handle = SimulationHandle { generation, task };
        let previous = match entry {
            Entry::Occupied(mut occupied) => Some(occupied.insert(handle)),
            Entry::Vacant(vacant) => {
                vacant.insert(handle);
                None
            }
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    /// Cancel the tick task for `id`, if any.
    ///
    /// Called with the store lock held.
    fn detach(&self, id: ExperimentId) -> bool {
        match self.simulations.remove(&id) {
            Some((_, handle)) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }
}

impl Drop for LifecycleEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Tick loop of one experiment
async fn run_simulation(
    store: Arc<Store>,
    simulations: Simulations,
    id: ExperimentId,
    generation: u64,
    period: Duration,
    mut model: Box<dyn TickModel>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match store.modify_experiment(id, |exp| advance(exp, model.as_mut())) {
            Ok(Some(TickOutcome::Advanced { progress })) => {
                tracing::debug!(experiment = %id, progress, "tick");
            }
            Ok(Some(TickOutcome::Completed)) => {
                tracing::info!(experiment = %id, "experiment completed");
                break;
            }
            Ok(None) => {
                tracing::debug!(experiment = %id, "experiment no longer running");
                break;
            }
            Err(_) => {
                tracing::debug!(experiment = %id, "experiment removed");
                break;
            }
        }
    }

    simulations.remove_if(&id, |_, handle| handle.generation == generation);
}
