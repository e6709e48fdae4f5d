//! Research lab facade
//!
//! Owns the store, the lifecycle engine and the chat flow, and is the one
//! object a view needs:
//! - Submits topics through the chat flow
//! - Starts, pauses, deletes and selects experiments
//! - Exposes snapshots, subscriptions and monitoring summaries

use crate::chat::{ChatFlow, Submission};
use crate::config::LabConfig;
use crate::engine::LifecycleEngine;
use crate::error::Result;
use crate::monitoring::MonitoringSummary;
use crate::simulation::{ModelFactory, UniformTickModel};
use crate::store::{LabState, Store, StoreEvent};
use crate::types::{AppSettings, Experiment, ExperimentId, Page, SettingsPatch};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// The research lab
#[derive(Debug)]
pub struct Lab {
    /// Configuration
    config: LabConfig,
    /// Shared state
    store: Arc<Store>,
    /// Experiment lifecycle
    engine: LifecycleEngine,
    /// Topic submissions
    chat: ChatFlow,
}

impl Lab {
    /// Create a lab with uniform random simulation
    #[must_use]
    pub fn new(config: LabConfig) -> Self {
        let bounds = config.clone().clamped();
        let models = UniformTickModel::factory(
            bounds.seed,
            bounds.max_progress_increment,
            bounds.resource_ceiling,
        );
        Self::with_models(config, models)
    }

    /// Create a lab with a custom tick model factory.
    ///
    /// Out-of-range configuration values are corrected, see
    /// [`LabConfig::clamped`].
    #[must_use]
    pub fn with_models(config: LabConfig, models: ModelFactory) -> Self {
        let requested = config.clone();
        let config = config.clamped();
        if config != requested {
            tracing::warn!("out-of-range configuration values were corrected");
        }
        let store = Arc::new(Store::with_event_buffer(
            config.settings.clone(),
            config.event_buffer,
        ));
        let engine = LifecycleEngine::new(Arc::clone(&store), config.tick_interval(), models);
        let chat = ChatFlow::new(
            Arc::clone(&store),
            config.reply_delay(),
            config.name_topic_chars,
        );

        Self {
            config,
            store,
            engine,
            chat,
        }
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &LabConfig {
        &self.config
    }

    /// Get the store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Get the lifecycle engine
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &LifecycleEngine {
        &self.engine
    }

    /// Current state
    #[must_use]
    pub fn snapshot(&self) -> LabState {
        self.store.snapshot()
    }

    /// Subscribe to store notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    /// Whether a topic submission is in flight
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.chat.is_processing()
    }

    /// Submit a research topic
    ///
    /// # Errors
    /// `EmptyTopic` or `Busy`, see [`ChatFlow::submit`].
    pub async fn submit_topic(&self, text: &str) -> Result<Submission> {
        self.chat.submit(text).await
    }

    /// Start (or resume) an experiment
    ///
    /// # Errors
    /// See [`LifecycleEngine::start`].
    pub fn start(&self, id: ExperimentId) -> Result<()> {
        self.engine.start(id)
    }

    /// Pause an experiment
    ///
    /// # Errors
    /// See [`LifecycleEngine::pause`].
    pub fn pause(&self, id: ExperimentId) -> Result<()> {
        self.engine.pause(id)
    }

    /// Delete an experiment
    ///
    /// # Errors
    /// See [`LifecycleEngine::delete`].
    pub fn delete(&self, id: ExperimentId) -> Result<Experiment> {
        self.engine.delete(id)
    }

    /// Select an experiment for the detail view
    pub fn select(&self, id: Option<ExperimentId>) {
        self.engine.select(id);
    }

    /// Merge settings
    pub fn update_settings(&self, patch: SettingsPatch) -> AppSettings {
        self.store.update_settings(patch)
    }

    /// Switch page
    pub fn navigate(&self, page: Page) {
        self.store.set_current_page(page);
    }

    /// Open or close the sidebar
    pub fn set_sidebar_open(&self, open: bool) {
        self.store.set_sidebar_open(open);
    }

    /// Empty the chat history
    pub fn clear_messages(&self) {
        self.store.clear_messages();
    }

    /// Monitoring aggregates of the current state
    #[must_use]
    pub fn monitoring(&self) -> MonitoringSummary {
        MonitoringSummary::from_state(&self.store.snapshot())
    }

    /// Wait until `pred` holds for the store state, returning that state.
    ///
    /// Checks the current state first, then every notification. A lagged
    /// subscription falls back to a fresh snapshot.
    pub async fn wait_for(&self, pred: impl Fn(&LabState) -> bool) -> LabState {
        let mut rx = self.store.subscribe();
        let state = self.store.snapshot();
        if pred(&state) {
            return state;
        }

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if pred(&event.state) {
                        return (*event.state).clone();
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "subscriber lagged, resyncing");
                    let state = self.store.snapshot();
                    if pred(&state) {
                        return state;
                    }
                }
                Err(RecvError::Closed) => return self.store.snapshot(),
            }
        }
    }

    /// Stop every simulation, returning running experiments to pending
    pub fn shutdown(&self) -> usize {
        self.engine.shutdown()
    }
}

impl Default for Lab {
    fn default() -> Self {
        Self::new(LabConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExperimentStatus, Theme};

    #[test]
    fn lab_creation() {
        let lab = Lab::default();
        assert_eq!(lab.config().tick_interval_ms, 2000);
        assert_eq!(lab.snapshot().settings.max_concurrent_experiments, 5);
    }

    #[test]
    fn lab_uses_configured_settings() {
        let settings = AppSettings {
            theme: Theme::Dark,
            ..AppSettings::default()
        };
        let lab = Lab::new(LabConfig::new().with_settings(settings));
        assert_eq!(lab.snapshot().settings.theme, Theme::Dark);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_sees_current_state() {
        let lab = Lab::default();
        let state = lab.wait_for(|s| s.experiments.is_empty()).await;
        assert!(state.experiments.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn submit_then_start() {
        let lab = Lab::default();
        let submission = lab.submit_topic("graph theory").await.unwrap();

        lab.start(submission.experiment).unwrap();

        let exp = lab.store().experiment(submission.experiment).unwrap();
        assert_eq!(exp.status, ExperimentStatus::Running);
        assert!(lab.engine().is_simulating(submission.experiment));
        assert_eq!(lab.monitoring().counts.running, 1);
    }
}
