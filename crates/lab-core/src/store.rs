//! Observable state store
//!
//! Single owner of every experiment, chat message, the settings record and
//! the UI selection state. Mutators are synchronous: each one commits under
//! the store lock, bumps the revision and publishes a [`StoreEvent`] before
//! the lock is released, so subscribers receive events in strictly
//! increasing revision order and every event carries a fully applied
//! snapshot.
//!
//! Snapshots are persistent (`im`) copies; handing one out never aliases
//! store state.

use crate::error::{LabError, Result};
use crate::types::{
    AppSettings, ChatMessage, Experiment, ExperimentId, ExperimentPatch, ExperimentStatus,
    MessageId, Page, SettingsPatch,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default capacity of the notification channel
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Complete store state, as seen by readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabState {
    /// Experiments, in insertion order
    pub experiments: im::Vector<Experiment>,
    /// Selected experiment (not validated against `experiments`)
    pub active_experiment: Option<ExperimentId>,
    /// Chat history, in insertion order
    pub messages: im::Vector<ChatMessage>,
    /// Settings record
    pub settings: AppSettings,
    /// Whether the navigation sidebar is open
    pub sidebar_open: bool,
    /// Page currently shown
    pub current_page: Page,
}

impl LabState {
    /// Empty state with the given settings
    #[must_use]
    pub fn new(settings: AppSettings) -> Self {
        Self {
            experiments: im::Vector::new(),
            active_experiment: None,
            messages: im::Vector::new(),
            settings: settings.normalized(),
            sidebar_open: true,
            current_page: Page::Home,
        }
    }

    /// Look up an experiment
    #[must_use]
    pub fn experiment(&self, id: ExperimentId) -> Option<&Experiment> {
        self.experiments.iter().find(|e| e.id == id)
    }

    /// Experiments with the given status, in insertion order
    pub fn experiments_with_status(
        &self,
        status: ExperimentStatus,
    ) -> impl Iterator<Item = &Experiment> + '_ {
        self.experiments.iter().filter(move |e| e.status == status)
    }

    /// Number of running experiments
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.experiments_with_status(ExperimentStatus::Running).count()
    }

    /// The selected experiment, if it still exists
    #[must_use]
    pub fn active(&self) -> Option<&Experiment> {
        self.active_experiment.and_then(|id| self.experiment(id))
    }

    pub(crate) fn position(&self, id: ExperimentId) -> Option<usize> {
        self.experiments.iter().position(|e| e.id == id)
    }

    /// Remove `id`, clearing the selection if it pointed at it
    pub(crate) fn remove_experiment(&mut self, id: ExperimentId) -> Option<Experiment> {
        let removed = self.experiments.remove(self.position(id)?);
        if self.active_experiment == Some(id) {
            self.active_experiment = None;
        }
        Some(removed)
    }
}

impl Default for LabState {
    fn default() -> Self {
        Self::new(AppSettings::default())
    }
}

/// What a committed mutation changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// Experiment appended
    ExperimentAdded(ExperimentId),
    /// Experiment fields merged
    ExperimentUpdated(ExperimentId),
    /// Experiment removed
    ExperimentDeleted(ExperimentId),
    /// Selection pointer changed
    ActiveExperimentChanged(Option<ExperimentId>),
    /// Message appended
    MessageAdded(MessageId),
    /// Chat history emptied
    MessagesCleared,
    /// Settings merged
    SettingsUpdated,
    /// Sidebar opened or closed
    SidebarChanged(bool),
    /// Page switched
    PageChanged(Page),
}

/// Notification published after each committed mutation
#[derive(Debug, Clone)]
pub struct StoreEvent {
    /// Revision produced by the mutation
    pub revision: u64,
    /// What changed
    pub change: StoreChange,
    /// State right after the mutation
    pub state: Arc<LabState>,
}

/// Outcome of a transaction body
pub(crate) enum Commit<R> {
    /// State changed; publish the change
    Changed(StoreChange, R),
    /// Nothing changed; no revision, no event
    Unchanged(R),
}

#[derive(Debug)]
struct Inner {
    state: LabState,
    revision: u64,
}

/// The state store
///
/// Construct once and share through `Arc`.
#[derive(Debug)]
pub struct Store {
    inner: Mutex<Inner>,
    events: broadcast::Sender<StoreEvent>,
}

impl Store {
    /// Create a store with the given settings
    #[must_use]
    pub fn new(settings: AppSettings) -> Self {
        Self::with_event_buffer(settings, DEFAULT_EVENT_BUFFER)
    }

    /// Create a store with a custom notification buffer size
    #[must_use]
    pub fn with_event_buffer(settings: AppSettings, buffer: usize) -> Self {
        let (events, _) = broadcast::channel(buffer.max(1));
        Self {
            inner: Mutex::new(Inner {
                state: LabState::new(settings),
                revision: 0,
            }),
            events,
        }
    }

    /// Subscribe to change notifications.
    ///
    /// Only mutations committed after this call are delivered. A receiver
    /// that falls more than the buffer size behind gets
    /// `RecvError::Lagged` and resumes with the oldest retained event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Current state
    #[must_use]
    pub fn snapshot(&self) -> LabState {
        self.inner.lock().state.clone()
    }

    /// Current revision (number of committed mutations)
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.lock().revision
    }

    /// Copy of one experiment
    #[must_use]
    pub fn experiment(&self, id: ExperimentId) -> Option<Experiment> {
        self.inner.lock().state.experiment(id).cloned()
    }

    /// Copy of the settings record
    #[must_use]
    pub fn settings(&self) -> AppSettings {
        self.inner.lock().state.settings.clone()
    }

    /// Append an experiment.
    ///
    /// The caller supplies the id; uniqueness is not checked here.
    pub fn add_experiment(&self, experiment: Experiment) -> ExperimentId {
        let id = experiment.id;
        self.commit(|state| {
            state.experiments.push_back(experiment);
            Ok(Commit::Changed(StoreChange::ExperimentAdded(id), id))
        })
        .unwrap_or(id)
    }

    /// Merge `patch` into the experiment `id`.
    ///
    /// # Errors
    /// `ExperimentNotFound` if no such experiment; nothing is created and
    /// no event is published.
    pub fn update_experiment(&self, id: ExperimentId, patch: ExperimentPatch) -> Result<()> {
        self.commit(|state| {
            let idx = state
                .position(id)
                .ok_or(LabError::ExperimentNotFound(id))?;
            if let Some(experiment) = state.experiments.get_mut(idx) {
                experiment.apply(patch);
            }
            Ok(Commit::Changed(StoreChange::ExperimentUpdated(id), ()))
        })
    }

    /// Atomic read-modify-write of one experiment.
    ///
    /// `f` returns `None` to signal it left the record untouched; no event
    /// is published then. It must not mutate the record in that case.
    ///
    /// # Errors
    /// `ExperimentNotFound` if no such experiment.
    pub fn modify_experiment<R>(
        &self,
        id: ExperimentId,
        f: impl FnOnce(&mut Experiment) -> Option<R>,
    ) -> Result<Option<R>> {
        self.commit(|state| {
            let idx = state
                .position(id)
                .ok_or(LabError::ExperimentNotFound(id))?;
            let out = state.experiments.get_mut(idx).and_then(f);
            Ok(match out {
                Some(out) => Commit::Changed(StoreChange::ExperimentUpdated(id), Some(out)),
                None => Commit::Unchanged(None),
            })
        })
    }

    /// Remove an experiment, clearing the selection if it pointed at it.
    ///
    /// # Errors
    /// `ExperimentNotFound` if no such experiment; the collection is left
    /// unchanged.
    pub fn delete_experiment(&self, id: ExperimentId) -> Result<Experiment> {
        self.commit(|state| {
            let removed = state
                .remove_experiment(id)
                .ok_or(LabError::ExperimentNotFound(id))?;
            Ok(Commit::Changed(StoreChange::ExperimentDeleted(id), removed))
        })
    }

    /// Point the selection at `id` (or clear it); existence is not checked
    pub fn set_active_experiment(&self, id: Option<ExperimentId>) {
        self.commit_infallible(|state| {
            state.active_experiment = id;
            StoreChange::ActiveExperimentChanged(id)
        });
    }

    /// Append a chat message
    pub fn add_message(&self, message: ChatMessage) -> MessageId {
        let id = message.id;
        self.commit_infallible(|state| {
            state.messages.push_back(message);
            StoreChange::MessageAdded(id)
        });
        id
    }

    /// Empty the chat history
    pub fn clear_messages(&self) {
        self.commit_infallible(|state| {
            state.messages.clear();
            StoreChange::MessagesCleared
        });
    }

    /// Shallow-merge settings, returning the merged record
    pub fn update_settings(&self, patch: SettingsPatch) -> AppSettings {
        let mut merged = AppSettings::default();
        self.commit_infallible(|state| {
            state.settings.apply(patch);
            merged = state.settings.clone();
            StoreChange::SettingsUpdated
        });
        merged
    }

    /// Open or close the sidebar
    pub fn set_sidebar_open(&self, open: bool) {
        self.commit_infallible(|state| {
            state.sidebar_open = open;
            StoreChange::SidebarChanged(open)
        });
    }

    /// Switch page
    pub fn set_current_page(&self, page: Page) {
        self.commit_infallible(|state| {
            state.current_page = page;
            StoreChange::PageChanged(page)
        });
    }

    /// Run a transaction body under the store lock.
    ///
    /// On `Commit::Changed` the revision is bumped and the event published
    /// before the lock is released.
    pub(crate) fn commit<R>(
        &self,
        f: impl FnOnce(&mut LabState) -> Result<Commit<R>>,
    ) -> Result<R> {
        let mut inner = self.inner.lock();
        match f(&mut inner.state)? {
            Commit::Unchanged(out) => Ok(out),
            Commit::Changed(change, out) => {
                inner.revision += 1;
                let revision = inner.revision;
                tracing::trace!(revision, ?change, "store commit");
                if self.events.receiver_count() > 0 {
                    let event = StoreEvent {
                        revision,
                        change,
                        state: Arc::new(inner.state.clone()),
                    };
                    // Receivers may all drop between the check and the send
                    let _ = self.events.send(event);
                }
                Ok(out)
            }
        }
    }

    fn commit_infallible(&self, f: impl FnOnce(&mut LabState) -> StoreChange) {
        let _ = self.commit(|state| Ok(Commit::Changed(f(state), ())));
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(AppSettings::default())
    }
}
