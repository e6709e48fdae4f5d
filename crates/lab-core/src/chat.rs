//! Chat flow
//!
//! Turns a submitted topic into a user message, a scripted assistant reply
//! and a new pending experiment. The reply is templated text, not a
//! generated response.

use crate::error::{LabError, Result};
use crate::store::Store;
use crate::types::{ChatMessage, Experiment, ExperimentId, MessageId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Ids produced by one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    /// The user's message
    pub user_message: MessageId,
    /// The assistant reply
    pub reply: MessageId,
    /// The experiment created for the topic
    pub experiment: ExperimentId,
}

/// Assistant reply acknowledging a topic
#[must_use]
pub fn reply_text(topic: &str) -> String {
    format!(
        "I'll help you start a research experiment on \"{topic}\". Creating a new experiment with this topic."
    )
}

/// Chat submission handler; one submission at a time
#[derive(Debug)]
pub struct ChatFlow {
    store: Arc<Store>,
    reply_delay: Duration,
    name_topic_chars: usize,
    processing: AtomicBool,
}

/// Clears the processing flag when a submission ends or is dropped
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ChatFlow {
    /// Create a chat flow over `store`
    #[must_use]
    pub fn new(store: Arc<Store>, reply_delay: Duration, name_topic_chars: usize) -> Self {
        Self {
            store,
            reply_delay,
            name_topic_chars,
            processing: AtomicBool::new(false),
        }
    }

    /// Whether a submission is in flight
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Submit a topic.
    ///
    /// Appends the user message at once, then after the reply delay appends
    /// the assistant reply (referencing the new experiment) and adds the
    /// experiment as pending. The topic is stored verbatim.
    ///
    /// # Errors
    /// - `EmptyTopic` if the text is blank
    /// - `Busy` if another submission is still in flight
    pub async fn submit(&self, text: &str) -> Result<Submission> {
        if text.trim().is_empty() {
            return Err(LabError::EmptyTopic);
        }
        if self.processing.swap(true, Ordering::AcqRel) {
            return Err(LabError::Busy);
        }
        let _guard = ProcessingGuard(&self.processing);

        let user_message = self.store.add_message(ChatMessage::user(text));
        tokio::time::sleep(self.reply_delay).await;

        let experiment = Experiment::from_topic(text, self.name_topic_chars);
        let experiment_id = experiment.id;
        let reply = self
            .store
            .add_message(ChatMessage::assistant(reply_text(text)).with_experiment(experiment_id));
        self.store.add_experiment(experiment);

        tracing::info!(experiment = %experiment_id, topic = text, "experiment created from chat");
        Ok(Submission {
            user_message,
            reply,
            experiment: experiment_id,
        })
    }
}
