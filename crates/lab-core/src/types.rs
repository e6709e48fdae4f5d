//! Core types for the research lab
//!
//! Defines the entity model shared by the store, the lifecycle engine and
//! any view reading snapshots:
//! - Identifiers (ULID, monotonic within the process)
//! - Experiments with their status, progress and resource usage
//! - Chat messages
//! - Application settings and UI selection state
//! - Agent and result descriptors reserved for later use

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ulid::{Generator, Ulid};

/// Number of topic characters kept in a derived experiment name
pub const NAME_TOPIC_CHARS: usize = 50;

/// Prefix of every derived experiment name
pub const NAME_PREFIX: &str = "Research: ";

/// Lowest accepted value for `max_concurrent_experiments`
pub const MIN_CONCURRENT_EXPERIMENTS: usize = 1;

/// Highest accepted value for `max_concurrent_experiments`
pub const MAX_CONCURRENT_EXPERIMENTS: usize = 10;

static ID_GENERATOR: Lazy<Mutex<Generator>> = Lazy::new(|| Mutex::new(Generator::new()));

/// Next process-unique ULID.
///
/// Ids generated in the same millisecond are strictly increasing, so two
/// ids handed out by one process never collide.
fn next_ulid() -> Ulid {
    ID_GENERATOR
        .lock()
        .generate()
        .unwrap_or_else(|_| Ulid::new())
}

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Ulid);

        impl $name {
            /// Generate new identifier
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(next_ulid())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ulid::from_string(s).map(Self)
            }
        }
    };
}

ulid_id!(
    /// Unique experiment identifier (ULID for sortability)
    ExperimentId
);
ulid_id!(
    /// Unique chat message identifier
    MessageId
);
ulid_id!(
    /// Unique agent identifier
    AgentId
);
ulid_id!(
    /// Unique experiment result identifier
    ResultId
);

/// Experiment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    /// Created, waiting for a start trigger
    #[default]
    Pending,
    /// Simulation attached and ticking
    Running,
    /// Reached 100% progress
    Completed,
    /// Reserved terminal state, never entered by the simulation
    Failed,
}

impl ExperimentStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [ExperimentStatus; 4] = [
        ExperimentStatus::Pending,
        ExperimentStatus::Running,
        ExperimentStatus::Completed,
        ExperimentStatus::Failed,
    ];

    /// Whether no further transition can leave this status
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Lowercase name, as serialized
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synthetic instantaneous load sample of an experiment
///
/// Each channel is a percentage-like value. Samples are not cumulative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// CPU load
    pub cpu: f64,
    /// Memory load
    pub memory: f64,
    /// Network I/O load
    pub network: f64,
    /// Storage load
    pub storage: f64,
}

impl ResourceUsage {
    /// All channels at zero
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            cpu: 0.0,
            memory: 0.0,
            network: 0.0,
            storage: 0.0,
        }
    }

    /// Create a sample from its four channels
    #[inline]
    #[must_use]
    pub const fn new(cpu: f64, memory: f64, network: f64, storage: f64) -> Self {
        Self {
            cpu,
            memory,
            network,
            storage,
        }
    }

    /// Whether every channel is zero
    #[inline]
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    /// Copy with every channel moved into [0, 100]; NaN becomes 0
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            cpu: clamp_progress(self.cpu),
            memory: clamp_progress(self.memory),
            network: clamp_progress(self.network),
            storage: clamp_progress(self.storage),
        }
    }
}

/// Worker agent status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Waiting for work
    #[default]
    Idle,
    /// Executing a task
    Working,
    /// Stopped on an error
    Error,
    /// Not reachable
    Offline,
}

/// Agent performance counters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPerformance {
    /// CPU usage of the agent
    pub cpu_usage: f64,
    /// Memory usage of the agent
    pub memory_usage: f64,
    /// Tasks finished so far
    pub tasks_completed: u64,
}

/// Worker descriptor attached to an experiment
///
/// The simulation never populates agents; they are carried through the
/// store untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Agent ID
    pub id: AgentId,
    /// Display name
    pub name: String,
    /// Agent type (role label)
    #[serde(rename = "type")]
    pub kind: String,
    /// Current status
    pub status: AgentStatus,
    /// Task being worked on, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    /// Performance counters
    pub performance: AgentPerformance,
}

impl Agent {
    /// Create an idle agent
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: AgentId::new(),
            name: name.into(),
            kind: kind.into(),
            status: AgentStatus::Idle,
            current_task: None,
            performance: AgentPerformance::default(),
        }
    }

    /// With a current task (marks the agent as working)
    #[inline]
    #[must_use]
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.current_task = Some(task.into());
        self.status = AgentStatus::Working;
        self
    }
}

/// Kind of an experiment result entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// Free text
    Text,
    /// Chart description
    Chart,
    /// Raw data
    Data,
    /// Citation
    Citation,
}

/// Result entry produced by an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    /// Result ID
    pub id: ResultId,
    /// Result kind
    #[serde(rename = "type")]
    pub kind: ResultKind,
    /// Opaque payload
    pub content: serde_json::Value,
    /// When the result was recorded
    pub timestamp: DateTime<Utc>,
    /// Where the result came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ExperimentResult {
    /// Create a result stamped now
    #[inline]
    #[must_use]
    pub fn new(kind: ResultKind, content: serde_json::Value) -> Self {
        Self {
            id: ResultId::new(),
            kind,
            content,
            timestamp: Utc::now(),
            source: None,
        }
    }

    /// With source attribution
    #[inline]
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// A tracked, simulated research task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    /// Experiment ID, immutable
    pub id: ExperimentId,
    /// Display label derived from the topic
    pub name: String,
    /// Original topic text, verbatim
    pub topic: String,
    /// Lifecycle status
    pub status: ExperimentStatus,
    /// Progress percentage in [0, 100]
    pub progress: f64,
    /// Creation time
    pub start_time: DateTime<Utc>,
    /// Set exactly when the status is terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Latest synthetic load sample
    pub resource_usage: ResourceUsage,
    /// Worker descriptors (reserved)
    #[serde(default)]
    pub agents: Vec<Agent>,
    /// Result entries (reserved)
    #[serde(default)]
    pub results: Vec<ExperimentResult>,
}

impl Experiment {
    /// Create a pending experiment with an explicit name
    #[must_use]
    pub fn new(name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            id: ExperimentId::new(),
            name: name.into(),
            topic: topic.into(),
            status: ExperimentStatus::Pending,
            progress: 0.0,
            start_time: Utc::now(),
            end_time: None,
            resource_usage: ResourceUsage::zero(),
            agents: Vec::new(),
            results: Vec::new(),
        }
    }

    /// Create a pending experiment named after its topic
    ///
    /// The name keeps at most `max_chars` characters of the topic.
    #[must_use]
    pub fn from_topic(topic: &str, max_chars: usize) -> Self {
        Self::new(experiment_name(topic, max_chars), topic)
    }

    /// Whether the status is terminal
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merge a patch into this record.
    ///
    /// Progress is clamped to [0, 100]. Entering a terminal status stamps
    /// `end_time` (unless the patch supplies one) and leaving it clears
    /// `end_time`; an `end_time` in a patch is only kept when the resulting
    /// status is terminal.
    pub fn apply(&mut self, patch: ExperimentPatch) {
        let ExperimentPatch {
            name,
            topic,
            status,
            progress,
            end_time,
            resource_usage,
            agents,
            results,
        } = patch;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(topic) = topic {
            self.topic = topic;
        }
        if let Some(progress) = progress {
            self.progress = clamp_progress(progress);
        }
        if let Some(usage) = resource_usage {
            self.resource_usage = usage;
        }
        if let Some(agents) = agents {
            self.agents = agents;
        }
        if let Some(results) = results {
            self.results = results;
        }
        if let Some(status) = status {
            self.status = status;
        }

        if self.status.is_terminal() {
            if let Some(end) = end_time {
                self.end_time = Some(end);
            } else if self.end_time.is_none() {
                self.end_time = Some(Utc::now());
            }
        } else {
            self.end_time = None;
        }
    }
}

/// Partial update of an experiment; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentPatch {
    /// New name
    pub name: Option<String>,
    /// New topic
    pub topic: Option<String>,
    /// New status
    pub status: Option<ExperimentStatus>,
    /// New progress
    pub progress: Option<f64>,
    /// Explicit end time (terminal statuses only)
    pub end_time: Option<DateTime<Utc>>,
    /// New load sample
    pub resource_usage: Option<ResourceUsage>,
    /// Replacement agent list
    pub agents: Option<Vec<Agent>>,
    /// Replacement result list
    pub results: Option<Vec<ExperimentResult>>,
}

impl ExperimentPatch {
    /// Empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With status
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: ExperimentStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// With progress
    #[inline]
    #[must_use]
    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    /// With end time
    #[inline]
    #[must_use]
    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    /// With resource usage
    #[inline]
    #[must_use]
    pub fn with_resource_usage(mut self, usage: ResourceUsage) -> Self {
        self.resource_usage = Some(usage);
        self
    }

    /// With agents
    #[inline]
    #[must_use]
    pub fn with_agents(mut self, agents: Vec<Agent>) -> Self {
        self.agents = Some(agents);
        self
    }

    /// With name
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Derive a display name from a topic.
///
/// Keeps the first `max_chars` characters and appends `...` when the topic
/// is longer. Counts characters, never splitting a code point.
#[must_use]
pub fn experiment_name(topic: &str, max_chars: usize) -> String {
    let mut chars = topic.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{NAME_PREFIX}{head}...")
    } else {
        format!("{NAME_PREFIX}{head}")
    }
}

/// Clamp a progress value into [0, 100]; NaN becomes 0
#[inline]
#[must_use]
pub fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 100.0)
    }
}

/// Who wrote a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    /// Typed by the user
    User,
    /// Scripted assistant reply
    Assistant,
}

/// Chat message; never mutated once stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message ID
    pub id: MessageId,
    /// Free text
    pub content: String,
    /// Author
    pub sender: MessageSender,
    /// When the message was written
    pub timestamp: DateTime<Utc>,
    /// Associated experiment, if any (association only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<ExperimentId>,
}

impl ChatMessage {
    /// Create a message stamped now
    #[inline]
    #[must_use]
    pub fn new(sender: MessageSender, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            content: content.into(),
            sender,
            timestamp: Utc::now(),
            experiment_id: None,
        }
    }

    /// User message
    #[inline]
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageSender::User, content)
    }

    /// Assistant message
    #[inline]
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageSender::Assistant, content)
    }

    /// With experiment back-reference
    #[inline]
    #[must_use]
    pub fn with_experiment(mut self, id: ExperimentId) -> Self {
        self.experiment_id = Some(id);
        self
    }
}

/// Color theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light theme
    #[default]
    Light,
    /// Dark theme
    Dark,
    /// Follow the system
    Auto,
}

/// Dashboard page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    /// Chat entry page
    #[default]
    Home,
    /// Experiment management
    Experiments,
    /// Resource monitoring
    Monitoring,
    /// Settings form
    Settings,
}

/// Application settings (single instance)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Color theme
    pub theme: Theme,
    /// Whether notifications are shown
    pub notifications: bool,
    /// Whether settings save automatically
    pub auto_save: bool,
    /// Advisory concurrency limit, enforced on start
    pub max_concurrent_experiments: usize,
    /// Provider name -> credential
    pub api_config: BTreeMap<String, String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            notifications: true,
            auto_save: true,
            max_concurrent_experiments: 5,
            api_config: BTreeMap::new(),
        }
    }
}

impl AppSettings {
    /// Well-known API providers
    pub const PROVIDERS: [&'static str; 3] = ["openai", "anthropic", "perplexity"];

    /// Shallow-merge a patch; unset fields keep their value
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(theme) = patch.theme {
            self.theme = theme;
        }
        if let Some(notifications) = patch.notifications {
            self.notifications = notifications;
        }
        if let Some(auto_save) = patch.auto_save {
            self.auto_save = auto_save;
        }
        if let Some(max) = patch.max_concurrent_experiments {
            self.max_concurrent_experiments = clamp_max_concurrent(max);
        }
        if let Some(api_config) = patch.api_config {
            self.api_config = api_config;
        }
    }

    /// Copy with every numeric field moved into its valid range
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_concurrent_experiments =
            clamp_max_concurrent(i64::try_from(self.max_concurrent_experiments).unwrap_or(i64::MAX));
        self
    }

    /// Credential for a provider, if configured and non-empty
    #[must_use]
    pub fn api_key(&self, provider: &str) -> Option<&str> {
        self.api_config
            .get(provider)
            .map(String::as_str)
            .filter(|key| !key.is_empty())
    }
}

/// Clamp a user-entered concurrency limit into the accepted range
#[inline]
#[must_use]
pub fn clamp_max_concurrent(value: i64) -> usize {
    usize::try_from(value.max(0)).map_or(MAX_CONCURRENT_EXPERIMENTS, |value| {
        value.clamp(MIN_CONCURRENT_EXPERIMENTS, MAX_CONCURRENT_EXPERIMENTS)
    })
}

/// Partial settings update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    /// New theme
    pub theme: Option<Theme>,
    /// New notifications flag
    pub notifications: Option<bool>,
    /// New auto-save flag
    pub auto_save: Option<bool>,
    /// New concurrency limit, clamped on apply
    pub max_concurrent_experiments: Option<i64>,
    /// Replacement credential map (replaced whole, not merged)
    pub api_config: Option<BTreeMap<String, String>>,
}

impl SettingsPatch {
    /// Empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With theme
    #[inline]
    #[must_use]
    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = Some(theme);
        self
    }

    /// With notifications flag
    #[inline]
    #[must_use]
    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notifications = Some(enabled);
        self
    }

    /// With auto-save flag
    #[inline]
    #[must_use]
    pub fn with_auto_save(mut self, enabled: bool) -> Self {
        self.auto_save = Some(enabled);
        self
    }

    /// With concurrency limit
    #[inline]
    #[must_use]
    pub fn with_max_concurrent(mut self, max: i64) -> Self {
        self.max_concurrent_experiments = Some(max);
        self
    }

    /// With credential map
    #[inline]
    #[must_use]
    pub fn with_api_config(mut self, api_config: BTreeMap<String, String>) -> Self {
        self.api_config = Some(api_config);
        self
    }
}
