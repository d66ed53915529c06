use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::TaskError;

/// Pipeline stage of a task. The derive order is the transition order:
/// a task only ever moves to a strictly greater state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Created,
    Downloading,
    Splitting,
    Transcribing,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Transcribing -> Transcribing is the per-chunk progress update.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            TaskState::Failed => true,
            TaskState::Transcribing => *self >= TaskState::Splitting,
            _ => next > *self,
        }
    }
}

impl Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    Tiny,
    #[default]
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    pub const ALL: [ModelSize; 5] = [
        ModelSize::Tiny,
        ModelSize::Base,
        ModelSize::Small,
        ModelSize::Medium,
        ModelSize::Large,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        }
    }

    /// ggml weight file expected in the model directory
    pub fn model_file(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "ggml-tiny.bin",
            ModelSize::Base => "ggml-base.bin",
            ModelSize::Small => "ggml-small.bin",
            ModelSize::Medium => "ggml-medium.bin",
            ModelSize::Large => "ggml-large-v3.bin",
        }
    }
}

impl FromStr for ModelSize {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelSize::ALL
            .into_iter()
            .find(|size| size.as_str() == s)
            .ok_or_else(|| TaskError::Validation("Invalid model size".to_string()))
    }
}

impl Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable input of one transcription job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub video_url: String,
    pub model_size: ModelSize,
    pub chunk_duration_ms: u64,
}

/// Point-in-time copy of a task's status fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub state: TaskState,
    pub progress_message: String,
    pub chunk_index: usize,
    pub chunk_total: usize,
    pub result: Option<String>,
    pub error: Option<String>,
    pub finished: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskSnapshot {
    pub fn new(task_id: &str) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.to_string(),
            state: TaskState::Created,
            progress_message: "Task created".to_string(),
            chunk_index: 0,
            chunk_total: 0,
            result: None,
            error: None,
            finished: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The closed set of fields a worker may change in one atomic update.
/// `finished` is not settable: it always follows `state`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub state: Option<TaskState>,
    pub progress_message: Option<String>,
    pub chunk_index: Option<usize>,
    pub chunk_total: Option<usize>,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            progress_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn stage(state: TaskState, message: impl Into<String>) -> Self {
        Self {
            state: Some(state),
            progress_message: Some(message.into()),
            ..Default::default()
        }
    }

    /// `done` chunks finished out of `total`; announces the next part.
    pub fn chunk_progress(done: usize, total: usize) -> Self {
        Self {
            state: Some(TaskState::Transcribing),
            progress_message: Some(format!("Transcribing part {} of {}...", done + 1, total)),
            chunk_index: Some(done),
            chunk_total: Some(total),
            ..Default::default()
        }
    }

    pub fn completed(text: String, total: usize) -> Self {
        Self {
            state: Some(TaskState::Completed),
            progress_message: Some("Transcription completed".to_string()),
            chunk_index: Some(total),
            chunk_total: Some(total),
            result: Some(text),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: Some(TaskState::Failed),
            progress_message: Some("Transcription failed".to_string()),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
