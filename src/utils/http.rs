use serde::{Deserialize, Serialize};

use crate::schedule::{TaskSnapshot, TaskState};

#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            task_id: None,
        }
    }

    pub fn with_task(message: impl Into<String>, task_id: String) -> Self {
        Self {
            message: message.into(),
            task_id: Some(task_id),
        }
    }
}

/// Body of `GET /progress`. `transcription` and `error` are empty
/// strings until the task finishes one way or the other.
#[derive(Debug, Deserialize, Serialize)]
pub struct ProgressResponse {
    pub task_id: String,
    pub state: TaskState,
    pub progress: String,
    pub transcription: String,
    pub error: String,
    pub finished: bool,
    pub chunk_index: usize,
    pub chunk_total: usize,
}

impl From<TaskSnapshot> for ProgressResponse {
    fn from(snapshot: TaskSnapshot) -> Self {
        Self {
            task_id: snapshot.task_id,
            state: snapshot.state,
            progress: snapshot.progress_message,
            transcription: snapshot.result.unwrap_or_default(),
            error: snapshot.error.unwrap_or_default(),
            finished: snapshot.finished,
            chunk_index: snapshot.chunk_index,
            chunk_total: snapshot.chunk_total,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_tasks: usize,
}
