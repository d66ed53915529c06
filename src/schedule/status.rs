use chrono::Utc;
use tokio::sync::RwLock;

use super::error::{Result, TaskError};
use super::types::{StatusUpdate, TaskSnapshot, TaskState};

/// Progress record of one task. Written only by the task's worker,
/// read by any number of pollers through `snapshot`.
#[derive(Debug)]
pub struct TaskStatus {
    inner: RwLock<TaskSnapshot>,
}

impl TaskStatus {
    pub fn new(task_id: &str) -> Self {
        Self {
            inner: RwLock::new(TaskSnapshot::new(task_id)),
        }
    }

    /// Merge the present fields of `update` under the record lock.
    /// A rejected update leaves the record untouched.
    pub async fn update(&self, update: StatusUpdate) -> Result<TaskSnapshot> {
        let mut current = self.inner.write().await;
        let next_state = update.state.unwrap_or(current.state);

        if current.finished || (update.state.is_some() && !current.state.can_transition_to(next_state)) {
            return Err(TaskError::InvalidTransition {
                from: current.state,
                to: next_state,
            });
        }

        match next_state {
            TaskState::Completed if update.result.as_deref().map_or(true, str::is_empty) => {
                return Err(TaskError::Validation("completed task requires a result".to_string()));
            }
            TaskState::Failed if update.error.as_deref().map_or(true, str::is_empty) => {
                return Err(TaskError::Validation("failed task requires an error".to_string()));
            }
            _ => {}
        }
        if update.result.is_some() && next_state != TaskState::Completed {
            return Err(TaskError::Validation("result is only set on completion".to_string()));
        }
        if update.error.is_some() && next_state != TaskState::Failed {
            return Err(TaskError::Validation("error is only set on failure".to_string()));
        }

        let chunk_total = update.chunk_total.unwrap_or(current.chunk_total);
        let chunk_index = update.chunk_index.unwrap_or(current.chunk_index);
        if chunk_index > chunk_total {
            return Err(TaskError::Validation(format!(
                "chunk index {} exceeds chunk total {}",
                chunk_index, chunk_total
            )));
        }

        current.state = next_state;
        current.chunk_total = chunk_total;
        current.chunk_index = chunk_index;
        if let Some(message) = update.progress_message {
            current.progress_message = message;
        }
        if update.result.is_some() {
            current.result = update.result;
        }
        if update.error.is_some() {
            current.error = update.error;
        }
        current.finished = next_state.is_terminal();
        current.updated_at = Utc::now();

        Ok(current.clone())
    }

    pub async fn snapshot(&self) -> TaskSnapshot {
        self.inner.read().await.clone()
    }
}
