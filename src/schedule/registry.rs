use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::error::{Result, TaskError};
use super::status::TaskStatus;
use super::types::{TaskConfig, TaskSnapshot};
use super::workspace::Workspace;

/// Everything the engine keeps for one live task.
#[derive(Debug)]
pub struct TaskHandle {
    pub task_id: String,
    pub config: TaskConfig,
    status: TaskStatus,
    cancel: CancellationToken,
    workspace: Workspace,
}

impl TaskHandle {
    pub fn status(&self) -> &TaskStatus {
        &self.status
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub async fn snapshot(&self) -> TaskSnapshot {
        self.status.snapshot().await
    }
}

/// Task id -> handle. The map lock only guards membership; each
/// status record carries its own lock.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, Arc<TaskHandle>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(
        &self,
        task_id: &str,
        config: TaskConfig,
        workspace: Workspace,
    ) -> Result<Arc<TaskHandle>> {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(task_id) {
            warn!("Refusing to register duplicate task {}", task_id);
            return Err(TaskError::DuplicateTask(task_id.to_string()));
        }

        let handle = Arc::new(TaskHandle {
            task_id: task_id.to_string(),
            config,
            status: TaskStatus::new(task_id),
            cancel: CancellationToken::new(),
            workspace,
        });
        tasks.insert(task_id.to_string(), handle.clone());
        info!("Registered task {}", task_id);
        Ok(handle)
    }

    pub async fn get(&self, task_id: &str) -> Option<Arc<TaskHandle>> {
        self.tasks.lock().await.get(task_id).cloned()
    }

    /// Removing an absent id is a no-op.
    pub async fn remove(&self, task_id: &str) -> Option<Arc<TaskHandle>> {
        let removed = self.tasks.lock().await.remove(task_id);
        if removed.is_some() {
            info!("Removed task {}", task_id);
        }
        removed
    }

    pub async fn handles(&self) -> Vec<Arc<TaskHandle>> {
        self.tasks.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Ids of finished tasks last updated before `cutoff`.
    pub async fn finished_before(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut expired = Vec::new();
        for handle in self.handles().await {
            let snapshot = handle.snapshot().await;
            if snapshot.finished && snapshot.updated_at < cutoff {
                expired.push(snapshot.task_id);
            }
        }
        expired
    }
}
