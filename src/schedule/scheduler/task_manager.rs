use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::worker::{Collaborators, LiveSlot, TranscriptionWorker};
use crate::schedule::error::{Result, TaskError};
use crate::schedule::registry::TaskRegistry;
use crate::schedule::session::SessionBinding;
use crate::schedule::types::{ModelSize, TaskConfig, TaskSnapshot, TaskState};
use crate::schedule::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub workspace_root: PathBuf,
    pub chunk_duration_ms: u64,
    pub max_workers: usize,
    pub max_queued: usize,
}

/// Which task a request is about: an explicit id wins over the
/// session binding.
#[derive(Debug, Clone, Default)]
pub struct TaskLookup<'a> {
    pub session: Option<&'a str>,
    pub task_id: Option<&'a str>,
}

/// Owns every live task: registry, session bindings and the worker
/// pool. One instance per process, shared by all request handlers.
pub struct TaskManager {
    registry: TaskRegistry,
    sessions: SessionBinding,
    collaborators: Collaborators,
    config: EngineConfig,
    permits: Arc<Semaphore>,
    live: Arc<AtomicUsize>,
}

impl TaskManager {
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Self {
        let max_workers = config.max_workers.max(1);
        info!(
            "Task manager ready: {} workers, {} queued, {} ms chunks",
            max_workers, config.max_queued, config.chunk_duration_ms
        );
        Self {
            registry: TaskRegistry::new(),
            sessions: SessionBinding::new(),
            collaborators,
            permits: Arc::new(Semaphore::new(max_workers)),
            live: Arc::new(AtomicUsize::new(0)),
            config: EngineConfig { max_workers, ..config },
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionBinding {
        &self.sessions
    }

    /// Tasks accepted and not yet finished, queued ones included.
    pub fn active_tasks(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Validates the request, registers the task, binds it to `session`
    /// and launches its worker. Returns the new task id.
    pub async fn start(
        &self,
        session: &str,
        video_url: Option<&str>,
        model_size: Option<&str>,
    ) -> Result<String> {
        let video_url = video_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| TaskError::Validation("No video URL provided".to_string()))?;
        let model_size = match model_size {
            Some(size) => size.parse::<ModelSize>()?,
            None => ModelSize::default(),
        };

        let capacity = self.config.max_workers + self.config.max_queued;
        let slot = LiveSlot::try_claim(&self.live, capacity).ok_or_else(|| {
            warn!("Rejecting new task: {} tasks already live", capacity);
            TaskError::Busy
        })?;

        let task_id = format!("task-{}", Uuid::new_v4());
        let workspace = Workspace::acquire(&self.config.workspace_root, &task_id).map_err(|e| {
            error!("Failed to create workspace for task {}: {}", task_id, e);
            TaskError::Unexpected
        })?;

        let config = TaskConfig {
            video_url: video_url.to_string(),
            model_size,
            chunk_duration_ms: self.config.chunk_duration_ms,
        };
        let handle = self.registry.create(&task_id, config, workspace).await?;
        self.sessions.bind(session, &task_id).await;

        info!(
            "Creating new task: {} (model {}, source {})",
            task_id, model_size, video_url
        );
        TranscriptionWorker::new(handle, self.collaborators.clone(), self.permits.clone(), slot).spawn();

        Ok(task_id)
    }

    async fn resolve(&self, lookup: &TaskLookup<'_>) -> Result<String> {
        if let Some(task_id) = lookup.task_id {
            return Ok(task_id.to_string());
        }
        match lookup.session {
            Some(session) => self.sessions.current(session).await.ok_or(TaskError::NoActiveTask),
            None => Err(TaskError::NoActiveTask),
        }
    }

    /// Current snapshot of the task. A completed task is handed out
    /// exactly once: the call that observes completion removes it.
    pub async fn progress(&self, lookup: TaskLookup<'_>) -> Result<TaskSnapshot> {
        let task_id = self.resolve(&lookup).await?;
        let Some(handle) = self.registry.get(&task_id).await else {
            if let Some(session) = lookup.session {
                self.sessions.unbind_task(session, &task_id).await;
            }
            return Err(TaskError::NoActiveTask);
        };

        let snapshot = handle.snapshot().await;
        if snapshot.state == TaskState::Completed {
            // a concurrent poll may have taken it already
            let Some(removed) = self.registry.remove(&task_id).await else {
                return Err(TaskError::NoActiveTask);
            };
            removed.workspace().release();
            self.sessions.forget_task(&task_id).await;
            info!("Delivered result of task {}", task_id);
        }

        Ok(snapshot)
    }

    /// Forgets the task whatever its state: stops its worker, removes
    /// the record and the workspace, clears the binding. Returns whether
    /// anything was removed.
    pub async fn cleanup(&self, lookup: TaskLookup<'_>) -> bool {
        let task_id = self.resolve(&lookup).await.ok();
        if let Some(session) = lookup.session {
            match (lookup.task_id, task_id.as_deref()) {
                // an explicit id only drops the binding when it points at that task
                (Some(_), Some(task_id)) => {
                    self.sessions.unbind_task(session, task_id).await;
                }
                _ => {
                    self.sessions.unbind(session).await;
                }
            }
        }
        let Some(task_id) = task_id else {
            return false;
        };

        self.sessions.forget_task(&task_id).await;
        match self.registry.remove(&task_id).await {
            Some(handle) => {
                handle.cancel_token().cancel();
                handle.workspace().release();
                info!("Cleaned up task {}", task_id);
                true
            }
            None => false,
        }
    }

    /// Asks a running task to stop. The record stays and ends `Failed`.
    pub async fn cancel(&self, lookup: TaskLookup<'_>) -> Result<String> {
        let task_id = self.resolve(&lookup).await?;
        let handle = self.registry.get(&task_id).await.ok_or(TaskError::NoActiveTask)?;
        if !handle.cancel_token().is_cancelled() {
            info!("Cancellation requested for task {}", task_id);
            handle.cancel_token().cancel();
        }
        Ok(task_id)
    }

    /// Removes finished tasks nobody collected within `ttl`.
    pub async fn reap_expired(&self, ttl: Duration) -> usize {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1));
        let expired = self.registry.finished_before(Utc::now() - ttl).await;

        let mut reaped = 0;
        for task_id in expired {
            if let Some(handle) = self.registry.remove(&task_id).await {
                handle.workspace().release();
                self.sessions.forget_task(&task_id).await;
                info!("Reaped expired task {}", task_id);
                reaped += 1;
            }
        }
        reaped
    }

    /// Cancels every running task; used on shutdown.
    pub async fn shutdown(&self) {
        self.permits.close();
        for handle in self.registry.handles().await {
            handle.cancel_token().cancel();
        }
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        info!("TaskManager is being dropped, cleaning up resources...");
    }
}
