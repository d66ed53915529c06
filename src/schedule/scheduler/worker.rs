use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::asr::Transcriber;
use crate::audio::{AudioSplitter, MediaFetcher};
use crate::schedule::error::TaskError;
use crate::schedule::registry::TaskHandle;
use crate::schedule::types::{StatusUpdate, TaskState};

/// Placeholder result when every chunk came back silent.
pub const NO_SPEECH: &str = "[no speech detected]";

/// The three external stages every task goes through.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn MediaFetcher>,
    pub splitter: Arc<dyn AudioSplitter>,
    pub transcriber: Arc<dyn Transcriber>,
}

/// Counts one live task until dropped.
pub struct LiveSlot {
    counter: Arc<AtomicUsize>,
}

impl LiveSlot {
    /// Claims a slot unless `capacity` are already taken.
    pub fn try_claim(counter: &Arc<AtomicUsize>, capacity: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < capacity).then_some(live + 1)
            })
            .ok()
            .map(|_| Self {
                counter: counter.clone(),
            })
    }
}

impl Drop for LiveSlot {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Drives one task from `Created` to a terminal state.
pub struct TranscriptionWorker {
    handle: Arc<TaskHandle>,
    collaborators: Collaborators,
    permits: Arc<Semaphore>,
    _slot: LiveSlot,
}

impl TranscriptionWorker {
    pub fn new(
        handle: Arc<TaskHandle>,
        collaborators: Collaborators,
        permits: Arc<Semaphore>,
        slot: LiveSlot,
    ) -> Self {
        Self {
            handle,
            collaborators,
            permits,
            _slot: slot,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let task_id = self.handle.task_id.clone();

        let update = match self.acquire_permit().await {
            Some(permit) => {
                let handle = self.handle.clone();
                let collaborators = self.collaborators.clone();
                // the pipeline runs as its own task so a panic inside a
                // collaborator surfaces here as a JoinError
                let outcome = tokio::spawn(async move {
                    let result = run_pipeline(&handle, &collaborators).await;
                    drop(permit);
                    result
                })
                .await;

                match outcome {
                    Ok(Ok((text, total))) => {
                        info!("Task {} completed ({} parts)", task_id, total);
                        StatusUpdate::completed(text, total)
                    }
                    Ok(Err(e)) => {
                        warn!("Task {} failed: {}", task_id, e);
                        StatusUpdate::failed(e.to_string())
                    }
                    Err(e) => {
                        error!("Worker for task {} crashed: {}", task_id, e);
                        StatusUpdate::failed(TaskError::Unexpected.to_string())
                    }
                }
            }
            None => {
                info!("Task {} cancelled before it started", task_id);
                StatusUpdate::failed(TaskError::Cancelled.to_string())
            }
        };

        self.handle.workspace().release();
        publish(&self.handle, update).await;
    }

    async fn acquire_permit(&self) -> Option<OwnedSemaphorePermit> {
        if self.handle.cancel_token().is_cancelled() {
            return None;
        }
        if let Ok(permit) = self.permits.clone().try_acquire_owned() {
            return Some(permit);
        }

        info!("Task {} queued for a free worker", self.handle.task_id);
        publish(
            &self.handle,
            StatusUpdate::message("Waiting for an available worker..."),
        )
        .await;

        tokio::select! {
            _ = self.handle.cancel_token().cancelled() => None,
            permit = self.permits.clone().acquire_owned() => permit.ok(),
        }
    }
}

async fn publish(handle: &TaskHandle, update: StatusUpdate) {
    if let Err(e) = handle.status().update(update).await {
        warn!("Dropped status update for task {}: {}", handle.task_id, e);
    }
}

fn check_cancelled(handle: &TaskHandle) -> Result<(), TaskError> {
    if handle.cancel_token().is_cancelled() {
        Err(TaskError::Cancelled)
    } else {
        Ok(())
    }
}

/// A collaborator error caused by cancellation is reported as such.
fn stage_error(handle: &TaskHandle, error: TaskError) -> TaskError {
    if handle.cancel_token().is_cancelled() {
        TaskError::Cancelled
    } else {
        error
    }
}

pub fn join_transcript(texts: &[String]) -> String {
    let joined = texts
        .iter()
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if joined.is_empty() {
        NO_SPEECH.to_string()
    } else {
        joined
    }
}

/// fetch -> split -> transcribe every chunk in order. Returns the
/// joined text and the number of chunks.
async fn run_pipeline(
    handle: &TaskHandle,
    collaborators: &Collaborators,
) -> Result<(String, usize), TaskError> {
    let config = &handle.config;
    let workspace = handle.workspace().path();
    let cancel = handle.cancel_token();

    check_cancelled(handle)?;
    info!("Task {}: downloading {}", handle.task_id, config.video_url);
    publish(handle, StatusUpdate::stage(TaskState::Downloading, "Downloading audio...")).await;
    let audio = collaborators
        .fetcher
        .fetch(&config.video_url, workspace, cancel)
        .await
        .map_err(|e| stage_error(handle, TaskError::Fetch(format!("{:#}", e))))
        .map(Arc::new)?;
    publish(handle, StatusUpdate::message("Audio downloaded")).await;

    check_cancelled(handle)?;
    info!("Task {}: splitting {} ms of audio", handle.task_id, audio.duration_ms());
    publish(handle, StatusUpdate::stage(TaskState::Splitting, "Splitting audio into parts...")).await;
    let chunks = collaborators
        .splitter
        .split(audio.clone(), config.chunk_duration_ms, workspace, cancel)
        .await
        .map_err(|e| stage_error(handle, TaskError::Split(format!("{:#}", e))))?;
    drop(audio);

    if chunks.is_empty() {
        return Err(TaskError::Split("audio stream is empty".to_string()));
    }

    let total = chunks.len();
    publish(handle, StatusUpdate::chunk_progress(0, total)).await;

    let mut texts = Vec::with_capacity(total);
    for (i, chunk) in chunks.iter().enumerate() {
        let index = i + 1;
        check_cancelled(handle)?;
        info!("Task {}: transcribing part {} of {}", handle.task_id, index, total);

        let text = collaborators
            .transcriber
            .transcribe(chunk, config.model_size, cancel)
            .await
            .map_err(|e| {
                stage_error(
                    handle,
                    TaskError::Transcribe {
                        index,
                        total,
                        reason: format!("{:#}", e),
                    },
                )
            })?;
        texts.push(text);

        if index < total {
            publish(handle, StatusUpdate::chunk_progress(index, total)).await;
        }
    }

    Ok((join_transcript(&texts), total))
}
