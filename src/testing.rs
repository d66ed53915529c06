//! In-memory collaborators shared by the engine and HTTP tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::asr::Transcriber;
use crate::audio::{AudioChunk, AudioResource, MediaFetcher, WavSplitter};
use crate::schedule::{Collaborators, EngineConfig, ModelSize, TaskManager, TaskSnapshot};

/// Serves `seconds` of 1 kHz audio, or fails when `None`.
pub struct FakeFetcher {
    pub seconds: Option<usize>,
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, source: &str, workspace: &Path, _cancel: &CancellationToken) -> Result<AudioResource> {
        assert!(workspace.is_dir());
        match self.seconds {
            Some(seconds) => Ok(AudioResource::new(vec![0.1; seconds * 1000], 1000)),
            None => Err(anyhow::anyhow!("no audio stream found for {}", source)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fault {
    None,
    FailAt(usize),
    PanicAt(usize),
}

/// Each chunk needs one permit from `gate` before it is transcribed.
pub struct GatedTranscriber {
    pub gate: Arc<Semaphore>,
    pub fault: Fault,
}

#[async_trait]
impl Transcriber for GatedTranscriber {
    async fn transcribe(&self, chunk: &AudioChunk, _model: ModelSize, cancel: &CancellationToken) -> Result<String> {
        assert!(chunk.path.exists(), "chunk file must live in the workspace");
        tokio::select! {
            _ = cancel.cancelled() => return Err(anyhow::anyhow!("cancelled")),
            permit = self.gate.acquire() => permit?.forget(),
        }
        match self.fault {
            Fault::FailAt(index) if index == chunk.index => Err(anyhow::anyhow!("decoder error")),
            Fault::PanicAt(index) if index == chunk.index => panic!("model exploded"),
            _ => Ok(format!(" part{} ", chunk.index)),
        }
    }
}

pub struct TestEngine {
    pub manager: Arc<TaskManager>,
    pub gate: Arc<Semaphore>,
    _root: TempDir,
}

/// Real splitter, fake fetch and transcription, 30 s chunks.
pub fn engine(seconds: Option<usize>, fault: Fault, max_workers: usize, max_queued: usize) -> TestEngine {
    let root = tempfile::tempdir().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let collaborators = Collaborators {
        fetcher: Arc::new(FakeFetcher { seconds }),
        splitter: Arc::new(WavSplitter::new()),
        transcriber: Arc::new(GatedTranscriber {
            gate: gate.clone(),
            fault,
        }),
    };
    let config = EngineConfig {
        workspace_root: root.path().to_path_buf(),
        chunk_duration_ms: 30_000,
        max_workers,
        max_queued,
    };
    TestEngine {
        manager: Arc::new(TaskManager::new(collaborators, config)),
        gate,
        _root: root,
    }
}

/// Polls the registry directly, so a completed task is not consumed.
pub async fn wait_for<F>(manager: &TaskManager, task_id: &str, pred: F) -> TaskSnapshot
where
    F: Fn(&TaskSnapshot) -> bool,
{
    for _ in 0..500 {
        if let Some(handle) = manager.registry().get(task_id).await {
            let snapshot = handle.snapshot().await;
            if pred(&snapshot) {
                return snapshot;
            }
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("task {} never reached the expected state", task_id);
}

pub async fn wait_idle(manager: &TaskManager) {
    for _ in 0..500 {
        if manager.active_tasks() == 0 {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("workers never finished");
}
