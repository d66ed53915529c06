use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::audio::AudioChunk;
use crate::schedule::types::ModelSize;

pub mod whisper;

pub use whisper::WhisperAsr;

#[derive(Debug, Clone)]
pub struct AsrParams {
    pub language: Option<String>,
    pub n_threads: i32,
    pub temperature: f32,
}

impl AsrParams {
    pub fn new() -> Self {
        Self {
            language: None,
            n_threads: 4,
            temperature: 0.0,
        }
    }
}

impl Default for AsrParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Speech recognition over a single chunk.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        chunk: &AudioChunk,
        model_size: ModelSize,
        cancel: &CancellationToken,
    ) -> Result<String>;
}
