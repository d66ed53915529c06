use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{write_wav_file, AudioChunk, AudioResource, AudioSplitter};

/// Sample ranges `[start, end)` of consecutive chunks. The last chunk
/// holds whatever is left over.
pub fn chunk_ranges(total_samples: usize, sample_rate: u32, chunk_duration_ms: u64) -> Vec<(usize, usize)> {
    let chunk_samples = (sample_rate as u64 * chunk_duration_ms / 1000) as usize;
    if chunk_samples == 0 {
        return Vec::new();
    }

    (0..total_samples)
        .step_by(chunk_samples)
        .map(|start| (start, (start + chunk_samples).min(total_samples)))
        .collect()
}

/// Writes each chunk as `chunk_NNNN.wav` into the task workspace.
#[derive(Debug, Clone, Default)]
pub struct WavSplitter;

impl WavSplitter {
    pub fn new() -> Self {
        Self
    }

    fn split_blocking(
        audio: &AudioResource,
        chunk_duration_ms: u64,
        workspace: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<AudioChunk>> {
        if audio.samples.is_empty() {
            return Err(anyhow::anyhow!("audio stream is empty"));
        }
        if chunk_duration_ms == 0 {
            return Err(anyhow::anyhow!("chunk duration must be positive"));
        }

        let rate = audio.sample_rate as u64;
        let ranges = chunk_ranges(audio.samples.len(), audio.sample_rate, chunk_duration_ms);
        let mut chunks = Vec::with_capacity(ranges.len());

        for (i, (start, end)) in ranges.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(anyhow::anyhow!("split cancelled"));
            }

            let index = i + 1;
            let path = workspace.join(format!("chunk_{:04}.wav", index));
            write_wav_file(&path, &audio.samples[start..end], audio.sample_rate)?;
            debug!("Wrote chunk {} to {}", index, path.display());

            chunks.push(AudioChunk {
                index,
                start_ms: start as u64 * 1000 / rate,
                duration_ms: (end - start) as u64 * 1000 / rate,
                path,
            });
        }

        Ok(chunks)
    }
}

#[async_trait]
impl AudioSplitter for WavSplitter {
    async fn split(
        &self,
        audio: Arc<AudioResource>,
        chunk_duration_ms: u64,
        workspace: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<AudioChunk>> {
        info!(
            "Splitting {} ms of audio into {} ms chunks",
            audio.duration_ms(),
            chunk_duration_ms
        );

        let workspace = workspace.to_path_buf();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            Self::split_blocking(&audio, chunk_duration_ms, &workspace, &cancel)
        })
        .await?
    }
}
