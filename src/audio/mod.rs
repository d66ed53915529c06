use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod fetch;
pub mod split;

pub use fetch::VideoFetcher;
pub use split::WavSplitter;

/// 语音识别统一使用的采样率
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Decoded mono audio, samples in [-1, 1].
#[derive(Debug, Clone)]
pub struct AudioResource {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioResource {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// One slice of the source audio, persisted in the task workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// 1-based position in the sequence
    pub index: usize,
    pub start_ms: u64,
    pub duration_ms: u64,
    pub path: PathBuf,
}

/// Retrieves a source and decodes it into audio.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(
        &self,
        source: &str,
        workspace: &Path,
        cancel: &CancellationToken,
    ) -> Result<AudioResource>;
}

/// Cuts audio into ordered chunks of at most `chunk_duration_ms`.
#[async_trait]
pub trait AudioSplitter: Send + Sync {
    async fn split(
        &self,
        audio: Arc<AudioResource>,
        chunk_duration_ms: u64,
        workspace: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<AudioChunk>>;
}

/// Run `fut` unless `cancel` fires first.
pub async fn until_cancelled<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(anyhow::anyhow!("operation cancelled")),
        result = fut => result,
    }
}

/// 读取WAV文件
///
/// 返回单声道样本（归一化到[-1, 1]）和采样率。仅支持16位整数格式。
pub fn read_wav_file(path: &Path) -> Result<AudioResource> {
    let mut reader = WavReader::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to read WAV file {}: {}", path.display(), e))?;
    let spec = reader.spec();

    if spec.sample_format != SampleFormat::Int {
        return Err(anyhow::anyhow!("Unsupported sample format: expected integer format"));
    }
    if spec.bits_per_sample != 16 {
        return Err(anyhow::anyhow!("Unsupported bits per sample: expected 16 bits"));
    }

    let samples: Vec<f32> = reader
        .samples::<i16>()
        .map(|s| s.map(|val| val as f32 / 32768.0))
        .collect::<std::result::Result<Vec<f32>, _>>()
        .map_err(|e| anyhow::anyhow!("Failed to read samples: {}", e))?;

    let channels = spec.channels.max(1) as usize;
    let samples = if channels > 1 {
        convert_to_mono(&samples, channels)
    } else {
        samples
    };

    Ok(AudioResource::new(samples, spec.sample_rate))
}

/// 写出16位单声道WAV文件
pub fn write_wav_file(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;
    Ok(())
}

/// 将多声道音频转换为单声道
///
/// 通过对每个采样的所有通道取平均值，将多声道音频转换为单声道
fn convert_to_mono(samples: &[f32], num_channels: usize) -> Vec<f32> {
    info!("Downmixing {} channels to mono", num_channels);
    samples
        .par_chunks(num_channels)
        .map(|chunk| chunk.iter().sum::<f32>() / num_channels as f32)
        .collect()
}
