use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::asr::{AsrParams, Transcriber};
use crate::audio::{read_wav_file, AudioChunk};
use crate::schedule::types::ModelSize;

/// whisper.cpp backed transcriber. One context per model size, loaded
/// on first use and shared by every task afterwards.
pub struct WhisperAsr {
    model_dir: PathBuf,
    params: AsrParams,
    contexts: Mutex<HashMap<ModelSize, Arc<WhisperContext>>>,
}

impl WhisperAsr {
    pub fn new(model_dir: impl Into<PathBuf>, params: AsrParams) -> Self {
        Self {
            model_dir: model_dir.into(),
            params,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    pub fn model_path(&self, model_size: ModelSize) -> PathBuf {
        self.model_dir.join(model_size.model_file())
    }

    async fn context(&self, model_size: ModelSize) -> Result<Arc<WhisperContext>> {
        // held across the load so concurrent tasks don't load the same model twice
        let mut contexts = self.contexts.lock().await;
        if let Some(ctx) = contexts.get(&model_size) {
            return Ok(ctx.clone());
        }

        let path = self.model_path(model_size);
        if !path.exists() {
            return Err(anyhow::anyhow!("whisper model not found: {}", path.display()));
        }

        info!("Loading whisper model {} from {}", model_size, path.display());
        let ctx = tokio::task::spawn_blocking(move || {
            let path = path.to_string_lossy().to_string();
            WhisperContext::new_with_params(&path, WhisperContextParameters::default())
                .map_err(|e| anyhow::anyhow!("failed to open whisper model: {}", e))
        })
        .await??;

        let ctx = Arc::new(ctx);
        contexts.insert(model_size, ctx.clone());
        Ok(ctx)
    }

    fn build_params(ap: &AsrParams) -> FullParams<'_, '_> {
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        // 未指定语言时自动检测
        params.set_language(Some(ap.language.as_deref().unwrap_or("auto")));

        // 设置采样温度。较低的值会使输出更加确定
        params.set_temperature(ap.temperature);

        params.set_n_threads(ap.n_threads);

        // 禁用翻译功能
        params.set_translate(false);

        // 服务端运行, 关闭所有控制台输出
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        // 每个分片独立识别, 不跨分片保留上下文
        params.set_no_context(true);

        params.set_suppress_blank(true);
        params.set_suppress_non_speech_tokens(true);

        params
    }
}

#[async_trait::async_trait]
impl Transcriber for WhisperAsr {
    async fn transcribe(
        &self,
        chunk: &AudioChunk,
        model_size: ModelSize,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(anyhow::anyhow!("transcription cancelled"));
        }

        let ctx = self.context(model_size).await?;
        let path = chunk.path.clone();
        let params = self.params.clone();

        let text = tokio::task::spawn_blocking(move || -> Result<String> {
            let audio = read_wav_file(&path)?;
            let mut state = ctx.create_state()?;
            state.full(Self::build_params(&params), &audio.samples)?;

            let num_segments = state.full_n_segments()?;
            let mut full_text = String::new();
            for i in 0..num_segments {
                full_text.push_str(&state.full_get_segment_text(i)?);
            }
            Ok(full_text)
        })
        .await??;

        if cancel.is_cancelled() {
            return Err(anyhow::anyhow!("transcription cancelled"));
        }
        Ok(text.trim().to_string())
    }
}
