use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Result;
use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{read_wav_file, until_cancelled, AudioResource, MediaFetcher, TARGET_SAMPLE_RATE};

/// Fetches video or audio URLs and decodes them to 16 kHz mono.
///
/// Video pages go through `yt-dlp` when it is enabled and installed;
/// anything else is downloaded directly. `ffmpeg` then normalizes the
/// file to 16-bit PCM WAV.
#[derive(Debug, Clone)]
pub struct VideoFetcher {
    client: reqwest::Client,
    use_yt_dlp: bool,
    max_download_bytes: u64,
}

impl VideoFetcher {
    pub fn new(use_yt_dlp: bool, max_download_bytes: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            use_yt_dlp,
            max_download_bytes,
        }
    }

    async fn yt_dlp_available(&self) -> bool {
        if !self.use_yt_dlp {
            return false;
        }
        Command::new("yt-dlp")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn download_with_yt_dlp(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        let template = dest_dir.join("source.%(ext)s");
        let output = Command::new("yt-dlp")
            .args(["--format", "bestaudio/best", "--no-playlist", "--no-exec"])
            .arg("--max-filesize")
            .arg(self.max_download_bytes.to_string())
            .arg("--output")
            .arg(&template)
            .args(["--print", "after_move:filepath"])
            .arg(url)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to execute yt-dlp: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.chars().take(500).collect();
            return Err(anyhow::anyhow!("yt-dlp failed: {}", stderr.trim()));
        }

        let printed = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let path = PathBuf::from(printed);
        if !path.is_file() || !path.starts_with(dest_dir) {
            return Err(anyhow::anyhow!("yt-dlp produced no audio file"));
        }
        Ok(path)
    }

    async fn download_direct(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        let dest_path = dest_dir.join("source.media");
        debug!("Destination path: {:?}", dest_path);

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("HTTP request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "HTTP request failed with status: {}",
                response.status()
            ));
        }
        if response.content_length().is_some_and(|len| len > self.max_download_bytes) {
            return Err(anyhow::anyhow!(
                "media exceeds the {} byte download limit",
                self.max_download_bytes
            ));
        }

        let mut file = fs::File::create(&dest_path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create file: {}", e))?;
        let mut written: u64 = 0;
        while let Some(bytes) = response
            .chunk()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read response: {}", e))?
        {
            written += bytes.len() as u64;
            if written > self.max_download_bytes {
                return Err(anyhow::anyhow!(
                    "media exceeds the {} byte download limit",
                    self.max_download_bytes
                ));
            }
            file.write_all(&bytes).await?;
        }
        file.flush().await?;

        info!("Downloaded {} bytes from {}", written, url);
        Ok(dest_path)
    }
}

/// Only http(s) sources are accepted.
pub fn validate_url(url: &str) -> Result<()> {
    let trimmed = url.trim();
    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "invalid URL (must start with http:// or https://): {}",
            trimmed
        ))
    }
}

/// 使用FFmpeg转换为16kHz单声道16位WAV
async fn transcode_to_wav(input: &Path, output: &Path) -> Result<()> {
    info!("Converting {} to WAV format...", input.display());

    let result = Command::new("ffmpeg")
        .arg("-nostdin")
        .arg("-y")
        .arg("-i")
        .arg(input)
        .args(["-vn", "-ac", "1", "-acodec", "pcm_s16le", "-ar"])
        .arg(TARGET_SAMPLE_RATE.to_string())
        .arg(output)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to execute ffmpeg: {}", e))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        let tail: String = stderr.lines().rev().take(3).collect::<Vec<_>>().join(" | ");
        return Err(anyhow::anyhow!(
            "FFmpeg conversion failed with status {}: {}",
            result.status,
            tail
        ));
    }
    Ok(())
}

#[async_trait]
impl MediaFetcher for VideoFetcher {
    async fn fetch(
        &self,
        source: &str,
        workspace: &Path,
        cancel: &CancellationToken,
    ) -> Result<AudioResource> {
        validate_url(source)?;
        info!("Starting download from URL: {}", source);

        let source_path = if self.yt_dlp_available().await {
            until_cancelled(cancel, self.download_with_yt_dlp(source, workspace)).await?
        } else {
            if self.use_yt_dlp {
                warn!("yt-dlp unavailable, downloading {} directly", source);
            }
            until_cancelled(cancel, self.download_direct(source, workspace)).await?
        };

        let wav_path = workspace.join("audio.wav");
        until_cancelled(cancel, transcode_to_wav(&source_path, &wav_path)).await?;

        // 转换完成后原始文件不再需要
        if let Err(e) = fs::remove_file(&source_path).await {
            warn!("Failed to remove downloaded source {}: {}", source_path.display(), e);
        }

        let audio = tokio::task::spawn_blocking(move || read_wav_file(&wav_path)).await??;
        info!(
            "Decoded {} ms of audio at {} Hz",
            audio.duration_ms(),
            audio.sample_rate
        );
        Ok(audio)
    }
}
