use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

const DEFAULT_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_MODEL_DIR: &str = "./models";
const DEFAULT_WORKSPACE_DIR: &str = "./asr_data/workspace";
const DEFAULT_LOG_DIR: &str = "./logs";
pub const DEFAULT_CHUNK_MS: u64 = 30_000;
const DEFAULT_MAX_WORKERS: usize = 2;
const DEFAULT_MAX_QUEUED: usize = 16;
const DEFAULT_TASK_TTL_SECS: u64 = 3600;
const DEFAULT_REAP_INTERVAL_SECS: u64 = 60;
const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 200 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub addr: SocketAddr,
    pub model_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub log_dir: PathBuf,
    pub chunk_duration_ms: u64,
    pub max_workers: usize,
    pub max_queued: usize,
    pub task_ttl: Duration,
    pub reap_interval: Duration,
    pub max_download_bytes: u64,
    pub use_yt_dlp: bool,
    /// Values that failed to parse, reported once logging is up.
    pub rejected: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            workspace_dir: PathBuf::from(DEFAULT_WORKSPACE_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            chunk_duration_ms: DEFAULT_CHUNK_MS,
            max_workers: DEFAULT_MAX_WORKERS,
            max_queued: DEFAULT_MAX_QUEUED,
            task_ttl: Duration::from_secs(DEFAULT_TASK_TTL_SECS),
            reap_interval: Duration::from_secs(DEFAULT_REAP_INTERVAL_SECS),
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
            use_yt_dlp: true,
            rejected: Vec::new(),
        }
    }
}

/// Process environment first, then `.env`.
fn var(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) => Some(value),
        Err(_) => dotenv::var(key).ok(),
    }
}

fn parse_or<T: FromStr>(key: &str, default: T, rejected: &mut Vec<String>) -> T {
    match var(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                rejected.push(format!("Ignoring invalid value {:?} for {}", raw, key));
                default
            }
        },
        None => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let mut rejected = Vec::new();

        let mut addr: SocketAddr = parse_or(
            "VIDEO_ASR_ADDR",
            DEFAULT_ADDR.parse().unwrap_or_else(|_| Self::default().addr),
            &mut rejected,
        );
        if var("VIDEO_ASR_ADDR").is_none() {
            addr.set_port(parse_or("PORT", addr.port(), &mut rejected));
        }

        let chunk_duration_ms = parse_or("VIDEO_ASR_CHUNK_MS", DEFAULT_CHUNK_MS, &mut rejected).max(1);
        let max_workers = parse_or("VIDEO_ASR_MAX_WORKERS", DEFAULT_MAX_WORKERS, &mut rejected).max(1);
        let max_queued = parse_or("VIDEO_ASR_MAX_QUEUED", DEFAULT_MAX_QUEUED, &mut rejected);
        let task_ttl = parse_or("VIDEO_ASR_TASK_TTL_SECS", DEFAULT_TASK_TTL_SECS, &mut rejected);
        let reap_interval =
            parse_or("VIDEO_ASR_REAP_INTERVAL_SECS", DEFAULT_REAP_INTERVAL_SECS, &mut rejected).max(1);
        let max_download_bytes =
            parse_or("VIDEO_ASR_MAX_DOWNLOAD_BYTES", DEFAULT_MAX_DOWNLOAD_BYTES, &mut rejected);
        let use_yt_dlp = parse_or("VIDEO_ASR_USE_YT_DLP", true, &mut rejected);

        Self {
            addr,
            model_dir: var("VIDEO_ASR_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR)),
            workspace_dir: var("VIDEO_ASR_WORKSPACE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE_DIR)),
            log_dir: var("VIDEO_ASR_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
            chunk_duration_ms,
            max_workers,
            max_queued,
            task_ttl: Duration::from_secs(task_ttl),
            reap_interval: Duration::from_secs(reap_interval),
            max_download_bytes,
            use_yt_dlp,
            rejected,
        }
    }

    /// Logs every value `from_env` had to ignore. Call after the
    /// subscriber is installed.
    pub fn report_rejected(&self) {
        for message in &self.rejected {
            warn!("{}", message);
        }
    }
}
