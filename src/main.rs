#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use tracing::{error, info};
use std::sync::Arc;
use video_asr::{
    asr::{AsrParams, WhisperAsr},
    audio::{VideoFetcher, WavSplitter},
    config::AppConfig,
    schedule::{Collaborators, EngineConfig, ModelSize, TaskManager, TaskScheduler},
    utils::logger,
    AppContext,
};
use std::fs;

#[tokio::main]
async fn main() -> Result<()> {
    // 读取配置 (环境变量优先, 其次 .env)
    let config = AppConfig::from_env();

    // 初始化日志系统
    let _guard = logger::init(&config.log_dir)?;
    // 日志就绪后再报告无效的配置项
    config.report_rejected();
    // 创建必要的目录
    fs::create_dir_all(&config.workspace_dir)?;

    info!("Starting video ASR service...");

    // 检查模型文件, 缺失的模型在第一次使用时才会报错
    let asr = WhisperAsr::new(&config.model_dir, AsrParams::default());
    for size in ModelSize::ALL {
        if !asr.model_path(size).exists() {
            info!("Whisper model {} not found at {}", size, asr.model_path(size).display());
        }
    }

    // 初始化外部组件: 下载, 切分, 识别
    info!("Initializing collaborators...");
    let collaborators = Collaborators {
        fetcher: Arc::new(VideoFetcher::new(config.use_yt_dlp, config.max_download_bytes)),
        splitter: Arc::new(WavSplitter::new()),
        transcriber: Arc::new(asr),
    };

    // 初始化任务管理器
    info!("Initializing Task Manager...");
    let task_manager = Arc::new(TaskManager::new(
        collaborators,
        EngineConfig {
            workspace_root: config.workspace_dir.clone(),
            chunk_duration_ms: config.chunk_duration_ms,
            max_workers: config.max_workers,
            max_queued: config.max_queued,
        },
    ));

    // 创建应用上下文
    let ctx = Arc::new(AppContext {
        task_manager: task_manager.clone(),
    });

    // 启动过期任务清理
    info!("Initializing Scheduler...");
    let scheduler = TaskScheduler::new(task_manager.clone(), config.task_ttl)
        .with_interval(config.reap_interval)
        .spawn();

    info!("Starting HTTP server at http://{}", config.addr);

    // 启动 HTTP 服务器, Ctrl-C 时优雅关闭
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    };
    let served = video_asr::web::start_server(ctx, config.addr, shutdown).await;

    // 优雅关闭
    info!("Shutting down...");
    scheduler.abort();
    task_manager.shutdown().await;

    match served {
        Ok(_) => {
            info!("Server stopped gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Server error: {}", e);
            Err(e)
        }
    }
}
