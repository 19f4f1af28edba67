//! Earshot - 录音生命周期编排器
//!
//! 入口：初始化日志、加载配置、装配存储/采集/压缩/远端，运行生产者与消费者直到关闭。
//! 用法：earshot [config.toml]
//!
//! 退出码：0 正常关闭；1 配置或存储错误；2 花费超限；3 上传重试耗尽。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use earshot::capture::CommandCapture;
use earshot::compress::ZipCompressor;
use earshot::config::{load_config, AppConfig, RemoteKind};
use earshot::core::{cleanup_queue, CleanupPipeline, LifecycleError, Orchestrator, ShutdownManager};
use earshot::observability;
use earshot::remote::{DirectoryRemote, HttpRemote, RemoteTransfer, S3Remote};
use earshot::store::{SqliteStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    cfg.validate().context("Invalid config")?;

    // run 返回时存储句柄已随所有组件释放
    match run(&cfg).await {
        Ok(()) => {
            tracing::info!("earshot stopped");
            Ok(())
        }
        Err(e) if e.is_fatal() => {
            tracing::error!(error = %e, code = e.exit_code(), "fatal stop");
            std::process::exit(e.exit_code());
        }
        Err(e) => Err(e).context("Orchestrator failed"),
    }
}

async fn build_remote(cfg: &AppConfig) -> Result<Arc<dyn RemoteTransfer>, LifecycleError> {
    match cfg.remote.kind {
        RemoteKind::S3 => Ok(Arc::new(
            S3Remote::new(
                &cfg.remote.region,
                cfg.remote.endpoint.as_deref(),
                cfg.remote.timeout_secs,
            )
            .await,
        )),
        RemoteKind::Http => {
            let endpoint = cfg.remote.endpoint.as_deref().ok_or_else(|| {
                LifecycleError::Config("remote.endpoint is required for http remote".into())
            })?;
            Ok(Arc::new(HttpRemote::new(endpoint, cfg.remote.timeout_secs)?))
        }
        RemoteKind::Directory => {
            let root = cfg.remote.directory.as_ref().ok_or_else(|| {
                LifecycleError::Config("remote.directory is required for directory remote".into())
            })?;
            Ok(Arc::new(DirectoryRemote::new(root)))
        }
    }
}

async fn run(cfg: &AppConfig) -> Result<(), LifecycleError> {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&cfg.app.db_path)?);
    let remote = build_remote(cfg).await?;
    tracing::info!(
        db = %cfg.app.db_path.display(),
        records = %cfg.app.record_dir.display(),
        archives = %cfg.app.archive_dir.display(),
        remote = remote.name(),
        bucket = %cfg.remote.bucket,
        "earshot starting"
    );

    let shutdown = ShutdownManager::new();
    shutdown.install_signal_handlers();

    let pipeline = Arc::new(
        CleanupPipeline::new(
            Arc::clone(&store),
            Arc::new(ZipCompressor::new()),
            remote,
            cfg.app.archive_dir.clone(),
            cfg.remote_config(),
        )
        .with_retry_policy(cfg.retry_policy())
        .with_shutdown(shutdown.token()),
    );

    let capture = Arc::new(CommandCapture::new(
        cfg.capture.program.clone(),
        cfg.capture.args.clone(),
        cfg.app.record_dir.clone(),
    ));
    let (queue, rx) = cleanup_queue();
    let orchestrator = Orchestrator::new(store, capture, queue, cfg.thresholds()?)
        .with_capture_duration(cfg.capture_duration())
        .with_idle_poll(cfg.idle_poll());

    orchestrator.run(pipeline, rx, &shutdown).await
}
