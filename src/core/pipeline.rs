//! 清理流水线：归档 → 上传（含重试）→ 清理
//!
//! 消费者每收到一个清理请求就同步跑完整个流水线，再去看队列。`pass_lock` 保证
//! 常规清理与退出前的最终清理不会重叠；最终清理只做归档与本地清理，不上传，且只执行一次。

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::error::LifecycleError;
use super::task_queue::CleanupReceiver;
use crate::compress::Compressor;
use crate::lifecycle::{ArchiveBuilder, CleanupSweeper, RetryPolicy, SweepKind, UploadManager};
use crate::remote::{RemoteConfig, RemoteTransfer};
use crate::store::{Container, ContainerId, Store, UnitFilter};

/// 一次清理的结果摘要
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// 本次新建的容器
    pub container: Option<ContainerId>,
    pub archived_units: usize,
    pub uploaded: Vec<ContainerId>,
    pub swept_units: usize,
    pub swept_containers: usize,
    /// 因关闭信号放弃了剩余上传
    pub interrupted: bool,
}

pub struct CleanupPipeline {
    store: Arc<dyn Store>,
    compressor: Arc<dyn Compressor>,
    remote: Arc<dyn RemoteTransfer>,
    archive_dir: PathBuf,
    remote_cfg: RemoteConfig,
    retry: RetryPolicy,
    shutdown: CancellationToken,
    pass_lock: Mutex<()>,
    drained: AtomicBool,
}

impl CleanupPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        compressor: Arc<dyn Compressor>,
        remote: Arc<dyn RemoteTransfer>,
        archive_dir: impl Into<PathBuf>,
        remote_cfg: RemoteConfig,
    ) -> Self {
        Self {
            store,
            compressor,
            remote,
            archive_dir: archive_dir.into(),
            remote_cfg,
            retry: RetryPolicy::default(),
            shutdown: CancellationToken::new(),
            pass_lock: Mutex::new(()),
            drained: AtomicBool::new(false),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 关闭信号：退避等待中收到时放弃当前容器的剩余重试
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// 一次完整清理
    ///
    /// 任一容器重试耗尽即返回 `RetryExhausted`（致命），后续容器不再尝试。
    pub async fn run_pass(&self) -> Result<PassReport, LifecycleError> {
        let _guard = self.pass_lock.lock().await;
        let mut report = PassReport::default();

        self.archive_pending(&mut report).await?;

        let manager = UploadManager::new(self.store.as_ref(), self.remote.as_ref());
        for container in manager.awaiting()? {
            if self.shutdown.is_cancelled() {
                report.interrupted = true;
                break;
            }
            let id = container.id;
            if self.upload_with_retry(&manager, container).await? {
                report.uploaded.push(id);
            } else {
                report.interrupted = true;
                break;
            }
        }

        self.sweep(&mut report).await?;
        tracing::info!(
            container = ?report.container,
            archived = report.archived_units,
            uploaded = report.uploaded.len(),
            swept_units = report.swept_units,
            swept_containers = report.swept_containers,
            interrupted = report.interrupted,
            "cleanup pass finished"
        );
        Ok(report)
    }

    /// 退出前的最终清理：归档剩余录音并删除已持久化的本地副本
    ///
    /// 等待进行中的清理结束后再执行；第二次调用返回 `None`。
    pub async fn final_drain(&self) -> Result<Option<PassReport>, LifecycleError> {
        let _guard = self.pass_lock.lock().await;
        if self.drained.swap(true, Ordering::SeqCst) {
            tracing::debug!("final drain already done");
            return Ok(None);
        }

        let mut report = PassReport::default();
        self.archive_pending(&mut report).await?;
        self.sweep(&mut report).await?;
        tracing::info!(
            archived = report.archived_units,
            swept_units = report.swept_units,
            swept_containers = report.swept_containers,
            "final drain finished"
        );
        Ok(Some(report))
    }

    /// 消费者循环：只在队列为空时阻塞，收到关闭信号或队列关闭后退出
    pub async fn run_consumer(
        &self,
        mut rx: CleanupReceiver,
        token: CancellationToken,
    ) -> Result<(), LifecycleError> {
        loop {
            let request = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                request = rx.recv() => request,
            };
            let Some(request) = request else {
                break;
            };
            tracing::info!(reason = ?request.reason, requested_at = %request.requested_at, "cleanup pass start");
            self.run_pass().await?;
        }
        tracing::debug!("cleanup consumer stopped");
        Ok(())
    }

    /// 压缩与文件删除都是阻塞 I/O，放到阻塞线程池执行
    async fn archive_pending(&self, report: &mut PassReport) -> Result<(), LifecycleError> {
        let store = Arc::clone(&self.store);
        let compressor = Arc::clone(&self.compressor);
        let archive_dir = self.archive_dir.clone();
        let built = tokio::task::spawn_blocking(move || -> Result<Container, LifecycleError> {
            let pending = store.list_units(UnitFilter::pending())?;
            ArchiveBuilder::new(store.as_ref(), compressor.as_ref()).build(&pending, &archive_dir)
        })
        .await?;

        match built {
            Ok(container) => {
                report.container = Some(container.id);
                report.archived_units = container.unit_ids.len();
            }
            Err(LifecycleError::NoWork) => tracing::debug!("no pending units, archive skipped"),
            Err(e @ (LifecycleError::Directory(_) | LifecycleError::Io(_))) => {
                tracing::warn!(error = %e, "archive skipped");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn sweep(&self, report: &mut PassReport) -> Result<(), LifecycleError> {
        let store = Arc::clone(&self.store);
        let (containers, units) = tokio::task::spawn_blocking(move || {
            let sweeper = CleanupSweeper::new(store.as_ref());
            let containers = sweeper.sweep(SweepKind::Containers)?;
            let units = sweeper.sweep(SweepKind::Units)?;
            Ok::<_, LifecycleError>((containers, units))
        })
        .await??;
        report.swept_containers = containers.len();
        report.swept_units = units.len();
        Ok(())
    }

    /// 单个容器的重试循环；返回 false 表示因关闭信号放弃
    async fn upload_with_retry(
        &self,
        manager: &UploadManager<'_>,
        container: Container,
    ) -> Result<bool, LifecycleError> {
        let max_attempts = self.retry.max_attempts;
        for attempt in 1..=max_attempts {
            let outcomes = manager
                .upload_pending(std::slice::from_ref(&container), &self.remote_cfg)
                .await?;
            if outcomes.iter().all(|o| o.is_success()) {
                return Ok(true);
            }
            if attempt == max_attempts {
                break;
            }

            let delay = self.retry.jittered_delay();
            tracing::warn!(
                container = %container.id,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "upload failed, backing off"
            );
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    tracing::info!(container = %container.id, attempt, "shutdown during backoff, retries abandoned");
                    return Ok(false);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::error!(container = %container.id, attempts = max_attempts, "upload retries exhausted");
        Err(LifecycleError::RetryExhausted {
            container: container.id,
            attempts: max_attempts,
        })
    }
}
