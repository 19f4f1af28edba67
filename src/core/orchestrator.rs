//! 编排器：生产者主循环
//!
//! 每轮先做预算判定，再按优先级三选一：
//! 1. 花费超限：记录上限并致命停止
//! 2. 存储或条数超限：非阻塞投递清理请求（已有待执行的请求则跳过）
//! 3. 否则同步录一段
//!
//! `run` 同时拉起消费者任务，收到外部关闭信号后执行一次最终清理。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::error::LifecycleError;
use super::pipeline::CleanupPipeline;
use super::shutdown::{ShutdownManager, ShutdownReason};
use super::task_queue::{CleanupQueue, CleanupReason, CleanupReceiver, CleanupToken, Enqueue};
use crate::capture::Capture;
use crate::lifecycle::{evaluate, Thresholds, UsageMetrics};
use crate::store::{Store, UnitId};

/// 单轮结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Captured(UnitId),
    /// 录音设备不可用，本轮跳过
    CaptureSkipped,
    CleanupEnqueued,
    CleanupAlreadyPending,
}

impl CycleOutcome {
    /// 本轮没有推进任何工作，下一轮前应等待
    fn is_idle(&self) -> bool {
        matches!(self, Self::CaptureSkipped | Self::CleanupAlreadyPending)
    }
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    capture: Arc<dyn Capture>,
    queue: CleanupQueue,
    thresholds: Thresholds,
    capture_duration: Duration,
    idle_poll: Duration,
    /// 关闭信号；录音进行中收到时由采集端收尾，本轮结果照常入库
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        capture: Arc<dyn Capture>,
        queue: CleanupQueue,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            store,
            capture,
            queue,
            thresholds,
            capture_duration: Duration::from_secs(600),
            idle_poll: Duration::from_secs(1),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_capture_duration(mut self, duration: Duration) -> Self {
        self.capture_duration = duration;
        self
    }

    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// 执行一轮判定；花费超限返回 `BudgetExceeded`
    pub async fn cycle(&self) -> Result<CycleOutcome, LifecycleError> {
        let metrics = UsageMetrics::collect(self.store.as_ref())?;
        let verdict = evaluate(&metrics, &self.thresholds);

        if verdict.spend_exceeded {
            tracing::error!(
                spend = verdict.spend,
                limit = self.thresholds.spend_limit,
                price_per_gb = self.thresholds.price_per_gb,
                uploaded_bytes = metrics.uploaded_bytes,
                "spend budget exceeded, stopping"
            );
            return Err(LifecycleError::BudgetExceeded {
                spend: verdict.spend,
                limit: self.thresholds.spend_limit,
            });
        }

        if verdict.needs_cleanup() {
            let reason = if verdict.storage_exceeded {
                CleanupReason::StorageExceeded
            } else {
                CleanupReason::CountExceeded
            };
            let outcome = match self.queue.try_enqueue(CleanupToken::new(reason)) {
                Enqueue::Enqueued => {
                    tracing::info!(
                        ?reason,
                        local_bytes = metrics.local_bytes,
                        local_count = metrics.local_count,
                        "cleanup enqueued"
                    );
                    CycleOutcome::CleanupEnqueued
                }
                Enqueue::AlreadyPending => {
                    tracing::debug!(?reason, "cleanup already pending");
                    CycleOutcome::CleanupAlreadyPending
                }
                Enqueue::Closed => {
                    tracing::warn!(?reason, "cleanup consumer is gone, request dropped");
                    CycleOutcome::CleanupAlreadyPending
                }
            };
            return Ok(outcome);
        }

        let captured = self
            .capture
            .capture_once(self.capture_duration, &self.shutdown)
            .await;
        match captured {
            Ok(output) => {
                let unit = output.into_unit();
                self.store.insert_unit(&unit)?;
                tracing::info!(unit = %unit.id, bytes = unit.size_bytes, path = %unit.path.display(), "capture stored");
                Ok(CycleOutcome::Captured(unit.id))
            }
            Err(e @ LifecycleError::Device(_)) => {
                tracing::warn!(error = %e, "capture failed, cycle skipped");
                Ok(CycleOutcome::CaptureSkipped)
            }
            Err(e) => Err(e),
        }
    }

    /// 生产者循环：直到关闭或遇到致命错误
    ///
    /// 关闭只在两轮之间生效；进行中的一轮总会走完，录到的文件不会脱离记录。
    pub async fn run_producer(&self) -> Result<(), LifecycleError> {
        while !self.shutdown.is_cancelled() {
            let outcome = self.cycle().await?;
            if outcome.is_idle() {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.idle_poll) => {}
                }
            }
        }
        tracing::debug!("producer stopped");
        Ok(())
    }

    /// 运行生产者与消费者直到关闭
    ///
    /// 任一方致命出错都会触发关闭并返回该错误；外部信号触发的关闭在返回前执行最终清理。
    pub async fn run(
        mut self,
        pipeline: Arc<CleanupPipeline>,
        rx: CleanupReceiver,
        shutdown: &ShutdownManager,
    ) -> Result<(), LifecycleError> {
        let consumer = {
            let pipeline = Arc::clone(&pipeline);
            let manager = shutdown.clone();
            tokio::spawn(async move {
                let result = pipeline.run_consumer(rx, manager.token()).await;
                if let Err(e) = &result {
                    manager.shutdown(ShutdownReason::Fatal(e.to_string()));
                }
                result
            })
        };

        self.shutdown = shutdown.token();
        let produced = self.run_producer().await;
        if let Err(e) = &produced {
            shutdown.shutdown(ShutdownReason::Fatal(e.to_string()));
        }
        // 生产者退出后释放投递端，消费者在 recv 处也能结束
        drop(self);

        let consumed = consumer.await.unwrap_or_else(|e| Err(e.into()));

        if shutdown.reason().is_some_and(ShutdownReason::wants_final_drain) {
            match pipeline.final_drain().await {
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "final drain failed"),
            }
        }

        produced.and(consumed)
    }
}
