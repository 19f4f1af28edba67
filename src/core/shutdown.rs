//! 关闭信号
//!
//! 统一监听 Ctrl+C / SIGTERM 与内部致命错误：
//! - 取消 token 通知生产者、消费者和退避等待中的上传停止
//! - 只记录第一个关闭原因，决定退出前是否执行最终清理

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// 关闭原因
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    /// Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// 致命错误（预算超限、重试耗尽等）
    Fatal(String),
}

impl ShutdownReason {
    /// 外部信号触发的关闭需要执行最终清理
    pub fn wants_final_drain(&self) -> bool {
        matches!(self, Self::Interrupt | Self::Terminate)
    }
}

/// 关闭信号管理器
#[derive(Debug, Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason: Arc<OnceLock<ShutdownReason>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取关闭 token（用于取消正在进行的任务）
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发关闭；重复调用时保留第一个原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        if self.reason.set(reason.clone()).is_err() {
            tracing::debug!(?reason, "shutdown already requested");
        }
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<&ShutdownReason> {
        self.reason.get()
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                manager.shutdown(ShutdownReason::Interrupt);
            }
        });

        #[cfg(unix)]
        {
            let manager = self.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    manager.shutdown(ShutdownReason::Terminate);
                }
            });
        }
    }
}
