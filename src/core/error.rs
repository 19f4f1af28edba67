//! 生命周期错误类型
//!
//! 按处理方式分三类：可跳过本轮（Device / NoWork / Directory）、按策略重试（Transport）、
//! 致命停机（BudgetExceeded / RetryExhausted）。

use std::path::PathBuf;

use thiserror::Error;

use crate::store::{ContainerId, StoreError};

/// 单次远端推送失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transport failed for '{key}': {message}")]
pub struct TransportError {
    pub key: String,
    pub message: String,
}

impl TransportError {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// 编排过程中可能出现的错误
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Capture device error: {0}")]
    Device(String),

    #[error("No pending capture units to archive")]
    NoWork,

    #[error("Archive directory does not exist: {0}")]
    Directory(PathBuf),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// 累计花费超过上限：安全停机，不是程序缺陷
    #[error("Spend budget exceeded: ${spend:.2} > ${limit:.2}")]
    BudgetExceeded { spend: f64, limit: f64 },

    #[error("Upload of container {container} still failing after {attempts} attempts")]
    RetryExhausted {
        container: ContainerId,
        attempts: u32,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 后台任务（阻塞线程池或消费者）崩溃或被取消
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => LifecycleError::NotFound(format!("{kind} {id}")),
            other => LifecycleError::Store(other),
        }
    }
}

impl LifecycleError {
    /// 是否需要终止整个进程
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LifecycleError::BudgetExceeded { .. } | LifecycleError::RetryExhausted { .. }
        )
    }

    /// 进程退出码：两类致命错误各有独立退出码，其余失败为 1
    pub fn exit_code(&self) -> i32 {
        match self {
            LifecycleError::BudgetExceeded { .. } => 2,
            LifecycleError::RetryExhausted { .. } => 3,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds_have_distinct_exit_codes() {
        let budget = LifecycleError::BudgetExceeded {
            spend: 15.0,
            limit: 10.0,
        };
        let retry = LifecycleError::RetryExhausted {
            container: ContainerId::new(),
            attempts: 10,
        };
        assert!(budget.is_fatal());
        assert!(retry.is_fatal());
        assert_ne!(budget.exit_code(), retry.exit_code());
        assert_ne!(budget.exit_code(), 0);

        assert!(!LifecycleError::NoWork.is_fatal());
        assert!(!LifecycleError::Device("no input".into()).is_fatal());
    }

    #[test]
    fn test_budget_message_carries_threshold() {
        let err = LifecycleError::BudgetExceeded {
            spend: 15.0,
            limit: 10.0,
        };
        assert_eq!(err.to_string(), "Spend budget exceeded: $15.00 > $10.00");
    }

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err: LifecycleError = StoreError::unit_not_found(&crate::store::UnitId::new()).into();
        assert!(matches!(err, LifecycleError::NotFound(msg) if msg.starts_with("unit ")));
    }
}
