//! Earshot - 受预算约束的录音生命周期编排
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、单槽清理队列、清理流水线、主控循环、关闭信号
//! - **lifecycle**: 预算判定、归档、上传与重试策略、本地清理
//! - **store**: 录音单元 / 归档容器模型与持久化（SQLite / 内存）
//! - **capture**: 录音采集（外部命令）
//! - **compress**: 归档压缩（zip）
//! - **remote**: 远端传输（HTTP PUT / 目录）
//! - **query**: 只读查询
//! - **api**: 只读 HTTP 接口（feature `web`）

#[cfg(feature = "web")]
pub mod api;
pub mod capture;
pub mod compress;
pub mod config;
pub mod core;
pub mod lifecycle;
pub mod observability;
pub mod query;
pub mod remote;
pub mod store;

pub use crate::core::{LifecycleError, Orchestrator, ShutdownManager};
pub use query::QueryService;
