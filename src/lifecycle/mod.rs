//! 生命周期组件：预算判定、归档、上传、清理
//!
//! 各组件只依赖存储与对应协作者接口，由 `core::pipeline` 与 `core::orchestrator` 串联。

pub mod archive;
pub mod budget;
pub mod sweep;
pub mod upload;

pub use archive::ArchiveBuilder;
pub use budget::{evaluate, BudgetVerdict, Thresholds, UsageMetrics};
pub use sweep::{CleanupSweeper, SweepKind, Swept};
pub use upload::{reconcile_remote_locations, RetryPolicy, UploadManager, UploadOutcome};
