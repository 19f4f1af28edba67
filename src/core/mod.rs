//! 核心编排层：错误分类、清理队列、清理流水线、主控循环与关闭信号

pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod shutdown;
pub mod task_queue;

pub use error::{LifecycleError, TransportError};
pub use orchestrator::{CycleOutcome, Orchestrator};
pub use pipeline::{CleanupPipeline, PassReport};
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use task_queue::{cleanup_queue, CleanupQueue, CleanupReason, CleanupReceiver, CleanupToken, Enqueue};
