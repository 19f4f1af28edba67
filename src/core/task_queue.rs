//! 清理任务队列
//!
//! 容量为 1 的通道：生产者非阻塞投递，队列已满表示"已有一次清理待执行"，不是错误；
//! 消费者只在队列为空时阻塞。

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// 触发清理的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupReason {
    StorageExceeded,
    CountExceeded,
}

/// 一次清理请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupToken {
    pub requested_at: DateTime<Utc>,
    pub reason: CleanupReason,
}

impl CleanupToken {
    pub fn new(reason: CleanupReason) -> Self {
        Self {
            requested_at: Utc::now(),
            reason,
        }
    }
}

/// 投递结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Enqueued,
    /// 槽位已占用，本次投递被丢弃
    AlreadyPending,
    /// 消费者已退出
    Closed,
}

/// 生产者端
#[derive(Debug, Clone)]
pub struct CleanupQueue {
    tx: mpsc::Sender<CleanupToken>,
}

/// 消费者端
#[derive(Debug)]
pub struct CleanupReceiver {
    rx: mpsc::Receiver<CleanupToken>,
}

pub fn cleanup_queue() -> (CleanupQueue, CleanupReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (CleanupQueue { tx }, CleanupReceiver { rx })
}

impl CleanupQueue {
    pub fn try_enqueue(&self, token: CleanupToken) -> Enqueue {
        match self.tx.try_send(token) {
            Ok(()) => Enqueue::Enqueued,
            Err(TrySendError::Full(_)) => Enqueue::AlreadyPending,
            Err(TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.tx.capacity() == 0
    }
}

impl CleanupReceiver {
    /// 所有生产者端都已释放时返回 None
    pub async fn recv(&mut self) -> Option<CleanupToken> {
        self.rx.recv().await
    }

    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_single_slot() {
        let (queue, mut rx) = cleanup_queue();
        assert!(!queue.is_pending());
        assert_eq!(
            queue.try_enqueue(CleanupToken::new(CleanupReason::CountExceeded)),
            Enqueue::Enqueued
        );
        assert!(queue.is_pending());
        for _ in 0..3 {
            assert_eq!(
                queue.try_enqueue(CleanupToken::new(CleanupReason::StorageExceeded)),
                Enqueue::AlreadyPending
            );
        }

        let token = rx.recv().await.unwrap();
        assert_eq!(token.reason, CleanupReason::CountExceeded);
        assert!(!queue.is_pending());
        assert_eq!(
            queue.try_enqueue(CleanupToken::new(CleanupReason::StorageExceeded)),
            Enqueue::Enqueued
        );
    }

    #[tokio::test]
    async fn test_closed_receiver() {
        let (queue, mut rx) = cleanup_queue();
        rx.close();
        assert_eq!(
            queue.try_enqueue(CleanupToken::new(CleanupReason::CountExceeded)),
            Enqueue::Closed
        );
    }

    #[tokio::test]
    async fn test_recv_ends_when_producers_dropped() {
        let (queue, mut rx) = cleanup_queue();
        queue.try_enqueue(CleanupToken::new(CleanupReason::CountExceeded));
        drop(queue);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
