//! 上传：把未上传的容器推到远端
//!
//! `upload_pending` 对每个容器只尝试一次；重试循环在清理流水线中按容器分别计数。

use std::time::Duration;

use rand::Rng;

use crate::core::{LifecycleError, TransportError};
use crate::remote::{object_key, RemoteConfig, RemoteTransfer};
use crate::store::{Container, ContainerFilter, ContainerId, Store};

/// 单个容器的单次上传结果
#[derive(Debug)]
pub struct UploadOutcome {
    pub container: Container,
    pub result: Result<(), TransportError>,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// 上传重试策略：固定次数 + 均匀随机退避（不做指数增长）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数（含第一次）
    pub max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_min: Duration::from_secs(10),
            backoff_max: Duration::from_secs(90),
        }
    }
}

impl RetryPolicy {
    /// 在 [backoff_min, backoff_max] 内均匀取一个等待时长
    pub fn jittered_delay(&self) -> Duration {
        let lo = self.backoff_min.as_millis() as u64;
        let hi = (self.backoff_max.as_millis() as u64).max(lo);
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }
}

pub struct UploadManager<'a> {
    store: &'a dyn Store,
    remote: &'a dyn RemoteTransfer,
}

impl<'a> UploadManager<'a> {
    pub fn new(store: &'a dyn Store, remote: &'a dyn RemoteTransfer) -> Self {
        Self { store, remote }
    }

    /// 存储中等待上传的容器
    pub fn awaiting(&self) -> Result<Vec<Container>, LifecycleError> {
        Ok(self.store.list_containers(ContainerFilter::awaiting_upload())?)
    }

    /// 对每个尚未上传的容器推送一次；单个失败不中断整批
    pub async fn upload_pending(
        &self,
        containers: &[Container],
        remote: &RemoteConfig,
    ) -> Result<Vec<UploadOutcome>, LifecycleError> {
        let mut outcomes = Vec::with_capacity(containers.len());
        for container in containers.iter().filter(|c| !c.uploaded) {
            outcomes.push(self.upload_one(container.clone(), remote).await?);
        }
        Ok(outcomes)
    }

    async fn upload_one(
        &self,
        mut container: Container,
        remote: &RemoteConfig,
    ) -> Result<UploadOutcome, LifecycleError> {
        let key = object_key(&container.id);
        let result = self
            .remote
            .push(&container.local_path, &remote.bucket, &key)
            .await;

        match &result {
            Ok(()) => {
                container.mark_uploaded(remote.location_for(&key));
                tracing::info!(
                    container = %container.id,
                    via = self.remote.name(),
                    location = %container.remote_location,
                    "container uploaded"
                );
            }
            Err(e) => {
                container.mark_upload_failed();
                tracing::warn!(container = %container.id, error = %e, "upload attempt failed");
            }
        }
        self.store.update_container(&container)?;

        Ok(UploadOutcome { container, result })
    }
}

/// 按当前 bucket/region 重算所有已上传容器的远端位置，并修复违反
/// "远端位置非空当且仅当已上传" 的行；返回被改写的容器
pub fn reconcile_remote_locations(
    store: &dyn Store,
    remote: &RemoteConfig,
) -> Result<Vec<ContainerId>, LifecycleError> {
    let mut changed = Vec::new();
    for mut container in store.list_containers(ContainerFilter::all())? {
        let expected = if container.uploaded {
            remote.location_for(&object_key(&container.id))
        } else {
            String::new()
        };
        if container.remote_location != expected {
            tracing::info!(
                container = %container.id,
                from = %container.remote_location,
                to = %expected,
                "remote location rewritten"
            );
            container.remote_location = expected;
            store.update_container(&container)?;
            changed.push(container.id);
        }
    }
    Ok(changed)
}
