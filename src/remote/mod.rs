//! 远端存储：推送原语与确定性的远端位置
//!
//! 远端位置只由 bucket、region 与容器 ID 推导，事后无需列举远端即可重建。

pub mod directory;
pub mod http;
pub mod s3;

use std::path::Path;

use async_trait::async_trait;

use crate::core::TransportError;
use crate::store::ContainerId;

pub use directory::DirectoryRemote;
pub use http::HttpRemote;
pub use s3::S3Remote;

/// 远端目标：bucket + region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub bucket: String,
    pub region: String,
}

impl RemoteConfig {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
        }
    }

    /// 对象的公开访问地址
    pub fn location_for(&self, key: &str) -> String {
        format!(
            "https://{}.s3-{}.amazonaws.com/{}",
            self.bucket, self.region, key
        )
    }
}

/// 容器在远端的对象名
pub fn object_key(id: &ContainerId) -> String {
    format!("{id}.zip")
}

/// 远端推送原语：把一个本地文件推到指定 bucket/key
#[async_trait]
pub trait RemoteTransfer: Send + Sync {
    async fn push(&self, local_path: &Path, bucket: &str, key: &str) -> Result<(), TransportError>;

    /// 名称（用于日志）
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_is_deterministic() {
        let remote = RemoteConfig::new("recordings", "eu-west-1");
        let id: ContainerId = "6f1c3c52-6a4e-4f7e-9d55-0d6f3b1c2a10".parse().unwrap();
        let key = object_key(&id);
        assert_eq!(key, "6f1c3c52-6a4e-4f7e-9d55-0d6f3b1c2a10.zip");
        assert_eq!(
            remote.location_for(&key),
            "https://recordings.s3-eu-west-1.amazonaws.com/6f1c3c52-6a4e-4f7e-9d55-0d6f3b1c2a10.zip"
        );
        assert_eq!(remote.location_for(&key), remote.location_for(&object_key(&id)));
    }
}
