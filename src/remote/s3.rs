//! S3 推送：aws-sdk-s3 PutObject，SigV4 签名，凭据走默认凭据链
//!
//! 请求体直接从文件流式读取，不整包读入内存。SDK 自身的重试被关闭，
//! 重试次数与退避由上传流水线统一控制。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use super::RemoteTransfer;
use crate::core::TransportError;

pub struct S3Remote {
    client: Client,
}

impl S3Remote {
    /// 从环境（AWS_* 变量、配置文件、实例角色）加载凭据
    ///
    /// `endpoint` 用于 MinIO 等 S3 兼容服务，设置时改用路径式寻址。
    pub async fn new(region: &str, endpoint: Option<&str>, timeout_secs: u64) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(timeout_secs.max(1)))
                    .build(),
            );
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let conf = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(endpoint.is_some())
            .build();
        Self::from_client(Client::from_conf(conf))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteTransfer for S3Remote {
    async fn push(&self, local_path: &Path, bucket: &str, key: &str) -> Result<(), TransportError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| TransportError::new(key, format!("read {}: {e}", local_path.display())))?;
        tracing::debug!(bucket, key, "s3 put_object");

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type("application/zip")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::new(key, DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
