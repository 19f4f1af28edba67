//! HTTP PUT 推送：路径式 `{endpoint}/{bucket}/{key}`
//!
//! 不做请求签名，只用于自带鉴权的上传代理或内网对象网关；直连 S3 用 [`super::S3Remote`]。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use super::RemoteTransfer;
use crate::core::TransportError;

pub struct HttpRemote {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRemote {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| TransportError::new("", format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{bucket}/{key}", self.endpoint)
    }
}

#[async_trait]
impl RemoteTransfer for HttpRemote {
    async fn push(&self, local_path: &Path, bucket: &str, key: &str) -> Result<(), TransportError> {
        let read_err =
            |e: std::io::Error| TransportError::new(key, format!("read {}: {e}", local_path.display()));
        let file = tokio::fs::File::open(local_path).await.map_err(read_err)?;
        let len = file.metadata().await.map_err(read_err)?.len();
        let url = self.url(bucket, key);
        tracing::debug!(url = %url, bytes = len, "http push");

        let resp = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/zip")
            .header(reqwest::header::CONTENT_LENGTH, len)
            .body(reqwest::Body::from(file))
            .send()
            .await
            .map_err(|e| TransportError::new(key, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(TransportError::new(
                key,
                format!("HTTP {status}: {}", text.trim()),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_is_path_style() {
        let remote = HttpRemote::new("http://127.0.0.1:9000/", 30).unwrap();
        assert_eq!(
            remote.url("recordings", "a.zip"),
            "http://127.0.0.1:9000/recordings/a.zip"
        );
    }

    #[tokio::test]
    async fn test_missing_local_file_is_transport_error() {
        let remote = HttpRemote::new("http://127.0.0.1:9", 1).unwrap();
        let err = remote
            .push(Path::new("/nonexistent/earshot.zip"), "b", "k.zip")
            .await
            .unwrap_err();
        assert_eq!(err.key, "k.zip");
    }
}
