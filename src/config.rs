//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `EARSHOT__*` 覆盖（双下划线表示嵌套，如 `EARSHOT__BUDGET__RECORD_COUNT=5`）。
//! 启动时构造一次，之后以引用传给各组件，不存在全局配置。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::LifecycleError;
use crate::lifecycle::{RetryPolicy, Thresholds};
use crate::remote::RemoteConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub capture: CaptureSection,
    pub budget: BudgetSection,
    pub remote: RemoteSection,
    pub retry: RetrySection,
    pub server: ServerSection,
}

/// [app] 段：数据库、录音与归档目录、录音时长
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub db_path: PathBuf,
    pub record_dir: PathBuf,
    /// 归档输出目录，必须预先存在（不会自动创建）
    pub archive_dir: PathBuf,
    /// 单次录音时长（秒）
    pub capture_secs: u64,
    /// 清理已排队或录音失败时，下一轮检查前的等待（毫秒）
    pub idle_poll_ms: u64,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/earshot.db"),
            record_dir: PathBuf::from("data/records"),
            archive_dir: PathBuf::from("data/archives"),
            capture_secs: 600,
            idle_poll_ms: 1000,
        }
    }
}

/// [capture] 段：外部录音命令，参数中的 `{duration}` / `{path}` 会被替换
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            program: "arecord".to_string(),
            args: vec![
                "-q".into(),
                "-f".into(),
                "cd".into(),
                "-t".into(),
                "wav".into(),
                "-d".into(),
                "{duration}".into(),
                "{path}".into(),
            ],
        }
    }
}

/// [budget] 段：所有阈值必填，0 表示不限
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BudgetSection {
    /// 本地录音总字节数上限
    pub storage_bytes: Option<u64>,
    /// 本地录音条数上限
    pub record_count: Option<u64>,
    /// 累计上传花费上限（美元）
    pub spend_limit: Option<f64>,
    pub price_per_gb: Option<f64>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKind {
    /// aws-sdk-s3 PutObject（SigV4 签名，默认凭据链）
    #[default]
    S3,
    /// 未签名 HTTP PUT 到 `endpoint`（鉴权上传代理）
    Http,
    /// 复制到挂载目录（NFS / 网盘同步目录）
    Directory,
}

/// [remote] 段：对象存储位置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    pub kind: RemoteKind,
    pub bucket: String,
    pub region: String,
    /// s3：S3 兼容服务地址（MinIO 等），未设置时走 AWS 官方端点；http：必填
    pub endpoint: Option<String>,
    pub directory: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            kind: RemoteKind::S3,
            bucket: String::new(),
            region: String::new(),
            endpoint: None,
            directory: None,
            timeout_secs: 300,
        }
    }
}

/// [retry] 段：上传重试次数与随机退避区间（秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_min_secs: 10,
            backoff_max_secs: 90,
        }
    }
}

/// [server] 段：只读查询接口
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl AppConfig {
    /// 启动时校验；任何问题都是 Config 错误（致命）
    pub fn validate(&self) -> Result<(), LifecycleError> {
        self.thresholds()?;

        if self.app.capture_secs == 0 {
            return Err(LifecycleError::Config(
                "app.capture_secs must be greater than 0".into(),
            ));
        }
        if self.capture.program.trim().is_empty() {
            return Err(LifecycleError::Config("capture.program is empty".into()));
        }
        if self.remote.bucket.trim().is_empty() || self.remote.region.trim().is_empty() {
            return Err(LifecycleError::Config(
                "remote.bucket and remote.region are required".into(),
            ));
        }
        if self.remote.kind == RemoteKind::Directory && self.remote.directory.is_none() {
            return Err(LifecycleError::Config(
                "remote.directory is required when remote.kind = \"directory\"".into(),
            ));
        }
        if self.remote.kind == RemoteKind::Http && self.remote.endpoint.is_none() {
            return Err(LifecycleError::Config(
                "remote.endpoint is required when remote.kind = \"http\"".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(LifecycleError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.backoff_min_secs > self.retry.backoff_max_secs {
            return Err(LifecycleError::Config(format!(
                "retry backoff range is inverted: {}s > {}s",
                self.retry.backoff_min_secs, self.retry.backoff_max_secs
            )));
        }
        Ok(())
    }

    /// 预算阈值；缺失或为负数时报错
    pub fn thresholds(&self) -> Result<Thresholds, LifecycleError> {
        let b = &self.budget;
        let missing = |name: &str| {
            LifecycleError::Config(format!("budget.{name} must be set (0 = unlimited)"))
        };
        let thresholds = Thresholds {
            storage_bytes: b.storage_bytes.ok_or_else(|| missing("storage_bytes"))?,
            record_count: b.record_count.ok_or_else(|| missing("record_count"))?,
            spend_limit: b.spend_limit.ok_or_else(|| missing("spend_limit"))?,
            price_per_gb: b.price_per_gb.ok_or_else(|| missing("price_per_gb"))?,
        };
        if !(thresholds.spend_limit >= 0.0 && thresholds.price_per_gb >= 0.0) {
            return Err(LifecycleError::Config(
                "budget.spend_limit and budget.price_per_gb must be non-negative numbers".into(),
            ));
        }
        Ok(thresholds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            backoff_min: Duration::from_secs(self.retry.backoff_min_secs),
            backoff_max: Duration::from_secs(self.retry.backoff_max_secs),
        }
    }

    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig::new(&self.remote.bucket, &self.remote.region)
    }

    pub fn capture_duration(&self) -> Duration {
        Duration::from_secs(self.app.capture_secs)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.app.idle_poll_ms)
    }
}

/// 从 config 目录加载配置，环境变量 EARSHOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 EARSHOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("EARSHOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
