//! 录音采集：产出一个音频文件及其时间与大小

pub mod command;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::core::LifecycleError;
use crate::store::{CaptureUnit, UnitId};

pub use command::CommandCapture;

/// 一次录音的产出；`id` 在录音开始前分配，文件名与入库记录共用
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOutput {
    pub id: UnitId,
    pub path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl CaptureOutput {
    pub fn into_unit(self) -> CaptureUnit {
        let mut unit = CaptureUnit::new(self.path, self.started_at, self.ended_at, self.size_bytes);
        unit.id = self.id;
        unit
    }
}

/// 录音采集接口；输入设备不可用时返回 `LifecycleError::Device`
///
/// `cancel` 触发后应尽快结束：已写出的部分录音作为正常产出返回，
/// 否则删除残留文件并返回 `Device`。
#[async_trait]
pub trait Capture: Send + Sync {
    async fn capture_once(
        &self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<CaptureOutput, LifecycleError>;
}

/// 录音文件名：`record_<ID 后 12 位>_<unix 秒>.wav`
pub fn record_file_name(id: &UnitId, now: DateTime<Utc>) -> String {
    let id = id.as_uuid().simple().to_string();
    format!("record_{}_{}.wav", &id[id.len() - 12..], now.timestamp())
}
