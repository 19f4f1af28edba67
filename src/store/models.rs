//! 实体模型：录音单元（CaptureUnit）与归档容器（Container）
//!
//! 固定字段的记录类型，替代按字符串键查找的字典式元数据。

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

entity_id!(
    /// 录音单元 ID
    UnitId
);

entity_id!(
    /// 归档容器 ID
    ContainerId
);

/// 录音单元的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    /// 已录制，尚未归档
    Pending,
    /// 已打包进某个容器
    Archived,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Pending => "pending",
            UnitStatus::Archived => "archived",
        }
    }
}

impl FromStr for UnitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UnitStatus::Pending),
            "archived" => Ok(UnitStatus::Archived),
            other => Err(format!("unknown unit status: {other}")),
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 录音单元：一个录音文件及其元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureUnit {
    pub id: UnitId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub path: PathBuf,
    pub status: UnitStatus,
    /// 本地文件仍存在（删除后置 false）
    pub locally_present: bool,
    /// 所属容器，一旦设置不再改变
    pub container_id: Option<ContainerId>,
}

impl CaptureUnit {
    pub fn new(
        path: PathBuf,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        size_bytes: u64,
    ) -> Self {
        Self {
            id: UnitId::new(),
            started_at,
            ended_at,
            size_bytes,
            path,
            status: UnitStatus::Pending,
            locally_present: true,
            container_id: None,
        }
    }

    /// 待归档：pending、尚无容器且本地文件仍在
    pub fn is_archivable(&self) -> bool {
        self.status == UnitStatus::Pending && self.container_id.is_none() && self.locally_present
    }

    /// 已满足持久条件（已归档），可以删除本地副本
    pub fn is_durable(&self) -> bool {
        self.status == UnitStatus::Archived
    }
}

/// 归档容器：一组录音单元的压缩包
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub created_at: DateTime<Utc>,
    pub local_path: PathBuf,
    pub size_bytes: u64,
    /// 上传前为空字符串；非空当且仅当 uploaded 为 true
    pub remote_location: String,
    pub uploaded: bool,
    pub locally_present: bool,
    /// 容器内的录音单元（由存储层根据单元的反向引用填充）
    #[serde(default)]
    pub unit_ids: Vec<UnitId>,
}

impl Container {
    pub fn new(id: ContainerId, local_path: PathBuf, size_bytes: u64) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            local_path,
            size_bytes,
            remote_location: String::new(),
            uploaded: false,
            locally_present: true,
            unit_ids: Vec::new(),
        }
    }

    pub fn mark_uploaded(&mut self, remote_location: String) {
        self.uploaded = !remote_location.is_empty();
        self.remote_location = remote_location;
    }

    pub fn mark_upload_failed(&mut self) {
        self.uploaded = false;
        self.remote_location.clear();
    }

    pub fn is_durable(&self) -> bool {
        self.uploaded
    }
}

/// 录音单元列表过滤条件；None 表示不过滤该字段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitFilter {
    pub status: Option<UnitStatus>,
    pub locally_present: Option<bool>,
}

impl UnitFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// 本地仍存在的录音（预算统计口径）
    pub fn local() -> Self {
        Self {
            status: None,
            locally_present: Some(true),
        }
    }

    pub fn pending() -> Self {
        Self {
            status: Some(UnitStatus::Pending),
            locally_present: Some(true),
        }
    }

    /// 已归档但本地文件尚未清理
    pub fn archived_local() -> Self {
        Self {
            status: Some(UnitStatus::Archived),
            locally_present: Some(true),
        }
    }

    pub fn matches(&self, unit: &CaptureUnit) -> bool {
        self.status.map_or(true, |s| unit.status == s)
            && self.locally_present.map_or(true, |p| unit.locally_present == p)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerFilter {
    pub uploaded: Option<bool>,
    pub locally_present: Option<bool>,
}

impl ContainerFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn uploaded() -> Self {
        Self {
            uploaded: Some(true),
            locally_present: None,
        }
    }

    /// 尚未上传且本地文件仍在
    pub fn awaiting_upload() -> Self {
        Self {
            uploaded: Some(false),
            locally_present: Some(true),
        }
    }

    pub fn uploaded_local() -> Self {
        Self {
            uploaded: Some(true),
            locally_present: Some(true),
        }
    }

    pub fn matches(&self, container: &Container) -> bool {
        self.uploaded.map_or(true, |u| container.uploaded == u)
            && self
                .locally_present
                .map_or(true, |p| container.locally_present == p)
    }
}
