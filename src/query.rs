//! 只读查询：列表、按 ID 获取、按时间段查找录音所在位置

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::LifecycleError;
use crate::store::{
    CaptureUnit, Container, ContainerFilter, ContainerId, Store, UnitFilter, UnitId, UnitStatus,
};

/// 录音当前可以在哪里取到
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioLocation {
    /// 尚未归档：原始文件
    File { path: PathBuf },
    /// 已归档、容器未上传：本地容器
    Container { container: ContainerId, path: PathBuf },
    /// 容器已上传：远端位置
    Remote { container: ContainerId, url: String },
}

/// 时间段查询命中
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitHit {
    pub id: UnitId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub location: AudioLocation,
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn Store>,
}

impl QueryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn list_units(&self) -> Result<Vec<CaptureUnit>, LifecycleError> {
        Ok(self.store.list_units(UnitFilter::all())?)
    }

    pub fn list_containers(&self) -> Result<Vec<Container>, LifecycleError> {
        Ok(self.store.list_containers(ContainerFilter::all())?)
    }

    pub fn get_unit(&self, id: &UnitId) -> Result<CaptureUnit, LifecycleError> {
        Ok(self.store.get_unit(id)?)
    }

    pub fn get_container(&self, id: &ContainerId) -> Result<Container, LifecycleError> {
        Ok(self.store.get_container(id)?)
    }

    /// 按时间段查找录音
    ///
    /// - 只给 start：开始时间 >= start
    /// - 只给 end：开始时间 <= end
    /// - 都给：开始时间落在区间内，或录音跨过 start
    /// - 都不给：空
    pub fn units_overlapping(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<UnitHit>, LifecycleError> {
        if start.is_none() && end.is_none() {
            return Ok(Vec::new());
        }
        let matches = |u: &CaptureUnit| match (start, end) {
            (Some(s), None) => u.started_at >= s,
            (None, Some(e)) => u.started_at <= e,
            (Some(s), Some(e)) => {
                (u.started_at >= s && u.started_at <= e) || (u.ended_at >= s && u.started_at <= s)
            }
            (None, None) => false,
        };

        let mut containers: HashMap<ContainerId, Container> = HashMap::new();
        let mut hits = Vec::new();
        for unit in self.store.list_units(UnitFilter::all())? {
            if !matches(&unit) {
                continue;
            }
            let location = match (unit.status, unit.container_id) {
                (UnitStatus::Archived, Some(cid)) => {
                    if !containers.contains_key(&cid) {
                        containers.insert(cid, self.store.get_container(&cid)?);
                    }
                    let container = &containers[&cid];
                    if container.uploaded {
                        AudioLocation::Remote {
                            container: cid,
                            url: container.remote_location.clone(),
                        }
                    } else {
                        AudioLocation::Container {
                            container: cid,
                            path: container.local_path.clone(),
                        }
                    }
                }
                _ => AudioLocation::File {
                    path: unit.path.clone(),
                },
            };
            hits.push(UnitHit {
                id: unit.id,
                started_at: unit.started_at,
                ended_at: unit.ended_at,
                location,
            });
        }
        Ok(hits)
    }
}
