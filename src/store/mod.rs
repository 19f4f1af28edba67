//! 持久化存储抽象层
//!
//! 录音单元与归档容器的 CRUD 与过滤查询。每次调用在实现内部自行串行化，
//! 跨调用的多步操作不保证原子性（上层不变式按此设计）。

pub mod memory;
pub mod models;
pub mod sqlite;

use thiserror::Error;

pub use memory::InMemoryStore;
pub use models::{
    CaptureUnit, Container, ContainerFilter, ContainerId, UnitFilter, UnitId, UnitStatus,
};
pub use sqlite::SqliteStore;

/// 存储层错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn unit_not_found(id: &UnitId) -> Self {
        Self::NotFound {
            kind: "unit",
            id: id.to_string(),
        }
    }

    pub fn container_not_found(id: &ContainerId) -> Self {
        Self::NotFound {
            kind: "container",
            id: id.to_string(),
        }
    }
}

/// 存储接口
pub trait Store: Send + Sync {
    /// 新增录音单元
    fn insert_unit(&self, unit: &CaptureUnit) -> Result<(), StoreError>;

    /// 整行覆盖更新；未知 ID 返回 NotFound
    fn update_unit(&self, unit: &CaptureUnit) -> Result<(), StoreError>;

    fn get_unit(&self, id: &UnitId) -> Result<CaptureUnit, StoreError>;

    /// 按开始时间升序返回
    fn list_units(&self, filter: UnitFilter) -> Result<Vec<CaptureUnit>, StoreError>;

    fn insert_container(&self, container: &Container) -> Result<(), StoreError>;

    /// 更新容器字段（unit_ids 由单元的反向引用决定，不在此写入）
    fn update_container(&self, container: &Container) -> Result<(), StoreError>;

    /// 返回的容器已填充 unit_ids
    fn get_container(&self, id: &ContainerId) -> Result<Container, StoreError>;

    /// 按创建时间升序返回，已填充 unit_ids
    fn list_containers(&self, filter: ContainerFilter) -> Result<Vec<Container>, StoreError>;
}
