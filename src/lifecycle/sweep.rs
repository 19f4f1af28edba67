//! 清理：删除已在别处持久化的本地副本
//!
//! 先删文件再写标记；两步之间崩溃时，下一次清理发现文件已不存在，仅补写标记。

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::LifecycleError;
use crate::store::{ContainerFilter, Store, UnitFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepKind {
    /// 已归档且仍在本地的录音
    Units,
    /// 已上传且仍在本地的容器
    Containers,
}

/// 一次清理中被处理的实体
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Swept {
    pub kind: SweepKind,
    pub id: String,
    pub path: PathBuf,
    /// false 表示文件此前已不存在，仅收敛了标记
    pub file_removed: bool,
}

pub struct CleanupSweeper<'a> {
    store: &'a dyn Store,
}

impl<'a> CleanupSweeper<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// 没有可清理的实体时返回空列表
    pub fn sweep(&self, kind: SweepKind) -> Result<Vec<Swept>, LifecycleError> {
        let swept = match kind {
            SweepKind::Units => self.sweep_units()?,
            SweepKind::Containers => self.sweep_containers()?,
        };
        if swept.is_empty() {
            tracing::debug!(?kind, "nothing to sweep");
        } else {
            tracing::info!(?kind, count = swept.len(), "local copies removed");
        }
        Ok(swept)
    }

    fn sweep_units(&self) -> Result<Vec<Swept>, LifecycleError> {
        let mut swept = Vec::new();
        for mut unit in self.store.list_units(UnitFilter::archived_local())? {
            let file_removed = remove_if_present(&unit.path)?;
            unit.locally_present = false;
            self.store.update_unit(&unit)?;
            swept.push(Swept {
                kind: SweepKind::Units,
                id: unit.id.to_string(),
                path: unit.path,
                file_removed,
            });
        }
        Ok(swept)
    }

    fn sweep_containers(&self) -> Result<Vec<Swept>, LifecycleError> {
        let mut swept = Vec::new();
        for mut container in self.store.list_containers(ContainerFilter::uploaded_local())? {
            let file_removed = remove_if_present(&container.local_path)?;
            container.locally_present = false;
            self.store.update_container(&container)?;
            swept.push(Swept {
                kind: SweepKind::Containers,
                id: container.id.to_string(),
                path: container.local_path,
                file_removed,
            });
        }
        Ok(swept)
    }
}

fn remove_if_present(path: &Path) -> Result<bool, LifecycleError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CaptureUnit, Container, ContainerId, InMemoryStore, UnitStatus};
    use chrono::Utc;
    use std::fs;
    use tempfile::TempDir;

    fn archived_unit(store: &InMemoryStore, path: PathBuf, container: ContainerId) -> CaptureUnit {
        let mut u = CaptureUnit::new(path, Utc::now(), Utc::now(), 4);
        u.status = UnitStatus::Archived;
        u.container_id = Some(container);
        store.insert_unit(&u).unwrap();
        u
    }

    #[test]
    fn test_sweep_units_deletes_only_archived() {
        let dir = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        let c = Container::new(ContainerId::new(), dir.path().join("c.zip"), 1);
        store.insert_container(&c).unwrap();

        let archived_path = dir.path().join("a.wav");
        fs::write(&archived_path, b"RIFF").unwrap();
        let archived = archived_unit(&store, archived_path.clone(), c.id);

        let pending_path = dir.path().join("p.wav");
        fs::write(&pending_path, b"RIFF").unwrap();
        let pending = CaptureUnit::new(pending_path.clone(), Utc::now(), Utc::now(), 4);
        store.insert_unit(&pending).unwrap();

        let swept = CleanupSweeper::new(&store).sweep(SweepKind::Units).unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].id, archived.id.to_string());
        assert!(swept[0].file_removed);
        assert!(!archived_path.exists());
        assert!(pending_path.exists());
        assert!(!store.get_unit(&archived.id).unwrap().locally_present);
        assert!(store.get_unit(&pending.id).unwrap().locally_present);
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        let path = dir.path().join("c.zip");
        fs::write(&path, b"PK").unwrap();
        let mut c = Container::new(ContainerId::new(), path, 2);
        c.mark_uploaded("https://b.s3-r.amazonaws.com/c.zip".into());
        store.insert_container(&c).unwrap();

        let sweeper = CleanupSweeper::new(&store);
        assert_eq!(sweeper.sweep(SweepKind::Containers).unwrap().len(), 1);
        assert!(sweeper.sweep(SweepKind::Containers).unwrap().is_empty());
        assert!(sweeper.sweep(SweepKind::Units).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_converges_flag() {
        let dir = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        // 上次清理删了文件但没来得及写标记
        let mut c = Container::new(ContainerId::new(), dir.path().join("gone.zip"), 2);
        c.mark_uploaded("https://b.s3-r.amazonaws.com/gone.zip".into());
        store.insert_container(&c).unwrap();

        let swept = CleanupSweeper::new(&store).sweep(SweepKind::Containers).unwrap();
        assert_eq!(swept.len(), 1);
        assert!(!swept[0].file_removed);
        assert!(!store.get_container(&c.id).unwrap().locally_present);
    }

    #[test]
    fn test_not_uploaded_container_is_kept() {
        let dir = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        let path = dir.path().join("c.zip");
        fs::write(&path, b"PK").unwrap();
        store
            .insert_container(&Container::new(ContainerId::new(), path.clone(), 2))
            .unwrap();

        assert!(CleanupSweeper::new(&store)
            .sweep(SweepKind::Containers)
            .unwrap()
            .is_empty());
        assert!(path.exists());
    }
}
