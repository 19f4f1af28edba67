//! 归档：把所有待归档录音打包为一个容器
//!
//! 单个文件在枚举与打包之间消失时跳过，不中断整批。

use std::path::{Path, PathBuf};

use crate::compress::Compressor;
use crate::core::LifecycleError;
use crate::store::{CaptureUnit, Container, ContainerId, Store, UnitStatus};

pub struct ArchiveBuilder<'a> {
    store: &'a dyn Store,
    compressor: &'a dyn Compressor,
}

impl<'a> ArchiveBuilder<'a> {
    pub fn new(store: &'a dyn Store, compressor: &'a dyn Compressor) -> Self {
        Self { store, compressor }
    }

    /// 打包 `pending` 并写入存储
    ///
    /// - `pending` 为空：`NoWork`，不写任何文件
    /// - `archive_dir` 不存在：`Directory`（不会自动创建）
    /// - 文件已消失的单元不进容器，其本地标记收敛为 false
    /// - 容器大小取写入完成后的文件实际大小
    pub fn build(
        &self,
        pending: &[CaptureUnit],
        archive_dir: &Path,
    ) -> Result<Container, LifecycleError> {
        if pending.is_empty() {
            return Err(LifecycleError::NoWork);
        }
        if !archive_dir.is_dir() {
            return Err(LifecycleError::Directory(archive_dir.to_path_buf()));
        }

        let mut candidates = Vec::with_capacity(pending.len());
        for unit in pending {
            if !unit.is_archivable() {
                tracing::warn!(unit = %unit.id, "unit already archived or not local, skipped");
                continue;
            }
            if unit.path.is_file() {
                candidates.push(unit);
            } else {
                self.mark_vanished(unit)?;
            }
        }

        let id = ContainerId::new();
        let local_path = archive_dir.join(format!("{id}.{}", self.compressor.extension()));
        let paths: Vec<PathBuf> = candidates.iter().map(|u| u.path.clone()).collect();
        let bundle = self.compressor.bundle(&paths, &local_path)?;
        let size_bytes = std::fs::metadata(&local_path)?.len();

        let mut container = Container::new(id, local_path, size_bytes);
        self.store.insert_container(&container)?;

        for unit in candidates {
            if !bundle.included.contains(&unit.path) {
                self.mark_vanished(unit)?;
                continue;
            }
            let mut archived = unit.clone();
            archived.status = UnitStatus::Archived;
            archived.container_id = Some(container.id);
            self.store.update_unit(&archived)?;
            container.unit_ids.push(archived.id);
        }

        tracing::info!(
            container = %container.id,
            units = container.unit_ids.len(),
            skipped = pending.len() - container.unit_ids.len(),
            bytes = container.size_bytes,
            "archive built"
        );
        Ok(container)
    }

    fn mark_vanished(&self, unit: &CaptureUnit) -> Result<(), LifecycleError> {
        tracing::warn!(unit = %unit.id, path = %unit.path.display(), "capture file vanished before archiving");
        let mut gone = unit.clone();
        gone.locally_present = false;
        self.store.update_unit(&gone)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::ZipCompressor;
    use crate::store::{InMemoryStore, UnitFilter, UnitId};
    use chrono::Utc;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn unit(store: &InMemoryStore, path: PathBuf, write: bool) -> CaptureUnit {
        if write {
            fs::write(&path, b"RIFF....WAVE").unwrap();
        }
        let u = CaptureUnit::new(path, Utc::now(), Utc::now(), 12);
        store.insert_unit(&u).unwrap();
        u
    }

    #[test]
    fn test_empty_pending_is_no_work_without_writes() {
        let dir = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        let zip = ZipCompressor::new();

        let err = ArchiveBuilder::new(&store, &zip).build(&[], dir.path()).unwrap_err();
        assert!(matches!(err, LifecycleError::NoWork));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_archive_dir_is_not_created() {
        let dir = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        let zip = ZipCompressor::new();
        let u = unit(&store, dir.path().join("a.wav"), true);
        let target = dir.path().join("archives");

        let err = ArchiveBuilder::new(&store, &zip).build(&[u], &target).unwrap_err();
        assert!(matches!(err, LifecycleError::Directory(p) if p == target));
        assert!(!target.exists());
    }

    #[test]
    fn test_all_files_missing_yields_empty_container() {
        let dir = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        let zip = ZipCompressor::new();
        let pending: Vec<_> = (0..3)
            .map(|i| unit(&store, dir.path().join(format!("gone_{i}.wav")), false))
            .collect();

        let container = ArchiveBuilder::new(&store, &zip)
            .build(&pending, dir.path())
            .unwrap();
        assert!(container.unit_ids.is_empty());
        assert!(container.local_path.is_file());
        assert_eq!(store.get_container(&container.id).unwrap().unit_ids.len(), 0);

        // 消失的文件不再计入本地用量，也不会再被当作待归档
        assert!(store.list_units(UnitFilter::local()).unwrap().is_empty());
        for u in &pending {
            assert_eq!(store.get_unit(&u.id).unwrap().status, UnitStatus::Pending);
        }
    }

    #[test]
    fn test_partial_batch_archives_present_files() {
        let dir = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        let zip = ZipCompressor::new();
        let present = unit(&store, dir.path().join("a.wav"), true);
        let vanished = unit(&store, dir.path().join("b.wav"), false);

        let container = ArchiveBuilder::new(&store, &zip)
            .build(&[present.clone(), vanished.clone()], dir.path())
            .unwrap();
        assert_eq!(container.unit_ids, vec![present.id]);
        assert_eq!(container.size_bytes, fs::metadata(&container.local_path).unwrap().len());

        let archived = store.get_unit(&present.id).unwrap();
        assert_eq!(archived.status, UnitStatus::Archived);
        assert_eq!(archived.container_id, Some(container.id));
        assert!(!store.get_unit(&vanished.id).unwrap().locally_present);
    }

    #[test]
    fn test_disjoint_builds_partition_the_pending_set() {
        let dir = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        let zip = ZipCompressor::new();
        let pending: Vec<_> = (0..5)
            .map(|i| unit(&store, dir.path().join(format!("r{i}.wav")), true))
            .collect();
        let (left, right) = pending.split_at(2);

        let builder = ArchiveBuilder::new(&store, &zip);
        let a = builder.build(left, dir.path()).unwrap();
        let b = builder.build(right, dir.path()).unwrap();

        let a_ids: HashSet<UnitId> = a.unit_ids.iter().copied().collect();
        let b_ids: HashSet<UnitId> = b.unit_ids.iter().copied().collect();
        let all: HashSet<UnitId> = pending.iter().map(|u| u.id).collect();
        assert!(a_ids.is_disjoint(&b_ids));
        assert_eq!(a_ids.union(&b_ids).copied().collect::<HashSet<_>>(), all);
    }

    #[test]
    fn test_already_archived_unit_keeps_its_container() {
        let dir = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        let zip = ZipCompressor::new();
        let u = unit(&store, dir.path().join("a.wav"), true);

        let builder = ArchiveBuilder::new(&store, &zip);
        let first = builder.build(&[u.clone()], dir.path()).unwrap();
        let stale = store.get_unit(&u.id).unwrap();
        let second = builder.build(&[stale], dir.path()).unwrap();

        assert!(second.unit_ids.is_empty());
        assert_eq!(store.get_unit(&u.id).unwrap().container_id, Some(first.id));
    }
}
