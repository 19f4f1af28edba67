//! 内存存储（测试与演练用）

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    CaptureUnit, Container, ContainerFilter, ContainerId, Store, StoreError, UnitFilter, UnitId,
};

#[derive(Default)]
struct Tables {
    units: HashMap<UnitId, CaptureUnit>,
    containers: HashMap<ContainerId, Container>,
}

/// 内存存储：RwLock 包裹两张表，语义与 SqliteStore 一致
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables.write().map_err(|_| StoreError::Poisoned)
    }
}

fn with_unit_ids(tables: &Tables, container: &Container) -> Container {
    let mut members: Vec<&CaptureUnit> = tables
        .units
        .values()
        .filter(|u| u.container_id == Some(container.id))
        .collect();
    members.sort_by_key(|u| u.started_at);

    let mut out = container.clone();
    out.unit_ids = members.into_iter().map(|u| u.id).collect();
    out
}

impl Store for InMemoryStore {
    fn insert_unit(&self, unit: &CaptureUnit) -> Result<(), StoreError> {
        self.write()?.units.insert(unit.id, unit.clone());
        Ok(())
    }

    fn update_unit(&self, unit: &CaptureUnit) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        match tables.units.get_mut(&unit.id) {
            Some(slot) => {
                *slot = unit.clone();
                Ok(())
            }
            None => Err(StoreError::unit_not_found(&unit.id)),
        }
    }

    fn get_unit(&self, id: &UnitId) -> Result<CaptureUnit, StoreError> {
        self.read()?
            .units
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::unit_not_found(id))
    }

    fn list_units(&self, filter: UnitFilter) -> Result<Vec<CaptureUnit>, StoreError> {
        let tables = self.read()?;
        let mut units: Vec<CaptureUnit> = tables
            .units
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        units.sort_by_key(|u| u.started_at);
        Ok(units)
    }

    fn insert_container(&self, container: &Container) -> Result<(), StoreError> {
        let mut stored = container.clone();
        stored.unit_ids.clear();
        self.write()?.containers.insert(container.id, stored);
        Ok(())
    }

    fn update_container(&self, container: &Container) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        match tables.containers.get_mut(&container.id) {
            Some(slot) => {
                *slot = container.clone();
                slot.unit_ids.clear();
                Ok(())
            }
            None => Err(StoreError::container_not_found(&container.id)),
        }
    }

    fn get_container(&self, id: &ContainerId) -> Result<Container, StoreError> {
        let tables = self.read()?;
        tables
            .containers
            .get(id)
            .map(|c| with_unit_ids(&tables, c))
            .ok_or_else(|| StoreError::container_not_found(id))
    }

    fn list_containers(&self, filter: ContainerFilter) -> Result<Vec<Container>, StoreError> {
        let tables = self.read()?;
        let mut containers: Vec<Container> = tables
            .containers
            .values()
            .filter(|c| filter.matches(c))
            .map(|c| with_unit_ids(&tables, c))
            .collect();
        containers.sort_by_key(|c| c.created_at);
        Ok(containers)
    }
}
