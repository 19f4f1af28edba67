//! SQLite 存储实现
//!
//! 单连接 + Mutex：每次调用持锁执行一条（或一组只读）语句，存储自身串行化访问。

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{
    CaptureUnit, Container, ContainerFilter, ContainerId, Store, StoreError, UnitFilter, UnitId,
    UnitStatus,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS containers (
    id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    local_path TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    remote_location TEXT NOT NULL DEFAULT '',
    uploaded INTEGER NOT NULL DEFAULT 0,
    locally_present INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS capture_units (
    id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    ended_at TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    path TEXT NOT NULL,
    status TEXT NOT NULL,
    locally_present INTEGER NOT NULL DEFAULT 1,
    container_id TEXT REFERENCES containers(id)
);

CREATE INDEX IF NOT EXISTS idx_units_status ON capture_units(status, locally_present);
CREATE INDEX IF NOT EXISTS idx_units_container ON capture_units(container_id);
CREATE INDEX IF NOT EXISTS idx_containers_uploaded ON containers(uploaded, locally_present);
";

const UNIT_COLUMNS: &str =
    "id, started_at, ended_at, size_bytes, path, status, locally_present, container_id";

const CONTAINER_COLUMNS: &str =
    "id, created_at, local_path, size_bytes, remote_location, uploaded, locally_present";

/// SQLite 存储
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// 打开（必要时创建）数据库文件并建表
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn unit_ids_of(conn: &Connection, id: &ContainerId) -> Result<Vec<UnitId>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id FROM capture_units WHERE container_id = ?1 ORDER BY started_at",
        )?;
        let rows = stmt.query_map(params![id.to_string()], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for raw in rows {
            ids.push(parse_id(&raw?)?);
        }
        Ok(ids)
    }
}

/// 行的原始值；转换为实体时解析失败记为 Corrupt
struct UnitRow {
    id: String,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    size_bytes: i64,
    path: String,
    status: String,
    locally_present: bool,
    container_id: Option<String>,
}

impl UnitRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            started_at: row.get(1)?,
            ended_at: row.get(2)?,
            size_bytes: row.get(3)?,
            path: row.get(4)?,
            status: row.get(5)?,
            locally_present: row.get(6)?,
            container_id: row.get(7)?,
        })
    }

    fn into_unit(self) -> Result<CaptureUnit, StoreError> {
        Ok(CaptureUnit {
            id: parse_id(&self.id)?,
            started_at: self.started_at,
            ended_at: self.ended_at,
            size_bytes: self.size_bytes.max(0) as u64,
            path: PathBuf::from(self.path),
            status: self
                .status
                .parse::<UnitStatus>()
                .map_err(StoreError::Corrupt)?,
            locally_present: self.locally_present,
            container_id: self
                .container_id
                .as_deref()
                .map(parse_id::<ContainerId>)
                .transpose()?,
        })
    }
}

struct ContainerRow {
    id: String,
    created_at: DateTime<Utc>,
    local_path: String,
    size_bytes: i64,
    remote_location: String,
    uploaded: bool,
    locally_present: bool,
}

impl ContainerRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            created_at: row.get(1)?,
            local_path: row.get(2)?,
            size_bytes: row.get(3)?,
            remote_location: row.get(4)?,
            uploaded: row.get(5)?,
            locally_present: row.get(6)?,
        })
    }

    fn into_container(self, conn: &Connection) -> Result<Container, StoreError> {
        let id: ContainerId = parse_id(&self.id)?;
        let unit_ids = SqliteStore::unit_ids_of(conn, &id)?;
        Ok(Container {
            id,
            created_at: self.created_at,
            local_path: PathBuf::from(self.local_path),
            size_bytes: self.size_bytes.max(0) as u64,
            remote_location: self.remote_location,
            uploaded: self.uploaded,
            locally_present: self.locally_present,
            unit_ids,
        })
    }
}

fn parse_id<T>(raw: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr<Err = uuid::Error>,
{
    raw.parse::<T>()
        .map_err(|e| StoreError::Corrupt(format!("invalid id '{raw}': {e}")))
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Store for SqliteStore {
    fn insert_unit(&self, unit: &CaptureUnit) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO capture_units ({UNIT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                unit.id.to_string(),
                unit.started_at,
                unit.ended_at,
                unit.size_bytes as i64,
                path_text(&unit.path),
                unit.status.as_str(),
                unit.locally_present,
                unit.container_id.map(|c| c.to_string()),
            ],
        )?;
        Ok(())
    }

    fn update_unit(&self, unit: &CaptureUnit) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE capture_units
             SET started_at = ?2, ended_at = ?3, size_bytes = ?4, path = ?5,
                 status = ?6, locally_present = ?7, container_id = ?8
             WHERE id = ?1",
            params![
                unit.id.to_string(),
                unit.started_at,
                unit.ended_at,
                unit.size_bytes as i64,
                path_text(&unit.path),
                unit.status.as_str(),
                unit.locally_present,
                unit.container_id.map(|c| c.to_string()),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::unit_not_found(&unit.id));
        }
        Ok(())
    }

    fn get_unit(&self, id: &UnitId) -> Result<CaptureUnit, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {UNIT_COLUMNS} FROM capture_units WHERE id = ?1"),
                params![id.to_string()],
                UnitRow::read,
            )
            .optional()?;
        row.ok_or_else(|| StoreError::unit_not_found(id))?
            .into_unit()
    }

    fn list_units(&self, filter: UnitFilter) -> Result<Vec<CaptureUnit>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {UNIT_COLUMNS} FROM capture_units
             WHERE (?1 IS NULL OR status = ?1)
               AND (?2 IS NULL OR locally_present = ?2)
             ORDER BY started_at"
        ))?;
        let rows = stmt.query_map(
            params![filter.status.map(|s| s.as_str()), filter.locally_present],
            UnitRow::read,
        )?;
        let mut units = Vec::new();
        for row in rows {
            units.push(row?.into_unit()?);
        }
        Ok(units)
    }

    fn insert_container(&self, container: &Container) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO containers ({CONTAINER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                container.id.to_string(),
                container.created_at,
                path_text(&container.local_path),
                container.size_bytes as i64,
                container.remote_location,
                container.uploaded,
                container.locally_present,
            ],
        )?;
        Ok(())
    }

    fn update_container(&self, container: &Container) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE containers
             SET created_at = ?2, local_path = ?3, size_bytes = ?4,
                 remote_location = ?5, uploaded = ?6, locally_present = ?7
             WHERE id = ?1",
            params![
                container.id.to_string(),
                container.created_at,
                path_text(&container.local_path),
                container.size_bytes as i64,
                container.remote_location,
                container.uploaded,
                container.locally_present,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::container_not_found(&container.id));
        }
        Ok(())
    }

    fn get_container(&self, id: &ContainerId) -> Result<Container, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {CONTAINER_COLUMNS} FROM containers WHERE id = ?1"),
                params![id.to_string()],
                ContainerRow::read,
            )
            .optional()?;
        row.ok_or_else(|| StoreError::container_not_found(id))?
            .into_container(&conn)
    }

    fn list_containers(&self, filter: ContainerFilter) -> Result<Vec<Container>, StoreError> {
        let conn = self.conn()?;
        let raw = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONTAINER_COLUMNS} FROM containers
                 WHERE (?1 IS NULL OR uploaded = ?1)
                   AND (?2 IS NULL OR locally_present = ?2)
                 ORDER BY created_at"
            ))?;
            let rows = stmt.query_map(
                params![filter.uploaded, filter.locally_present],
                ContainerRow::read,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        raw.into_iter()
            .map(|row| row.into_container(&conn))
            .collect()
    }
}
