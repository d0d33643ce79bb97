//! sqlite-adapter — SQLite implementation of the record repository ports.
//!
//! Purpose
//! - Provide a lightweight, file-based backend for installations, tags and
//!   upgrade records without external services.
//! - Implements `InstallationRepository`, `TagRepository` and
//!   `UpgradeRecordRepository` from the `domain` crate on one connection.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - The ports are async; every statement runs on tokio's blocking pool via
//!   `spawn_blocking`. A caller that stops waiting does not abort a statement
//!   already handed to the pool.
//! - Timestamps are stored as nanoseconds since UNIX_EPOCH (i64).
//! - The installation attribute map is stored as a JSON object in a TEXT column.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use domain::{
    Attributes, Installation, InstallationRepository, RecordKind, StoreError, Tag, TagRepository,
    UpgradeRecord, UpgradeRecordRepository,
};
use rusqlite::{params, Connection};
use tracing::debug;

/// SQLite-backed repository for all three record kinds.
#[derive(Clone)]
pub struct SqliteRepo {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepo {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref()).map_err(map_sqerr)?;
        init_schema(&conn)?;
        debug!(path = %path.as_ref().display(), "sqlite store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Private in-memory database; contents vanish with the last clone.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqerr)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Like [`SqliteRepo::new`] but creates missing parent directories first.
    pub fn open_creating_dirs<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .map_err(|e| StoreError::Storage(format!("create {}: {e}", dir.display())))?;
            }
        }
        Self::new(path)
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Storage("mutex poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Storage(format!("blocking task failed: {e}")))?
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS installations (
            id TEXT PRIMARY KEY,
            additional_information TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS tags (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            description TEXT,
            organization_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tags_organization ON tags(organization_id);
        CREATE TABLE IF NOT EXISTS upgrade_records (
            name TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );
        "#,
    )
    .map_err(map_sqerr)
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Storage(format!("sqlite error: {e}"))
}

/// Map a failed INSERT, turning unique-key violations into `Conflict`.
fn map_insert_err(e: rusqlite::Error, kind: RecordKind, id: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            return StoreError::conflict(kind, id);
        }
    }
    map_sqerr(e)
}

/// Signed nanoseconds since UNIX_EPOCH. Times outside roughly 1677..2262
/// do not fit an i64 column and are refused.
fn time_to_nanos(t: SystemTime) -> Result<i64, StoreError> {
    let out_of_range = || StoreError::Storage(format!("timestamp {t:?} out of storable range"));
    match t.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_nanos()).map_err(|_| out_of_range()),
        Err(before) => i64::try_from(before.duration().as_nanos())
            .map(|n| -n)
            .map_err(|_| out_of_range()),
    }
}

fn nanos_to_time(n: i64) -> Result<SystemTime, StoreError> {
    let offset = Duration::from_nanos(n.unsigned_abs());
    let t = if n >= 0 {
        UNIX_EPOCH.checked_add(offset)
    } else {
        UNIX_EPOCH.checked_sub(offset)
    };
    t.ok_or_else(|| StoreError::Storage(format!("stored timestamp {n} not representable")))
}

// ============ InstallationRepository ============

const INSTALLATION_COLUMNS: &str = "id, additional_information, created_at, updated_at";

fn row_to_installation(row: &rusqlite::Row) -> Result<Installation, StoreError> {
    let id: String = row.get(0).map_err(map_sqerr)?;
    let info: String = row.get(1).map_err(map_sqerr)?;
    let created_at: i64 = row.get(2).map_err(map_sqerr)?;
    let updated_at: i64 = row.get(3).map_err(map_sqerr)?;
    let additional_information: Attributes = serde_json::from_str(&info)
        .map_err(|e| StoreError::Storage(format!("bad additional_information for {id}: {e}")))?;
    Ok(Installation {
        id,
        additional_information,
        created_at: nanos_to_time(created_at)?,
        updated_at: nanos_to_time(updated_at)?,
    })
}

fn query_installation(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Option<Installation>, StoreError> {
    let mut stmt = conn.prepare(sql).map_err(map_sqerr)?;
    let mut rows = stmt.query(params).map_err(map_sqerr)?;
    match rows.next().map_err(map_sqerr)? {
        Some(row) => Ok(Some(row_to_installation(row)?)),
        None => Ok(None),
    }
}

fn encode_attributes(attrs: &Attributes) -> Result<String, StoreError> {
    serde_json::to_string(attrs)
        .map_err(|e| StoreError::Storage(format!("encode additional_information: {e}")))
}

#[async_trait]
impl InstallationRepository for SqliteRepo {
    async fn get(&self, id: &str) -> Result<Option<Installation>, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {INSTALLATION_COLUMNS} FROM installations WHERE id = ?1");
            query_installation(conn, &sql, params![id])
        })
        .await
    }

    async fn first(&self) -> Result<Option<Installation>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {INSTALLATION_COLUMNS} FROM installations ORDER BY created_at, id LIMIT 1"
            );
            query_installation(conn, &sql, [])
        })
        .await
    }

    async fn insert(&self, installation: Installation) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let info = encode_attributes(&installation.additional_information)?;
            let created_at = time_to_nanos(installation.created_at)?;
            let updated_at = time_to_nanos(installation.updated_at)?;
            conn.execute(
                "INSERT INTO installations(id, additional_information, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![installation.id, info, created_at, updated_at],
            )
            .map_err(|e| map_insert_err(e, RecordKind::Installation, &installation.id))?;
            Ok(())
        })
        .await
    }

    async fn replace(&self, installation: &Installation) -> Result<(), StoreError> {
        let installation = installation.clone();
        self.with_conn(move |conn| {
            let info = encode_attributes(&installation.additional_information)?;
            let created_at = time_to_nanos(installation.created_at)?;
            let updated_at = time_to_nanos(installation.updated_at)?;
            let changed = conn
                .execute(
                    "UPDATE installations SET additional_information = ?1, created_at = ?2, updated_at = ?3 WHERE id = ?4",
                    params![info, created_at, updated_at, installation.id],
                )
                .map_err(map_sqerr)?;
            if changed == 0 {
                Err(StoreError::not_found(RecordKind::Installation, installation.id))
            } else {
                Ok(())
            }
        })
        .await
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let changed = conn
                .execute("DELETE FROM installations WHERE id = ?1", params![id])
                .map_err(map_sqerr)?;
            Ok(changed > 0)
        })
        .await
    }
}

// ============ TagRepository ============

const TAG_COLUMNS: &str = "id, name, description, organization_id, created_at, updated_at";

fn row_to_tag(row: &rusqlite::Row) -> Result<Tag, StoreError> {
    let created_at: i64 = row.get(4).map_err(map_sqerr)?;
    let updated_at: i64 = row.get(5).map_err(map_sqerr)?;
    Ok(Tag {
        id: row.get(0).map_err(map_sqerr)?,
        name: row.get(1).map_err(map_sqerr)?,
        description: row.get(2).map_err(map_sqerr)?,
        organization_id: row.get(3).map_err(map_sqerr)?,
        created_at: nanos_to_time(created_at)?,
        updated_at: nanos_to_time(updated_at)?,
    })
}

fn query_tags(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Tag>, StoreError> {
    let mut stmt = conn.prepare(sql).map_err(map_sqerr)?;
    let mut rows = stmt.query(params).map_err(map_sqerr)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(map_sqerr)? {
        out.push(row_to_tag(row)?);
    }
    Ok(out)
}

#[async_trait]
impl TagRepository for SqliteRepo {
    async fn get(&self, id: &str) -> Result<Option<Tag>, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = ?1");
            Ok(query_tags(conn, &sql, params![id])?.into_iter().next())
        })
        .await
    }

    async fn get_in_organization(
        &self,
        id: &str,
        organization_id: &str,
    ) -> Result<Option<Tag>, StoreError> {
        let id = id.to_string();
        let org = organization_id.to_string();
        self.with_conn(move |conn| {
            let sql =
                format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = ?1 AND organization_id = ?2");
            Ok(query_tags(conn, &sql, params![id, org])?.into_iter().next())
        })
        .await
    }

    async fn list_by_organization(&self, organization_id: &str) -> Result<Vec<Tag>, StoreError> {
        let org = organization_id.to_string();
        self.with_conn(move |conn| {
            let sql =
                format!("SELECT {TAG_COLUMNS} FROM tags WHERE organization_id = ?1 ORDER BY seq");
            query_tags(conn, &sql, params![org])
        })
        .await
    }

    async fn insert(&self, tag: Tag) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let created_at = time_to_nanos(tag.created_at)?;
            let updated_at = time_to_nanos(tag.updated_at)?;
            conn.execute(
                "INSERT INTO tags(id, name, description, organization_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    tag.id,
                    tag.name,
                    tag.description,
                    tag.organization_id,
                    created_at,
                    updated_at,
                ],
            )
            .map_err(|e| map_insert_err(e, RecordKind::Tag, &tag.id))?;
            Ok(())
        })
        .await
    }

    async fn replace(&self, tag: &Tag) -> Result<(), StoreError> {
        let tag = tag.clone();
        self.with_conn(move |conn| {
            let created_at = time_to_nanos(tag.created_at)?;
            let updated_at = time_to_nanos(tag.updated_at)?;
            let changed = conn
                .execute(
                    "UPDATE tags SET name = ?1, description = ?2, organization_id = ?3, created_at = ?4, updated_at = ?5 WHERE id = ?6",
                    params![
                        tag.name,
                        tag.description,
                        tag.organization_id,
                        created_at,
                        updated_at,
                        tag.id,
                    ],
                )
                .map_err(map_sqerr)?;
            if changed == 0 {
                Err(StoreError::not_found(RecordKind::Tag, tag.id))
            } else {
                Ok(())
            }
        })
        .await
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let changed = conn
                .execute("DELETE FROM tags WHERE id = ?1", params![id])
                .map_err(map_sqerr)?;
            Ok(changed > 0)
        })
        .await
    }
}

// ============ UpgradeRecordRepository ============

const UPGRADE_COLUMNS: &str = "name, applied_at";

fn row_to_upgrade(row: &rusqlite::Row) -> Result<UpgradeRecord, StoreError> {
    let applied_at: i64 = row.get(1).map_err(map_sqerr)?;
    Ok(UpgradeRecord {
        name: row.get(0).map_err(map_sqerr)?,
        applied_at: nanos_to_time(applied_at)?,
    })
}

fn query_upgrades(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<UpgradeRecord>, StoreError> {
    let mut stmt = conn.prepare(sql).map_err(map_sqerr)?;
    let mut rows = stmt.query(params).map_err(map_sqerr)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(map_sqerr)? {
        out.push(row_to_upgrade(row)?);
    }
    Ok(out)
}

#[async_trait]
impl UpgradeRecordRepository for SqliteRepo {
    async fn get(&self, name: &str) -> Result<Option<UpgradeRecord>, StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {UPGRADE_COLUMNS} FROM upgrade_records WHERE name = ?1");
            Ok(query_upgrades(conn, &sql, params![name])?.into_iter().next())
        })
        .await
    }

    async fn list(&self) -> Result<Vec<UpgradeRecord>, StoreError> {
        self.with_conn(|conn| {
            let sql =
                format!("SELECT {UPGRADE_COLUMNS} FROM upgrade_records ORDER BY applied_at, name");
            query_upgrades(conn, &sql, [])
        })
        .await
    }

    async fn insert(&self, record: UpgradeRecord) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let applied_at = time_to_nanos(record.applied_at)?;
            conn.execute(
                "INSERT INTO upgrade_records(name, applied_at) VALUES (?1, ?2)",
                params![record.name, applied_at],
            )
            .map_err(|e| map_insert_err(e, RecordKind::UpgradeRecord, &record.name))?;
            Ok(())
        })
        .await
    }

    async fn replace(&self, record: &UpgradeRecord) -> Result<(), StoreError> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let applied_at = time_to_nanos(record.applied_at)?;
            let changed = conn
                .execute(
                    "UPDATE upgrade_records SET applied_at = ?1 WHERE name = ?2",
                    params![applied_at, record.name],
                )
                .map_err(map_sqerr)?;
            if changed == 0 {
                Err(StoreError::not_found(RecordKind::UpgradeRecord, record.name))
            } else {
                Ok(())
            }
        })
        .await
    }

    async fn remove(&self, name: &str) -> Result<bool, StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let changed = conn
                .execute("DELETE FROM upgrade_records WHERE name = ?1", params![name])
                .map_err(map_sqerr)?;
            Ok(changed > 0)
        })
        .await
    }
}
