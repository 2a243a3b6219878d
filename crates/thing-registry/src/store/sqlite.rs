//! SQLite-backed thing store.

use super::{StoredThing, ThingStore};
use crate::config::StoreConfig;
use crate::error::{RegistryError, Result};
use crate::models::ThingDescription;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// SQLite-backed thing store.
///
/// Uses WAL mode for safe concurrent access across processes and
/// `Arc<Mutex<Connection>>` for thread safety within a process. Every
/// statement runs on tokio's blocking pool.
pub struct SqliteThingStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteThingStore {
    /// Open the store at the default platform location.
    pub fn open() -> Result<Self> {
        let db_path = crate::config::default_db_path()?;
        Self::open_at(&db_path)
    }

    /// Open the store at a specific path.
    ///
    /// Creates the database and parent directories if they don't exist.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| RegistryError::Io {
                    message: format!("Failed to create store directory: {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        debug!("Opened thing store at {}", db_path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA busy_timeout={};\n\
             PRAGMA synchronous=NORMAL;",
            StoreConfig::BUSY_TIMEOUT_MS,
        ))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS things (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Run `op` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| RegistryError::store("Failed to acquire store connection lock"))?;
            op(&guard)
        })
        .await
        .map_err(|e| RegistryError::store(format!("Store task failed: {}", e)))?
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

#[async_trait::async_trait]
impl ThingStore for SqliteThingStore {
    async fn list_all(&self) -> Result<Vec<StoredThing>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, description, created_at FROM things ORDER BY rowid",
            )?;

            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;

            let mut records = Vec::new();
            for row in rows {
                let (id, description_json, created_at) = row?;
                let description: ThingDescription = serde_json::from_str(&description_json)
                    .map_err(|e| {
                        RegistryError::store(format!("Corrupt description for {}: {}", id, e))
                    })?;
                records.push(StoredThing {
                    id,
                    description,
                    created_at,
                });
            }

            Ok(records)
        })
        .await
    }

    async fn create(&self, id: &str, description: &ThingDescription) -> Result<StoredThing> {
        let id = id.to_string();
        let description = description.clone();
        let description_json = serde_json::to_string(&description)?;

        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            match conn.execute(
                "INSERT INTO things (id, description, created_at) VALUES (?1, ?2, ?3)",
                params![id, description_json, now],
            ) {
                Ok(_) => {}
                Err(e) if is_constraint_violation(&e) => {
                    return Err(RegistryError::Conflict { id });
                }
                Err(e) => return Err(e.into()),
            }

            debug!("Stored thing {}", id);

            Ok(StoredThing {
                id,
                description,
                created_at: now,
            })
        })
        .await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let rows = conn.execute("DELETE FROM things WHERE id = ?1", params![id])?;
            if rows == 0 {
                return Err(RegistryError::NotFound { id });
            }
            debug!("Deleted stored thing {}", id);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteThingStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("things.sqlite");
        let store = SqliteThingStore::open_at(&db_path).unwrap();
        (store, temp_dir)
    }

    fn lamp() -> ThingDescription {
        ThingDescription::new("lamp")
            .with_property("on")
            .with_field("title", json!("Desk Lamp"))
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let (store, _temp_dir) = create_test_store();

        let record = store.create("lamp", &lamp()).await.unwrap();
        assert_eq!(record.id, "lamp");
        assert!(!record.created_at.is_empty());

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].description, lamp());
    }

    #[tokio::test]
    async fn test_list_empty_store() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_is_conflict() {
        let (store, _temp_dir) = create_test_store();
        store.create("lamp", &lamp()).await.unwrap();

        let err = store.create("lamp", &lamp()).await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { ref id } if id == "lamp"));
    }

    #[tokio::test]
    async fn test_remove_existing_and_missing() {
        let (store, _temp_dir) = create_test_store();
        store.create("lamp", &lamp()).await.unwrap();

        store.remove("lamp").await.unwrap();
        assert!(store.list_all().await.unwrap().is_empty());

        let err = store.remove("lamp").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("things.sqlite");

        {
            let store = SqliteThingStore::open_at(&db_path).unwrap();
            store.create("a", &ThingDescription::new("a")).await.unwrap();
            store.create("b", &ThingDescription::new("b")).await.unwrap();
        }

        let reopened = SqliteThingStore::open_at(&db_path).unwrap();
        let ids: Vec<_> = reopened
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_two_stores_same_db_concurrent_access() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("shared.sqlite");

        let writer = SqliteThingStore::open_at(&db_path).unwrap();
        let reader = SqliteThingStore::open_at(&db_path).unwrap();

        writer.create("shared", &ThingDescription::new("shared")).await.unwrap();

        let all = reader.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "shared");
    }

    #[tokio::test]
    async fn test_corrupt_row_is_store_failure() {
        let (store, _temp_dir) = create_test_store();
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO things (id, description, created_at) VALUES ('bad', '{not json', 'now')",
                [],
            )
            .unwrap();

        let err = store.list_all().await.unwrap_err();
        assert!(matches!(err, RegistryError::StoreUnavailable { .. }));
        assert_eq!(err.to_rpc_error_code(), -32603);
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = SqliteThingStore::open_in_memory().unwrap();
        store.create("x", &ThingDescription::new("x")).await.unwrap();
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }
}
