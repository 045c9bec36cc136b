//! SQLite-backed record store via libsql. Implements RecordStore.
//!
//! Single `records` table keyed by (owner_id, collection, id); bodies are JSON text.
//! All owners share one database file: data/records.db

use crate::domain::{DomainError, ParticipantId};
use crate::ports::RecordStore;
use chrono::Utc;
use libsql::{Database, params};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const RECORDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    owner_id TEXT NOT NULL,
    collection TEXT NOT NULL,
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    body TEXT NOT NULL,
    written_at INTEGER NOT NULL
)"#;
const RECORDS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_records_owner_collection ON records (owner_id, collection, id)";

/// SQLite record store. One database file (records.db) in the given base directory.
pub struct SqliteRecordStore {
    db: Database,
    db_path: PathBuf,
}

impl SqliteRecordStore {
    /// Connect to (or create) the database and ensure the schema exists.
    /// Call once at startup; the returned store is safe to share via Arc.
    pub async fn connect(base_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let base = base_dir.as_ref();
        std::fs::create_dir_all(base).map_err(|e| DomainError::Store(e.to_string()))?;
        let db_path = base.join("records.db");
        let path_str = db_path.to_string_lossy();
        let db = libsql::Builder::new_local(path_str.as_ref())
            .build()
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        let conn = db.connect().map_err(|e| DomainError::Store(e.to_string()))?;

        // PRAGMA returns a row; execute() rejects statements that return rows.
        let mut wal_rows = conn
            .query("PRAGMA journal_mode=WAL", ())
            .await
            .map_err(|e| DomainError::Store(format!("WAL pragma failed: {}", e)))?;
        while wal_rows
            .next()
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?
            .is_some()
        {}

        conn.execute(RECORDS_TABLE, ())
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        conn.execute(RECORDS_INDEX, ())
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;

        info!(path = %db_path.display(), "SQLite record store connected with WAL mode");

        Ok(Self { db, db_path })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

#[async_trait::async_trait]
impl RecordStore for SqliteRecordStore {
    async fn write(
        &self,
        owner_id: &ParticipantId,
        collection: &str,
        record: serde_json::Value,
    ) -> Result<String, DomainError> {
        let body = serde_json::to_string(&record).map_err(|e| DomainError::Write(e.to_string()))?;
        let conn = self
            .db
            .connect()
            .map_err(|e| DomainError::Write(e.to_string()))?;
        conn.execute(
            "INSERT INTO records (owner_id, collection, body, written_at) VALUES (?1, ?2, ?3, ?4)",
            params![owner_id.as_str(), collection, body, Utc::now().timestamp()],
        )
        .await
        .map_err(|e| DomainError::Write(e.to_string()))?;
        let id = conn.last_insert_rowid().to_string();
        debug!(owner = %owner_id, collection, record_id = %id, "record written");
        Ok(id)
    }

    async fn list(
        &self,
        owner_id: &ParticipantId,
        collection: &str,
    ) -> Result<Vec<serde_json::Value>, DomainError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| DomainError::Store(e.to_string()))?;
        let mut rows = conn
            .query(
                "SELECT body FROM records WHERE owner_id = ?1 AND collection = ?2 ORDER BY id ASC",
                params![owner_id.as_str(), collection],
            )
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?
        {
            let body: String = row.get(0).map_err(|e| DomainError::Store(e.to_string()))?;
            let value =
                serde_json::from_str(&body).map_err(|e| DomainError::Store(e.to_string()))?;
            records.push(value);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_records_survive_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let owner = ParticipantId::from("me");
        {
            let store = SqliteRecordStore::connect(dir.path()).await.unwrap();
            store.write(&owner, "history", json!({"steps": 10})).await.unwrap();
            store.write(&owner, "history", json!({"steps": 20})).await.unwrap();
            store.write(&owner, "workouts", json!({"name": "Run"})).await.unwrap();
        }
        let store = SqliteRecordStore::connect(dir.path()).await.unwrap();
        let history = store.list(&owner, "history").await.unwrap();
        assert_eq!(history, vec![json!({"steps": 10}), json!({"steps": 20})]);
        assert!(store.list(&"f1".into(), "history").await.unwrap().is_empty());
    }
}
