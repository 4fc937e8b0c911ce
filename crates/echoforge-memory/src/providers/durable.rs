//! Durable Provider
//!
//! SQLite-backed storage. One row per entry id; `content`, `tags`,
//! `metadata` and `embedding` are stored as JSON text so a stored entry reads
//! back deep-equal to what was written.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, Row};

use super::migrations::{self, SCHEMA_VERSION};
use super::{MemoryProvider, MemoryResults, TypeOwnership};
use crate::error::{MemoryError, MemoryResult};
use crate::types::{MemoryEntry, MemoryQuery};

/// Raw column values of one `memory_entries` row
struct StoredRow {
    id: String,
    entry_type: String,
    timestamp: i64,
    content: String,
    tags: String,
    scope: String,
    agent_id: Option<String>,
    visibility: String,
    metadata: String,
    embedding: Option<String>,
}

/// SQLite provider.
///
/// Thread-safe via internal Mutex; the connection is dropped on `close`.
/// Several providers (or processes) may open the same file: the database runs
/// in WAL mode with a busy timeout, and every write is a single upsert.
pub struct DurableProvider {
    name: String,
    types: TypeOwnership,
    conn: Mutex<Option<Connection>>,
}

impl DurableProvider {
    /// Open (or create) the database at `path` and run migrations
    pub fn open(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        types: TypeOwnership,
    ) -> MemoryResult<Self> {
        let name = name.into();
        let conn = Connection::open(path.as_ref()).map_err(|e| MemoryError::storage(&name, e))?;

        // WAL journal with relaxed fsync
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| MemoryError::storage(&name, e))?;

        tracing::info!(provider = %name, path = %path.as_ref().display(), "Opened durable memory store");
        Self::from_connection(name, conn, types)
    }

    /// Open a private in-memory database
    pub fn open_in_memory(name: impl Into<String>, types: TypeOwnership) -> MemoryResult<Self> {
        let name = name.into();
        let conn = Connection::open_in_memory().map_err(|e| MemoryError::storage(&name, e))?;
        Self::from_connection(name, conn, types)
    }

    fn from_connection(name: String, conn: Connection, types: TypeOwnership) -> MemoryResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| MemoryError::storage(&name, e))?;

        let version = migrations::run_migrations(&conn).map_err(|e| MemoryError::storage(&name, e))?;
        if version > SCHEMA_VERSION {
            return Err(MemoryError::storage(
                &name,
                format!(
                    "database schema version {} is newer than supported version {}",
                    version, SCHEMA_VERSION
                ),
            ));
        }

        Ok(Self {
            name,
            types,
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Number of stored entries
    pub fn count(&self) -> MemoryResult<usize> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM memory_entries", [], |row| row.get(0))
                .map_err(|e| self.storage_error(e))
        })
    }

    fn storage_error(&self, message: impl std::fmt::Display) -> MemoryError {
        MemoryError::storage(&self.name, message)
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> MemoryResult<T>) -> MemoryResult<T> {
        let guard = self
            .conn
            .lock()
            .map_err(|_| self.storage_error("database lock poisoned"))?;
        let conn = guard
            .as_ref()
            .ok_or_else(|| self.storage_error("provider is closed"))?;
        f(conn)
    }

    fn to_json<T: serde::Serialize + ?Sized>(&self, value: &T) -> MemoryResult<String> {
        serde_json::to_string(value).map_err(|e| self.storage_error(e))
    }

    fn encode(&self, entry: &MemoryEntry) -> MemoryResult<StoredRow> {
        Ok(StoredRow {
            id: entry.id.clone(),
            entry_type: entry.entry_type.clone(),
            timestamp: entry.timestamp,
            content: self.to_json(&entry.content)?,
            tags: self.to_json(&entry.tags)?,
            scope: entry.scope.as_str().to_string(),
            agent_id: entry.agent_id.clone(),
            visibility: entry.visibility.as_str().to_string(),
            metadata: self.to_json(&entry.metadata)?,
            embedding: match entry.embedding {
                Some(ref vector) => Some(self.to_json(vector)?),
                None => None,
            },
        })
    }

    fn decode(&self, row: StoredRow) -> MemoryResult<MemoryEntry> {
        let corrupt = |field: &str, e: &dyn std::fmt::Display| {
            self.storage_error(format!("corrupt {} for entry '{}': {}", field, row.id, e))
        };

        let content = serde_json::from_str(&row.content).map_err(|e| corrupt("content", &e))?;
        let tags = serde_json::from_str(&row.tags).map_err(|e| corrupt("tags", &e))?;
        let metadata = serde_json::from_str(&row.metadata).map_err(|e| corrupt("metadata", &e))?;
        let scope = row.scope.parse().map_err(|e: String| corrupt("scope", &e))?;
        let visibility = row.visibility.parse().map_err(|e: String| corrupt("visibility", &e))?;
        let embedding = match row.embedding {
            Some(ref json) => Some(serde_json::from_str(json).map_err(|e| corrupt("embedding", &e))?),
            None => None,
        };

        Ok(MemoryEntry {
            id: row.id,
            entry_type: row.entry_type,
            timestamp: row.timestamp,
            content,
            tags,
            scope,
            agent_id: row.agent_id,
            visibility,
            metadata,
            embedding,
        })
    }

    fn map_row(row: &Row) -> rusqlite::Result<StoredRow> {
        Ok(StoredRow {
            id: row.get(0)?,
            entry_type: row.get(1)?,
            timestamp: row.get(2)?,
            content: row.get(3)?,
            tags: row.get(4)?,
            scope: row.get(5)?,
            agent_id: row.get(6)?,
            visibility: row.get(7)?,
            metadata: row.get(8)?,
            embedding: row.get(9)?,
        })
    }
}

#[async_trait]
impl MemoryProvider for DurableProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts_type(&self, entry_type: &str) -> bool {
        self.types.accepts(entry_type)
    }

    async fn store(&self, entry: MemoryEntry) -> MemoryResult<()> {
        let row = self.encode(&entry)?;

        self.with_conn(|conn| {
            // Upsert keeps the original rowid, so insertion order survives overwrites
            conn.execute(
                "INSERT INTO memory_entries (id, type, timestamp, content, tags, scope, agent_id, visibility, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                    type = excluded.type,
                    timestamp = excluded.timestamp,
                    content = excluded.content,
                    tags = excluded.tags,
                    scope = excluded.scope,
                    agent_id = excluded.agent_id,
                    visibility = excluded.visibility,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding",
                params![
                    &row.id,
                    &row.entry_type,
                    row.timestamp,
                    &row.content,
                    &row.tags,
                    &row.scope,
                    &row.agent_id,
                    &row.visibility,
                    &row.metadata,
                    &row.embedding,
                ],
            )
            .map_err(|e| self.storage_error(e))?;
            Ok(())
        })?;

        tracing::debug!(provider = %self.name, entry_id = %entry.id, "Stored durable entry");
        Ok(())
    }

    async fn query(&self, query: &MemoryQuery) -> MemoryResult<MemoryResults> {
        // Build SQL query based on filters
        let mut sql = String::from(
            "SELECT id, type, timestamp, content, tags, scope, agent_id, visibility, metadata, embedding
             FROM memory_entries WHERE 1=1",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref id) = query.id {
            sql.push_str(" AND id = ?");
            params_vec.push(Box::new(id.clone()));
        }

        if let Some(ref entry_type) = query.entry_type {
            sql.push_str(" AND type = ?");
            params_vec.push(Box::new(entry_type.clone()));
        }

        if let Some(ref agent_id) = query.agent_id {
            sql.push_str(" AND agent_id = ?");
            params_vec.push(Box::new(agent_id.clone()));
        }

        if let Some(scope) = query.scope {
            sql.push_str(" AND scope = ?");
            params_vec.push(Box::new(scope.as_str()));
        }

        if let Some(visibility) = query.visibility {
            sql.push_str(" AND visibility = ?");
            params_vec.push(Box::new(visibility.as_str()));
        }

        sql.push_str(" ORDER BY rowid ASC");

        // Tags live in a JSON column, so the tag filter and the limit run after decoding
        let rows: Vec<StoredRow> = self.with_conn(|conn| {
            let param_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn.prepare(&sql).map_err(|e| self.storage_error(e))?;
            let rows = stmt
                .query_map(param_refs.as_slice(), Self::map_row)
                .map_err(|e| self.storage_error(e))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| self.storage_error(e))
        })?;

        let limit = query.max_results.unwrap_or(usize::MAX);
        let mut entries = Vec::new();
        for row in rows {
            if entries.len() >= limit {
                break;
            }
            let entry = self.decode(row)?;
            if query.matches(&entry) {
                entries.push(entry);
            }
        }

        tracing::debug!(provider = %self.name, count = entries.len(), "Durable query complete");
        Ok(MemoryResults::new(entries))
    }

    async fn delete(&self, id: &str) -> MemoryResult<()> {
        let removed = self.with_conn(|conn| {
            conn.execute("DELETE FROM memory_entries WHERE id = ?1", params![id])
                .map_err(|e| self.storage_error(e))
        })?;

        if removed > 0 {
            tracing::debug!(provider = %self.name, entry_id = %id, "Deleted durable entry");
        }
        Ok(())
    }

    async fn close(&self) -> MemoryResult<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| self.storage_error("database lock poisoned"))?;

        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| self.storage_error(e))?;
            tracing::info!(provider = %self.name, "Closed durable memory store");
        }
        Ok(())
    }
}
