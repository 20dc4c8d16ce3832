//! Durable local persistence for Link records.
//!
//! A keyed sqlite CRUD store. Every successful mutation emits a
//! [`StoreEvent`] on a broadcast channel so the sync layer can trigger a
//! snapshot refresh without the write path and the listener path ever
//! sharing a code path (the write path refreshes directly).

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;
use tokio::sync::broadcast;

use ldk_core::link::{Link, LinkPatch};

pub const LINKS_SCHEMA_VERSION: i64 = 1;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("timestamp parse error: {0}")]
    Timestamp(String),
    #[error("link not found: {0}")]
    NotFound(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

/// Mutation notification carrying the id of the affected link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Created(String),
    Updated(String),
    Removed(String),
}

pub struct LinkStore {
    conn: Connection,
    events: broadcast::Sender<StoreEvent>,
}

impl LinkStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let store = Self { conn, events };
        store.migrate()?;
        Ok(store)
    }

    /// Receiver for mutation events. Subscribers that lag past the channel
    /// capacity miss events; the consumer treats a lag as a refresh trigger
    /// anyway, so nothing is lost beyond coalescing.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > LINKS_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: LINKS_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_links.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
        }

        Ok(())
    }

    pub fn insert_link(&self, link: &Link) -> Result<(), StorageError> {
        let metadata_json = serde_json::to_string(&link.metadata)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let labels_json = serde_json::to_string(&link.labels)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        self.conn.execute(
            "
            INSERT INTO links (
                id, url, metadata_json, labels_json,
                priority, status, created_at, updated_at, board_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
            params![
                link.id,
                link.url,
                metadata_json,
                labels_json,
                link.priority.as_str(),
                link.status.as_str(),
                link.created_at.to_rfc3339(),
                link.updated_at.to_rfc3339(),
                link.board_id,
            ],
        )?;

        let _ = self.events.send(StoreEvent::Created(link.id.clone()));
        Ok(())
    }

    pub fn get_link(&self, id: &str) -> Result<Option<Link>, StorageError> {
        let row = self
            .conn
            .query_row(
                "
                SELECT id, url, metadata_json, labels_json,
                       priority, status, created_at, updated_at, board_id
                FROM links WHERE id = ?1
                ",
                params![id],
                row_to_link,
            )
            .optional()?;
        row.transpose()
    }

    /// Shallow top-level merge: only fields present in the patch change,
    /// `metadata` is replaced wholesale when supplied, `created_at` never
    /// changes, and `updated_at` is re-stamped on every write.
    pub fn update_link(&self, id: &str, patch: &LinkPatch) -> Result<Link, StorageError> {
        let mut link = self
            .get_link(id)?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        if let Some(url) = &patch.url {
            link.url = url.clone();
        }
        if let Some(metadata) = &patch.metadata {
            link.metadata = metadata.clone();
        }
        if let Some(labels) = &patch.labels {
            link.labels = labels.clone();
        }
        if let Some(priority) = patch.priority {
            link.priority = priority;
        }
        if let Some(status) = patch.status {
            link.status = status;
        }
        if let Some(board_id) = &patch.board_id {
            link.board_id = Some(board_id.clone());
        }
        link.updated_at = Utc::now();

        let metadata_json = serde_json::to_string(&link.metadata)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let labels_json = serde_json::to_string(&link.labels)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        self.conn.execute(
            "
            UPDATE links SET
                url = ?2,
                metadata_json = ?3,
                labels_json = ?4,
                priority = ?5,
                status = ?6,
                updated_at = ?7,
                board_id = ?8
            WHERE id = ?1
            ",
            params![
                link.id,
                link.url,
                metadata_json,
                labels_json,
                link.priority.as_str(),
                link.status.as_str(),
                link.updated_at.to_rfc3339(),
                link.board_id,
            ],
        )?;

        let _ = self.events.send(StoreEvent::Updated(link.id.clone()));
        Ok(link)
    }

    pub fn delete_link(&self, id: &str) -> Result<(), StorageError> {
        let changes = self
            .conn
            .execute("DELETE FROM links WHERE id = ?1", params![id])?;
        if changes == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        let _ = self.events.send(StoreEvent::Removed(id.to_string()));
        Ok(())
    }

    pub fn list_links(&self) -> Result<Vec<Link>, StorageError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, url, metadata_json, labels_json,
                   priority, status, created_at, updated_at, board_id
            FROM links ORDER BY created_at ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map([], row_to_link)?;
        let mut links = Vec::new();
        for row in rows {
            links.push(row??);
        }
        Ok(links)
    }

    pub fn count_links(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM links", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

type LinkRowResult = Result<Link, StorageError>;

fn row_to_link(row: &rusqlite::Row<'_>) -> rusqlite::Result<LinkRowResult> {
    let id: String = row.get(0)?;
    let url: String = row.get(1)?;
    let metadata_json: String = row.get(2)?;
    let labels_json: String = row.get(3)?;
    let priority: String = row.get(4)?;
    let status: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    let board_id: Option<String> = row.get(8)?;

    Ok(build_link(
        id,
        url,
        metadata_json,
        labels_json,
        priority,
        status,
        created_at,
        updated_at,
        board_id,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_link(
    id: String,
    url: String,
    metadata_json: String,
    labels_json: String,
    priority: String,
    status: String,
    created_at: String,
    updated_at: String,
    board_id: Option<String>,
) -> LinkRowResult {
    Ok(Link {
        id,
        url,
        metadata: serde_json::from_str(&metadata_json)
            .map_err(|err| StorageError::Serialization(err.to_string()))?,
        labels: serde_json::from_str(&labels_json)
            .map_err(|err| StorageError::Serialization(err.to_string()))?,
        priority: priority
            .parse()
            .map_err(StorageError::Serialization)?,
        status: status.parse().map_err(StorageError::Serialization)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        board_id,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| StorageError::Timestamp(format!("{raw}: {err}")))
}
