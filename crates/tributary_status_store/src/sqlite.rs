//! SQLite-backed status store.
//!
//! Survives restarts of the manager and lets several worker processes on one
//! host share ticket state.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};
use tributary_protocol::TicketId;

use crate::error::{Result, StoreError};
use crate::store::{is_terminal, StatusStore};

const MAX_CONNECTIONS: u32 = 4;

/// Fixed-width UTC timestamps so `updated_at` compares correctly as text.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub struct SqliteStatusStore {
    pool: Pool<Sqlite>,
}

impl SqliteStatusStore {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init().await?;
        info!(path = %path.display(), "Opened sqlite status store");
        Ok(store)
    }

    /// Private in-memory database, for tests and single-process setups.
    pub async fn in_memory() -> Result<Self> {
        // One connection: every connection to `:memory:` is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ticket_status (
                ticket_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                terminal INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_ticket_status_terminal ON ticket_status (terminal, updated_at)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StatusStore for SqliteStatusStore {
    async fn get(&self, ticket: &TicketId) -> Result<Value> {
        let payload: Option<String> =
            sqlx::query_scalar("SELECT payload FROM ticket_status WHERE ticket_id = ?")
                .bind(ticket.as_str())
                .fetch_optional(&self.pool)
                .await?;

        let Some(payload) = payload else {
            return Err(StoreError::NotFound(ticket.clone()));
        };
        serde_json::from_str(&payload).map_err(|e| StoreError::Corrupt {
            ticket: ticket.to_string(),
            message: e.to_string(),
        })
    }

    async fn set(&self, ticket: &TicketId, value: Value) -> Result<()> {
        let payload = serde_json::to_string(&value)?;
        sqlx::query(
            r#"
            INSERT INTO ticket_status (ticket_id, payload, terminal, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(ticket_id) DO UPDATE SET
                payload = excluded.payload,
                terminal = excluded.terminal,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(ticket.as_str())
        .bind(&payload)
        .bind(is_terminal(&value))
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge_terminal(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let removed = sqlx::query("DELETE FROM ticket_status WHERE terminal = 1 AND updated_at < ?")
            .bind(timestamp(cutoff))
            .execute(&self.pool)
            .await?
            .rows_affected();
        debug!(removed, "Purged terminal tickets");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_unknown_ticket_is_not_found() {
        let store = SqliteStatusStore::in_memory().await.unwrap();
        let err = store.get(&TicketId::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_set_then_overwrite() {
        let store = SqliteStatusStore::in_memory().await.unwrap();
        let ticket = TicketId::new();
        store
            .set(&ticket, json!({"tables": [], "status": "pending"}))
            .await
            .unwrap();
        store
            .set(&ticket, json!({"tables": [], "status": "failed", "error": "boom"}))
            .await
            .unwrap();

        let value = store.get(&ticket).await.unwrap();
        assert_eq!(value["status"], json!("failed"));
        assert_eq!(value["error"], json!("boom"));
    }

    #[tokio::test]
    async fn test_purge_only_terminal() {
        let store = SqliteStatusStore::in_memory().await.unwrap();
        let pending = TicketId::new();
        let finished = TicketId::new();
        store.set(&pending, json!({"status": "pending"})).await.unwrap();
        store.set(&finished, json!({"status": "finished"})).await.unwrap();

        assert_eq!(
            store.purge_terminal(Utc::now() - Duration::hours(24)).await.unwrap(),
            0
        );
        assert_eq!(
            store.purge_terminal(Utc::now() + Duration::seconds(1)).await.unwrap(),
            1
        );
        assert!(store.get(&pending).await.is_ok());
        assert!(store.get(&finished).await.is_err());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.sqlite");
        let ticket = TicketId::new();

        {
            let store = SqliteStatusStore::open(&path).await.unwrap();
            store.set(&ticket, json!({"status": "pending"})).await.unwrap();
            store.pool.close().await;
        }

        let store = SqliteStatusStore::open(&path).await.unwrap();
        assert_eq!(store.get(&ticket).await.unwrap(), json!({"status": "pending"}));
    }
}
