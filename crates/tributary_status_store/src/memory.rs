use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tributary_protocol::TicketId;

use crate::error::{Result, StoreError};
use crate::store::{is_terminal, StatusStore};

struct Entry {
    value: Value,
    terminal: bool,
    updated_at: DateTime<Utc>,
}

/// Process-local status store.
#[derive(Default)]
pub struct InMemoryStatusStore {
    entries: RwLock<HashMap<TicketId, Entry>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn get(&self, ticket: &TicketId) -> Result<Value> {
        self.entries
            .read()
            .await
            .get(ticket)
            .map(|e| e.value.clone())
            .ok_or_else(|| StoreError::NotFound(ticket.clone()))
    }

    async fn set(&self, ticket: &TicketId, value: Value) -> Result<()> {
        let entry = Entry {
            terminal: is_terminal(&value),
            value,
            updated_at: Utc::now(),
        };
        self.entries.write().await.insert(ticket.clone(), entry);
        Ok(())
    }

    async fn purge_terminal(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !(e.terminal && e.updated_at < cutoff));
        Ok((before - entries.len()) as u64)
    }
}
