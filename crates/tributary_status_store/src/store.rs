use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tributary_protocol::defaults::DEFAULT_TICKET_TTL_HOURS;
use tributary_protocol::{status_of, TicketId};

use crate::error::{Result, StoreError};
use crate::memory::InMemoryStatusStore;
use crate::sqlite::SqliteStatusStore;

#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Last value written for `ticket`; [`StoreError::NotFound`] if none.
    async fn get(&self, ticket: &TicketId) -> Result<Value>;

    /// Overwrite the value for `ticket`.
    async fn set(&self, ticket: &TicketId, value: Value) -> Result<()>;

    /// Remove tickets in a terminal state last written before `cutoff`.
    /// Pending tickets are never removed. Returns how many were removed.
    async fn purge_terminal(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// True when the stored payload carries a terminal status.
pub(crate) fn is_terminal(value: &Value) -> bool {
    status_of(value).map_or(false, |s| s.is_terminal())
}

/// How long terminal tickets stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub ttl: Duration,
}

impl RetentionPolicy {
    /// `None` when `hours` does not fit a duration.
    pub fn hours(hours: i64) -> Option<Self> {
        Duration::try_hours(hours).map(|ttl| Self { ttl })
    }

    /// Tickets last written before this instant have expired. `None` when the
    /// ttl reaches back past the earliest representable time, so nothing has.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_sub_signed(self.ttl)
    }

    pub async fn apply(&self, store: &dyn StatusStore) -> Result<u64> {
        match self.cutoff(Utc::now()) {
            Some(cutoff) => store.purge_terminal(cutoff).await,
            None => Ok(0),
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(DEFAULT_TICKET_TTL_HOURS),
        }
    }
}

/// Parsed status store URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusStoreUrl {
    /// `memory:`; process-local, lost on restart.
    Memory,
    /// `sqlite:<path>`
    Sqlite(PathBuf),
}

impl StatusStoreUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw == "memory:" {
            return Ok(Self::Memory);
        }
        if let Some(rest) = raw.strip_prefix("sqlite:") {
            let path = rest.trim_start_matches("//").trim();
            if path.is_empty() {
                return Err(StoreError::InvalidUrl(format!("sqlite URL missing path: {raw}")));
            }
            return Ok(Self::Sqlite(PathBuf::from(path)));
        }
        Err(StoreError::InvalidUrl(format!("Unsupported status store URL: {raw}")))
    }
}

impl StatusStoreUrl {
    pub async fn open(&self) -> Result<Arc<dyn StatusStore>> {
        match self {
            StatusStoreUrl::Memory => Ok(Arc::new(InMemoryStatusStore::new())),
            StatusStoreUrl::Sqlite(path) => Ok(Arc::new(SqliteStatusStore::open(path).await?)),
        }
    }
}

impl std::fmt::Display for StatusStoreUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusStoreUrl::Memory => f.write_str("memory:"),
            StatusStoreUrl::Sqlite(path) => write!(f, "sqlite:{}", path.display()),
        }
    }
}

/// Open the store a URL points at.
pub async fn open_status_store(raw: &str) -> Result<Arc<dyn StatusStore>> {
    StatusStoreUrl::parse(raw)?.open().await
}
