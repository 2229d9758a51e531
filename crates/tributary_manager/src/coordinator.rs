//! Ticketed asynchronous operations.
//!
//! `submit` records a pending ticket and enqueues the request; workers later
//! write the terminal record through `finish`; callers read it with `poll`.
//! The ticket id is also the broker message uuid, so a worker (or the
//! dead-letter handler) always knows which ticket a message belongs to.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use tributary_broker::{BrokerError, Message, Publisher};
use tributary_protocol::{status_of, OperationKind, OperationStatus, StatusRecord, TicketId};
use tributary_status_store::{StatusStore, StoreError};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Never written, or already purged by retention.
    #[error("Ticket not found: {0}")]
    TicketNotFound(TicketId),

    #[error("{0} operations are not tracked by tickets")]
    Untracked(OperationKind),

    #[error("Failed to publish {kind} request: {source}")]
    Publish {
        kind: OperationKind,
        #[source]
        source: BrokerError,
    },

    #[error("Status record for ticket {ticket} is invalid: {source}")]
    Record {
        ticket: TicketId,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode {0} request: {1}")]
    Encode(OperationKind, #[source] serde_json::Error),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for CoordinatorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(ticket) => CoordinatorError::TicketNotFound(ticket),
            other => CoordinatorError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn StatusStore>,
    publisher: Arc<dyn Publisher>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn StatusStore>, publisher: Arc<dyn Publisher>) -> Self {
        Self { store, publisher }
    }

    pub fn store(&self) -> &Arc<dyn StatusStore> {
        &self.store
    }

    /// Start a ticketed operation and return its ticket.
    ///
    /// The pending record is written before the request is published, so a
    /// fast worker can never have its terminal record overwritten by it. If
    /// publishing fails the ticket is marked failed and the error returned.
    pub async fn submit<R, P>(&self, kind: OperationKind, payload: &P) -> Result<TicketId>
    where
        R: StatusRecord,
        P: Serialize,
    {
        if !kind.is_ticketed() {
            return Err(CoordinatorError::Untracked(kind));
        }
        let ticket = TicketId::new();
        let message = Message::json(ticket.as_str(), payload).map_err(|e| match e {
            BrokerError::Encode(source) => CoordinatorError::Encode(kind, source),
            other => CoordinatorError::Publish {
                kind,
                source: other,
            },
        })?;

        self.write(&ticket, &R::pending()).await?;

        if let Err(source) = self.publisher.publish(kind.request_topic(), message).await {
            warn!(ticket_id = %ticket, kind = %kind, "Publish failed, failing ticket: {}", source);
            self.write(&ticket, &R::failed(source.to_string())).await?;
            return Err(CoordinatorError::Publish { kind, source });
        }

        info!(ticket_id = %ticket, kind = %kind, topic = kind.request_topic(), "Submitted operation");
        Ok(ticket)
    }

    /// Publish a fire-and-forget request. Returns the message uuid.
    pub async fn notify<P>(&self, kind: OperationKind, payload: &P) -> Result<String>
    where
        P: Serialize,
    {
        let uuid = TicketId::new().to_string();
        let message = Message::json(uuid.clone(), payload).map_err(|e| match e {
            BrokerError::Encode(source) => CoordinatorError::Encode(kind, source),
            other => CoordinatorError::Publish {
                kind,
                source: other,
            },
        })?;
        self.publisher
            .publish(kind.request_topic(), message)
            .await
            .map_err(|source| CoordinatorError::Publish { kind, source })?;
        debug!(uuid = %uuid, kind = %kind, "Published notification");
        Ok(uuid)
    }

    /// Read the current record of a ticket. Never invents a default.
    pub async fn poll<R: StatusRecord>(&self, ticket: &TicketId) -> Result<R> {
        let value = self.store.get(ticket).await?;
        serde_json::from_value(value).map_err(|source| CoordinatorError::Record {
            ticket: ticket.clone(),
            source,
        })
    }

    /// Status of a ticket, or `None` if it is unknown.
    pub async fn status(&self, ticket: &TicketId) -> Result<Option<OperationStatus>> {
        match self.store.get(ticket).await {
            Ok(value) => Ok(status_of(&value)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the terminal record of a ticket.
    ///
    /// A ticket that is already terminal keeps its record; returns whether
    /// the write happened.
    pub async fn finish<R: StatusRecord>(&self, ticket: &TicketId, record: &R) -> Result<bool> {
        if let Some(current) = self.status(ticket).await? {
            if current.is_terminal() {
                debug!(ticket_id = %ticket, status = %current, "Ticket already terminal, keeping it");
                return Ok(false);
            }
        }
        self.write(ticket, record).await?;
        info!(ticket_id = %ticket, status = %record.status(), "Ticket finished");
        Ok(true)
    }

    /// Record progress on a ticket that is not terminal yet.
    ///
    /// `record` should still report `Pending`; returns whether the write
    /// happened.
    pub async fn checkpoint<R: StatusRecord>(&self, ticket: &TicketId, record: &R) -> Result<bool> {
        if let Some(current) = self.status(ticket).await? {
            if current.is_terminal() {
                return Ok(false);
            }
        }
        self.write(ticket, record).await?;
        debug!(ticket_id = %ticket, "Ticket checkpointed");
        Ok(true)
    }

    /// Flip a pending ticket to failed, keeping whatever else it recorded.
    ///
    /// Unknown and terminal tickets are left alone; returns whether the
    /// ticket was flipped.
    pub async fn fail_ticket(&self, ticket: &TicketId, error: &str) -> Result<bool> {
        let mut value = match self.store.get(ticket).await {
            Ok(value) => value,
            Err(StoreError::NotFound(_)) => {
                debug!(ticket_id = %ticket, "No ticket to fail");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        if status_of(&value) != Some(OperationStatus::Pending) {
            return Ok(false);
        }
        let Some(fields) = value.as_object_mut() else {
            return Ok(false);
        };
        fields.insert(
            "status".to_string(),
            Value::String(OperationStatus::Failed.as_str().to_string()),
        );
        fields.insert("error".to_string(), Value::String(error.to_string()));
        self.store.set(ticket, value).await?;
        warn!(ticket_id = %ticket, error, "Ticket failed");
        Ok(true)
    }

    async fn write<R: StatusRecord>(&self, ticket: &TicketId, record: &R) -> Result<()> {
        let value = serde_json::to_value(record).map_err(|source| CoordinatorError::Record {
            ticket: ticket.clone(),
            source,
        })?;
        self.store.set(ticket, value).await?;
        Ok(())
    }
}
