//! Broker handlers for the asynchronous operations.
//!
//! One handler per operation kind plus the dead-letter handler. A ticketed
//! handler decodes the request, runs the worker side of the operation, and
//! answers on the kind's response topic with the ticket's record under the
//! same uuid. Capability failures end up in the record; anything returned as
//! an error here is retried by the router and eventually dead-lettered.

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tributary_broker::{Message, MessageHandler, Router, POISON_REASON_KEY, POISON_TOPIC_KEY};
use tributary_protocol::{
    CreateConnectorRequest, CreateConnectorStatus, CreateSourceRequest, CreateSourceStatus,
    DiscoverTablesRequest, GetSourceTablesStatus, OperationKind, Source, StatusRecord,
    SyncNotification, TicketId, UpdateSourceStatus,
};

use crate::coordinator::Coordinator;
use crate::service::IngestionService;

/// Register one handler per operation kind and the dead-letter handler.
pub fn register_handlers(router: &mut Router, service: Arc<IngestionService>, dead_letter_topic: &str) {
    for kind in OperationKind::ALL {
        router.add_handler(
            handler_name(kind),
            kind.request_topic(),
            kind.response_topic(),
            Arc::new(OperationHandler::new(kind, service.clone())),
        );
    }
    router.add_no_publisher_handler(
        "dead_letter",
        dead_letter_topic,
        Arc::new(DeadLetterHandler::new(service.coordinator().clone())),
    );
}

pub fn handler_name(kind: OperationKind) -> String {
    format!("{}_handler", kind)
}

fn decode<T: DeserializeOwned>(message: &Message, kind: OperationKind) -> anyhow::Result<T> {
    message
        .decode()
        .with_context(|| format!("Undecodable {} request {}", kind, message.uuid))
}

fn ticket_of(message: &Message) -> anyhow::Result<TicketId> {
    TicketId::parse(&message.uuid)
        .with_context(|| format!("Message uuid {:?} is not a ticket id", message.uuid))
}

pub struct OperationHandler {
    kind: OperationKind,
    service: Arc<IngestionService>,
}

impl OperationHandler {
    pub fn new(kind: OperationKind, service: Arc<IngestionService>) -> Self {
        Self { kind, service }
    }

    /// The kept record of a ticket that is already terminal.
    ///
    /// Redelivered requests must not run twice or move a ticket out of its
    /// terminal state.
    async fn kept<R: StatusRecord>(&self, ticket: &TicketId) -> anyhow::Result<Option<R>> {
        let coordinator = self.service.coordinator();
        match coordinator.status(ticket).await? {
            Some(status) if status.is_terminal() => {
                debug!(ticket_id = %ticket, status = %status, "Ticket already terminal, replaying record");
                Ok(Some(coordinator.poll::<R>(ticket).await?))
            }
            _ => Ok(None),
        }
    }

    async fn run_ticketed(&self, message: &Message) -> anyhow::Result<Vec<u8>> {
        let ticket = ticket_of(message)?;
        let service = &self.service;
        let payload = match self.kind {
            OperationKind::CreateSource => {
                let record = match self.kept::<CreateSourceStatus>(&ticket).await? {
                    Some(kept) => kept,
                    None => {
                        let request: CreateSourceRequest = decode(message, self.kind)?;
                        service.create_source_from_definition(&ticket, &request).await?
                    }
                };
                serde_json::to_vec(&record)?
            }
            OperationKind::UpdateSource => {
                let record = match self.kept::<UpdateSourceStatus>(&ticket).await? {
                    Some(kept) => kept,
                    None => {
                        let source: Source = decode(message, self.kind)?;
                        service.update_source(&ticket, &source).await?
                    }
                };
                serde_json::to_vec(&record)?
            }
            OperationKind::DiscoverTables => {
                let record = match self.kept::<GetSourceTablesStatus>(&ticket).await? {
                    Some(kept) => kept,
                    None => {
                        let request: DiscoverTablesRequest = decode(message, self.kind)?;
                        service.discover_tables(&ticket, &request).await?
                    }
                };
                serde_json::to_vec(&record)?
            }
            OperationKind::CreateConnector => {
                let record = match self.kept::<CreateConnectorStatus>(&ticket).await? {
                    Some(kept) => kept,
                    None => {
                        let request: CreateConnectorRequest = decode(message, self.kind)?;
                        service.create_connector(&ticket, &request).await?
                    }
                };
                serde_json::to_vec(&record)?
            }
            OperationKind::SyncNotification => {
                anyhow::bail!("{} is not a ticketed operation", self.kind)
            }
        };
        Ok(payload)
    }
}

#[async_trait]
impl MessageHandler for OperationHandler {
    async fn handle(&self, message: &Message) -> anyhow::Result<Vec<Message>> {
        if !self.kind.is_ticketed() {
            // Nothing tracks a notification, so every failure goes back to
            // the router for another attempt.
            let notification: SyncNotification = decode(message, self.kind)?;
            self.service.trigger_profiling(&notification).await?;
            return Ok(Vec::new());
        }

        let payload = self.run_ticketed(message).await?;
        info!(ticket_id = %message.uuid, kind = %self.kind, "Processed request");
        Ok(vec![Message::new(message.uuid.clone(), payload)])
    }
}

/// Fails the ticket of every dead-lettered request so pollers stop waiting.
pub struct DeadLetterHandler {
    coordinator: Coordinator,
}

impl DeadLetterHandler {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl MessageHandler for DeadLetterHandler {
    async fn handle(&self, message: &Message) -> anyhow::Result<Vec<Message>> {
        let topic = message
            .metadata
            .get(POISON_TOPIC_KEY)
            .map(String::as_str)
            .unwrap_or("unknown topic");
        let reason = message
            .metadata
            .get(POISON_REASON_KEY)
            .map(String::as_str)
            .unwrap_or("unknown reason");

        let ticketed = OperationKind::from_request_topic(topic).map_or(false, |k| k.is_ticketed());
        if !ticketed {
            warn!(uuid = %message.uuid, topic, reason, "Dead-lettered message has no ticket");
            return Ok(Vec::new());
        }
        let Ok(ticket) = TicketId::parse(&message.uuid) else {
            warn!(uuid = %message.uuid, topic, "Dead-lettered message uuid is not a ticket id");
            return Ok(Vec::new());
        };

        let error = format!("Processing of {} gave up after retries: {}", topic, reason);
        if self.coordinator.fail_ticket(&ticket, &error).await? {
            warn!(ticket_id = %ticket, topic, "Failed dead-lettered ticket");
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tributary_broker::InMemoryBroker;
    use tributary_protocol::topics::{CREATE_SOURCE_REQUESTS, SYNC_NOTIFICATION_REQUESTS};
    use tributary_protocol::OperationStatus;
    use tributary_status_store::InMemoryStatusStore;

    fn coordinator() -> Coordinator {
        Coordinator::new(
            Arc::new(InMemoryStatusStore::new()),
            Arc::new(InMemoryBroker::new()),
        )
    }

    fn poisoned(uuid: &str, topic: &str) -> Message {
        Message::new(uuid, b"{}".to_vec())
            .with_metadata(POISON_TOPIC_KEY, topic)
            .with_metadata(POISON_REASON_KEY, "boom")
    }

    #[test]
    fn test_handler_names() {
        assert_eq!(
            handler_name(OperationKind::CreateSource),
            "create_source_handler"
        );
        assert_eq!(
            handler_name(OperationKind::SyncNotification),
            "sync_notification_handler"
        );
    }

    #[tokio::test]
    async fn test_dead_letter_fails_pending_ticket() {
        let coordinator = coordinator();
        let ticket = coordinator
            .submit::<CreateSourceStatus, _>(OperationKind::CreateSource, &json!({}))
            .await
            .unwrap();
        let handler = DeadLetterHandler::new(coordinator.clone());

        let out = handler
            .handle(&poisoned(ticket.as_str(), CREATE_SOURCE_REQUESTS))
            .await
            .unwrap();
        assert!(out.is_empty());

        let record: CreateSourceStatus = coordinator.poll(&ticket).await.unwrap();
        assert_eq!(record.status, OperationStatus::Failed);
        assert_eq!(
            record.error.as_deref(),
            Some("Processing of create-source-requests gave up after retries: boom")
        );
    }

    #[tokio::test]
    async fn test_dead_letter_ignores_untracked_messages() {
        let coordinator = coordinator();
        let handler = DeadLetterHandler::new(coordinator.clone());
        let ticket = TicketId::new();

        handler
            .handle(&poisoned(ticket.as_str(), SYNC_NOTIFICATION_REQUESTS))
            .await
            .unwrap();
        handler
            .handle(&poisoned("not-a-ticket", CREATE_SOURCE_REQUESTS))
            .await
            .unwrap();
        handler
            .handle(&poisoned(ticket.as_str(), CREATE_SOURCE_REQUESTS))
            .await
            .unwrap();

        assert_eq!(coordinator.status(&ticket).await.unwrap(), None);
    }
}
