//! In-process broker.
//!
//! One consumer per topic. Messages published before anyone subscribes are
//! held in a per-topic backlog and delivered, in order, to the first
//! subscriber. A broker built with [`InMemoryBroker::with_history`] also keeps
//! the most recent publishes for inspection.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{BrokerError, Result};
use crate::message::Message;
use crate::pubsub::{MessageStream, Publisher, Subscriber};

#[derive(Default)]
struct TopicState {
    consumer: Option<mpsc::UnboundedSender<Message>>,
    backlog: VecDeque<Message>,
}

#[derive(Default)]
struct Inner {
    topics: HashMap<String, TopicState>,
    history: VecDeque<(String, Message)>,
    history_limit: usize,
    closed: bool,
}

#[derive(Default)]
pub struct InMemoryBroker {
    inner: Mutex<Inner>,
}

impl InMemoryBroker {
    /// A broker that keeps no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker that remembers the last `limit` publishes across all topics.
    pub fn with_history(limit: usize) -> Self {
        let broker = Self::default();
        broker.inner().history_limit = limit;
        broker
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remembered messages published to `topic`, oldest first. Always empty
    /// without [`InMemoryBroker::with_history`].
    pub fn published(&self, topic: &str) -> Vec<Message> {
        self.inner()
            .history
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Messages waiting for a subscriber on `topic`.
    pub fn backlog_len(&self, topic: &str) -> usize {
        self.inner()
            .topics
            .get(topic)
            .map_or(0, |t| t.backlog.len())
    }

    /// End every open stream and reject further use.
    pub fn close(&self) {
        let mut inner = self.inner();
        inner.closed = true;
        for state in inner.topics.values_mut() {
            state.consumer = None;
        }
    }
}

#[async_trait]
impl Publisher for InMemoryBroker {
    async fn publish(&self, topic: &str, message: Message) -> Result<()> {
        let mut inner = self.inner();
        if inner.closed {
            return Err(BrokerError::Closed(topic.to_string()));
        }
        if inner.history_limit > 0 {
            if inner.history.len() == inner.history_limit {
                inner.history.pop_front();
            }
            inner.history.push_back((topic.to_string(), message.clone()));
        }

        let state = inner.topics.entry(topic.to_string()).or_default();
        if let Some(consumer) = &state.consumer {
            match consumer.send(message) {
                Ok(()) => {
                    trace!(topic, "Delivered message");
                    return Ok(());
                }
                Err(mpsc::error::SendError(message)) => {
                    // Consumer went away; keep the message for the next one.
                    state.consumer = None;
                    state.backlog.push_back(message);
                }
            }
        } else {
            state.backlog.push_back(message);
        }
        Ok(())
    }
}

#[async_trait]
impl Subscriber for InMemoryBroker {
    async fn subscribe(&self, topic: &str) -> Result<MessageStream> {
        let mut inner = self.inner();
        if inner.closed {
            return Err(BrokerError::Closed(topic.to_string()));
        }
        let state = inner.topics.entry(topic.to_string()).or_default();
        if state.consumer.as_ref().map_or(false, |c| !c.is_closed()) {
            return Err(BrokerError::AlreadySubscribed(topic.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        while let Some(message) = state.backlog.pop_front() {
            // The receiver is alive in this scope.
            let _ = tx.send(message);
        }
        state.consumer = Some(tx);
        Ok(rx)
    }
}
