//! Topic router with retry and dead-letter handling.
//!
//! Every route subscribes one topic and hands each message to its handler.
//! An attempt is the handler call plus publishing whatever it returned to the
//! route's response topic. A failed attempt is retried up to
//! `max_retries` times with a fixed interval; after that the message is
//! republished verbatim to the dead-letter topic with `poison.*` metadata.
//!
//! Each route bounds its own concurrency with a semaphore, so a topic stuck
//! in retries never holds up another. Shutdown stops intake, wakes any
//! pending retry waits, and waits for in-flight deliveries.

use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::Result;
use crate::message::Message;
use crate::metrics::{RouterMetrics, RouterMetricsSnapshot};
use crate::pubsub::{MessageStream, Publisher, Subscriber};

/// Metadata key carrying the last handler error of a dead-lettered message.
pub const POISON_REASON_KEY: &str = "poison.reason";
/// Metadata key carrying the topic the message was consumed from.
pub const POISON_TOPIC_KEY: &str = "poison.topic";
/// Metadata key carrying the name of the handler that gave up.
pub const POISON_HANDLER_KEY: &str = "poison.handler";

const DEFAULT_DEAD_LETTER_TOPIC: &str = "dead-letter";

#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one message. Returned messages go to the route's response
    /// topic; an error makes the router retry the whole attempt.
    async fn handle(&self, message: &Message) -> anyhow::Result<Vec<Message>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Redeliveries after the first attempt.
    pub max_retries: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub retry: RetryPolicy,
    pub dead_letter_topic: String,
    /// Deliveries processed at once per route, retry waits included.
    pub max_in_flight: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            dead_letter_topic: DEFAULT_DEAD_LETTER_TOPIC.to_string(),
            max_in_flight: 4,
        }
    }
}

struct Route {
    name: String,
    subscribe_topic: String,
    publish_topic: Option<String>,
    handler: Arc<dyn MessageHandler>,
}

pub struct Router {
    config: RouterConfig,
    subscriber: Arc<dyn Subscriber>,
    publisher: Arc<dyn Publisher>,
    routes: Vec<Route>,
}

impl Router {
    pub fn new(
        config: RouterConfig,
        subscriber: Arc<dyn Subscriber>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            config,
            subscriber,
            publisher,
            routes: Vec::new(),
        }
    }

    /// Route `subscribe_topic` to `handler`, publishing its output to
    /// `publish_topic`.
    pub fn add_handler(
        &mut self,
        name: impl Into<String>,
        subscribe_topic: impl Into<String>,
        publish_topic: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> &mut Self {
        self.routes.push(Route {
            name: name.into(),
            subscribe_topic: subscribe_topic.into(),
            publish_topic: Some(publish_topic.into()),
            handler,
        });
        self
    }

    /// Route `subscribe_topic` to `handler`; its output is discarded.
    pub fn add_no_publisher_handler(
        &mut self,
        name: impl Into<String>,
        subscribe_topic: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> &mut Self {
        self.routes.push(Route {
            name: name.into(),
            subscribe_topic: subscribe_topic.into(),
            publish_topic: None,
            handler,
        });
        self
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Subscribe every route and start consuming.
    ///
    /// All subscriptions are made before any consumer runs, so a failure here
    /// leaves nothing running.
    pub async fn start(self) -> Result<RouterHandle> {
        let mut streams = Vec::with_capacity(self.routes.len());
        for route in &self.routes {
            streams.push(self.subscriber.subscribe(&route.subscribe_topic).await?);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = Arc::new(RouterMetrics::default());
        let shared = Arc::new(Shared {
            publisher: self.publisher,
            retry: self.config.retry,
            dead_letter_topic: self.config.dead_letter_topic,
            metrics: metrics.clone(),
        });

        let max_in_flight = self.config.max_in_flight.max(1);
        let mut consumers = Vec::with_capacity(self.routes.len());
        for (route, stream) in self.routes.into_iter().zip(streams) {
            info!(
                handler = %route.name,
                topic = %route.subscribe_topic,
                "Starting consumer"
            );
            consumers.push(tokio::spawn(consume(
                shared.clone(),
                Arc::new(route),
                stream,
                Arc::new(Semaphore::new(max_in_flight)),
                shutdown_rx.clone(),
            )));
        }

        Ok(RouterHandle {
            shutdown_tx,
            consumers,
            metrics,
        })
    }
}

/// Handle for a running router.
pub struct RouterHandle {
    shutdown_tx: watch::Sender<bool>,
    consumers: Vec<JoinHandle<()>>,
    metrics: Arc<RouterMetrics>,
}

impl RouterHandle {
    pub fn metrics(&self) -> RouterMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stop consuming and wait for in-flight deliveries to settle.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for consumer in self.consumers {
            if let Err(e) = consumer.await {
                warn!("Router consumer panicked during shutdown: {:?}", e);
            }
        }
        info!("Router stopped");
    }
}

struct Shared {
    publisher: Arc<dyn Publisher>,
    retry: RetryPolicy,
    dead_letter_topic: String,
    metrics: Arc<RouterMetrics>,
}

async fn consume(
    shared: Arc<Shared>,
    route: Arc<Route>,
    mut stream: MessageStream,
    permits: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut in_flight = JoinSet::new();

    loop {
        while in_flight.try_join_next().is_some() {}

        let message = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = stream.recv() => match next {
                Some(message) => message,
                None => {
                    debug!(topic = %route.subscribe_topic, "Stream closed");
                    break;
                }
            },
        };
        shared.metrics.inc_received();

        let permit = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                warn!(uuid = %message.uuid, topic = %route.subscribe_topic, "Shutdown before delivery");
                shared.metrics.inc_dropped();
                break;
            }
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let span = info_span!(
            "router.deliver",
            handler = %route.name,
            topic = %route.subscribe_topic,
            uuid = %message.uuid,
        );
        let shared = shared.clone();
        let route = route.clone();
        let shutdown = shutdown.clone();
        in_flight.spawn(
            async move {
                deliver(&shared, &route, message, shutdown).await;
                drop(permit);
            }
            .instrument(span),
        );
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!(handler = %route.name, "Delivery task panicked: {:?}", e);
        }
    }
}

async fn deliver(
    shared: &Shared,
    route: &Route,
    message: Message,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    let reason = loop {
        match try_once(shared, route, &message).await {
            Ok(published) => {
                shared.metrics.inc_handled();
                shared.metrics.add_published(published as u64);
                debug!(attempt, published, "Message handled");
                return;
            }
            Err(e) if attempt < shared.retry.max_retries => {
                attempt += 1;
                shared.metrics.inc_retries();
                warn!(
                    attempt,
                    max_retries = shared.retry.max_retries,
                    "Handler failed, retrying in {:?}: {:#}",
                    shared.retry.interval,
                    e
                );
                if *shutdown.borrow() {
                    shared.metrics.inc_dropped();
                    return;
                }
                tokio::select! {
                    _ = tokio::time::sleep(shared.retry.interval) => {}
                    _ = shutdown.changed() => {
                        warn!("Shutdown while waiting to retry; message dropped");
                        shared.metrics.inc_dropped();
                        return;
                    }
                }
            }
            Err(e) => break format!("{:#}", e),
        }
    };

    if route.subscribe_topic == shared.dead_letter_topic {
        error!(reason = %reason, "Dead-letter handler gave up; message dropped");
        shared.metrics.inc_dropped();
        return;
    }

    let poisoned = message
        .with_metadata(POISON_REASON_KEY, reason.clone())
        .with_metadata(POISON_TOPIC_KEY, route.subscribe_topic.clone())
        .with_metadata(POISON_HANDLER_KEY, route.name.clone());
    match shared
        .publisher
        .publish(&shared.dead_letter_topic, poisoned)
        .await
    {
        Ok(()) => {
            shared.metrics.inc_dead_lettered();
            error!(
                dead_letter_topic = %shared.dead_letter_topic,
                reason = %reason,
                "Retries exhausted, message dead-lettered"
            );
        }
        Err(e) => {
            shared.metrics.inc_dropped();
            error!(reason = %reason, "Failed to dead-letter message: {}", e);
        }
    }
}

/// One attempt: run the handler, then publish its output.
async fn try_once(shared: &Shared, route: &Route, message: &Message) -> anyhow::Result<usize> {
    let outputs = route.handler.handle(message).await?;
    let count = outputs.len();
    match &route.publish_topic {
        Some(topic) => {
            for output in outputs {
                shared
                    .publisher
                    .publish(topic, output)
                    .await
                    .with_context(|| format!("Failed to publish response to {}", topic))?;
            }
            Ok(count)
        }
        None => {
            if count > 0 {
                debug!(count, "Discarding output of handler without publisher");
            }
            Ok(0)
        }
    }
}
