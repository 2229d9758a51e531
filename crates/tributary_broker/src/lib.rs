//! Message broker plumbing for Tributary.
//!
//! - [`Publisher`] / [`Subscriber`]: the broker capability
//! - [`InMemoryBroker`]: in-process broker for single-process deployments
//!   and tests
//! - [`Router`]: binds handlers to topics and applies the retry and
//!   dead-letter policy uniformly

mod error;
mod memory;
mod message;
mod metrics;
mod pubsub;
mod router;

pub use error::{BrokerError, Result};
pub use memory::InMemoryBroker;
pub use message::{Message, Metadata};
pub use metrics::{RouterMetrics, RouterMetricsSnapshot};
pub use pubsub::{MessageStream, Publisher, Subscriber};
pub use router::{
    MessageHandler, RetryPolicy, Router, RouterConfig, RouterHandle, POISON_HANDLER_KEY,
    POISON_REASON_KEY, POISON_TOPIC_KEY,
};
