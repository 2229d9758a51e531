use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::message::Message;

/// Messages delivered on one subscribed topic. Ends when the broker closes.
pub type MessageStream = mpsc::UnboundedReceiver<Message>;

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, message: Message) -> Result<()>;
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<MessageStream>;
}
