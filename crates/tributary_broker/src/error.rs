use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker closed, cannot use topic {0}")]
    Closed(String),

    #[error("Topic {0} already has a subscriber")]
    AlreadySubscribed(String),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Publish to {topic} failed: {message}")]
    Publish { topic: String, message: String },
}
