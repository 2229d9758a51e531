use thiserror::Error;
use tributary_protocol::TicketId;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The ticket was never written (or has been purged).
    #[error("Ticket not found: {0}")]
    NotFound(TicketId),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid status store URL: {0}")]
    InvalidUrl(String),

    #[error("Corrupt status record for {ticket}: {message}")]
    Corrupt { ticket: String, message: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
