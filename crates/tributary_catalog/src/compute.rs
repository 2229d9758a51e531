//! Capability interface for the SQL compute engine.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// One result row, values in select-list order.
pub type Row = Vec<Value>;

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Statement failed: {statement}: {message}")]
    Statement { statement: String, message: String },

    #[error("Compute engine unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ComputeEngine: Send + Sync {
    /// Run `statement` with `database` selected and return every row.
    async fn execute(&self, database: &str, statement: &str) -> Result<Vec<Row>, ComputeError>;
}

/// Backtick-quote an identifier for the compute engine's SQL dialect.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("orders"), "`orders`");
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
    }
}
