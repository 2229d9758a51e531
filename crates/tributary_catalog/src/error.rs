use thiserror::Error;

use crate::compute::ComputeError;
use crate::metastore::MetastoreError;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Connector without destination configuration")]
    NoDestination,

    #[error("Destination configuration is missing {key}")]
    MissingDestination { key: &'static str },

    #[error(transparent)]
    Metastore(#[from] MetastoreError),

    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error("Statistics for {table}.{column} unavailable: {message}")]
    Statistics {
        table: String,
        column: String,
        message: String,
    },

    #[error("Failed to encode column statistics: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
