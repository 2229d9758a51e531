//! Capability interface for the catalog metastore.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: String,
    /// Catalog type string, e.g. `bigint` or `struct<a:string>`.
    pub data_type: String,
    pub comment: Option<String>,
}

impl CatalogColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Input/output format and serde of a table's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageFormat {
    pub input_format: String,
    pub output_format: String,
    pub serde_library: String,
}

impl StorageFormat {
    pub fn parquet() -> Self {
        Self {
            input_format: "org.apache.hadoop.hive.ql.io.parquet.MapredParquetInputFormat".into(),
            output_format: "org.apache.hadoop.hive.ql.io.parquet.MapredParquetOutputFormat".into(),
            serde_library: "org.apache.hadoop.hive.ql.io.parquet.serde.ParquetHiveSerDe".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Files are owned by the extraction platform; dropping the table
    /// leaves them in place.
    External,
    Managed,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::External => "EXTERNAL_TABLE",
            TableKind::Managed => "MANAGED_TABLE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogDatabase {
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTable {
    pub database: String,
    pub name: String,
    pub owner: String,
    pub location: String,
    pub columns: Vec<CatalogColumn>,
    pub partition_keys: Vec<CatalogColumn>,
    pub storage: StorageFormat,
    pub kind: TableKind,
    pub parameters: BTreeMap<String, String>,
}

impl CatalogTable {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[derive(Debug, Error)]
pub enum MetastoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Metastore unavailable: {0}")]
    Unavailable(String),

    #[error("Metastore operation failed due: {0}")]
    Rejected(String),
}

impl MetastoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MetastoreError::NotFound(_))
    }
}

#[async_trait]
pub trait Metastore: Send + Sync {
    async fn create_database(&self, database: &CatalogDatabase) -> Result<(), MetastoreError>;
    /// Drop a database. `cascade` drops its tables, `delete_data` their files.
    async fn drop_database(
        &self,
        name: &str,
        delete_data: bool,
        cascade: bool,
    ) -> Result<(), MetastoreError>;
    async fn get_table(&self, database: &str, name: &str) -> Result<CatalogTable, MetastoreError>;
    async fn create_table(&self, table: &CatalogTable) -> Result<(), MetastoreError>;
    async fn alter_table(
        &self,
        database: &str,
        name: &str,
        table: &CatalogTable,
    ) -> Result<(), MetastoreError>;
    async fn drop_table(
        &self,
        database: &str,
        name: &str,
        delete_data: bool,
    ) -> Result<(), MetastoreError>;
    async fn list_tables(&self, database: &str) -> Result<Vec<String>, MetastoreError>;
    async fn get_columns(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<CatalogColumn>, MetastoreError>;
}
