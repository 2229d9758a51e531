//! Catalog side of Tributary.
//!
//! - [`translator`]: discovery schema to catalog column types (pure)
//! - [`metastore`] / [`compute`]: capability interfaces to the catalog
//!   metastore and the SQL engine
//! - [`reconciler`]: makes catalog tables match a connector's declared tables

pub mod compute;
pub mod error;
pub mod metastore;
pub mod reconciler;
pub mod translator;

pub use compute::{ComputeEngine, ComputeError, Row};
pub use error::{CatalogError, Result};
pub use metastore::{
    CatalogColumn, CatalogDatabase, CatalogTable, Metastore, MetastoreError, StorageFormat,
    TableKind,
};
pub use reconciler::{CatalogReconciler, ColumnStatistics, DataCatalog, ReconcilerOptions};
pub use translator::{columns_from_schema, translate, CatalogType};
