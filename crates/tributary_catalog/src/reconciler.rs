//! Catalog reconciliation.
//!
//! [`CatalogReconciler`] makes the catalog match a connector's declared
//! tables: enabled tables are created or altered in place, disabled ones are
//! dropped. Partition repair and column statistics are separate operations
//! with their own failure handling and never run as part of
//! [`DataCatalog::update_tables`].

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};
use tributary_protocol::defaults::DEFAULT_TABLE_OWNER;
use tributary_protocol::{Connector, Table};

use crate::compute::{quote_ident, ComputeEngine, Row};
use crate::error::{CatalogError, Result};
use crate::metastore::{
    CatalogColumn, CatalogDatabase, CatalogTable, Metastore, StorageFormat, TableKind,
};
use crate::translator::{columns_from_schema, CatalogType};

const BUCKET_NAME_KEY: &str = "s3_bucket_name";
const BUCKET_PATH_KEY: &str = "s3_bucket_path";
const PARTITION_COLUMN: &str = "ingestion_date";
const PARTITION_COMMENT: &str = "date the data was ingested";

/// What the orchestration layer needs from the catalog.
#[async_trait]
pub trait DataCatalog: Send + Sync {
    /// Create the connector's database and record its name on the connector.
    /// Must run once, before any table is created.
    async fn create_database(&self, connector: &mut Connector) -> Result<()>;

    /// Drop the connector's database with its tables. Absent is success.
    async fn delete_database(&self, connector: &Connector) -> Result<()>;

    /// Create, alter or drop tables to match the connector's declared tables.
    async fn update_tables(&self, connector: &Connector) -> Result<()>;

    /// Rediscover partitions of every enabled table.
    async fn refresh_partitions(&self, connector: &Connector) -> Result<()>;

    /// Compute column statistics and attach them to the catalog columns.
    /// Any statistics failure fails the whole call.
    async fn profile_tables(&self, connector: &Connector) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    pub owner: String,
    /// Lowercase top-level column names (case-insensitive catalogs).
    pub lowercase_columns: bool,
    /// URI scheme of the storage layer.
    pub scheme: String,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            owner: DEFAULT_TABLE_OWNER.to_string(),
            lowercase_columns: true,
            scheme: "s3a".to_string(),
        }
    }
}

/// Numeric column statistics stored as JSON in the column comment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStatistics {
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub variance: Option<f64>,
    pub stddev: Option<f64>,
    pub kurtosis: Option<f64>,
}

impl ColumnStatistics {
    fn from_row(row: &Row) -> std::result::Result<Self, String> {
        if row.len() != 5 {
            return Err(format!("expected 5 values, got {}", row.len()));
        }
        let value = |i: usize| -> std::result::Result<Option<f64>, String> {
            match &row[i] {
                Value::Null => Ok(None),
                v => v
                    .as_f64()
                    .map(Some)
                    .ok_or_else(|| format!("non-numeric statistic: {}", v)),
            }
        };
        Ok(Self {
            mean: value(0)?,
            median: value(1)?,
            variance: value(2)?,
            stddev: value(3)?,
            kurtosis: value(4)?,
        })
    }
}

pub struct CatalogReconciler {
    metastore: Arc<dyn Metastore>,
    compute: Arc<dyn ComputeEngine>,
    options: ReconcilerOptions,
}

impl CatalogReconciler {
    pub fn new(metastore: Arc<dyn Metastore>, compute: Arc<dyn ComputeEngine>) -> Self {
        Self::with_options(metastore, compute, ReconcilerOptions::default())
    }

    pub fn with_options(
        metastore: Arc<dyn Metastore>,
        compute: Arc<dyn ComputeEngine>,
        options: ReconcilerOptions,
    ) -> Self {
        Self {
            metastore,
            compute,
            options,
        }
    }

    /// `{scheme}://{bucket}/{path}/{warehouse database}`
    pub fn database_location(&self, connector: &Connector) -> Result<String> {
        let config = &connector.destination_configuration;
        if config.is_empty() {
            return Err(CatalogError::NoDestination);
        }
        let bucket = config
            .get(BUCKET_NAME_KEY)
            .and_then(Value::as_str)
            .ok_or(CatalogError::MissingDestination {
                key: BUCKET_NAME_KEY,
            })?;
        let path = config
            .get(BUCKET_PATH_KEY)
            .and_then(Value::as_str)
            .ok_or(CatalogError::MissingDestination {
                key: BUCKET_PATH_KEY,
            })?;
        Ok(format!(
            "{}://{}/{}/{}",
            self.options.scheme,
            bucket,
            path,
            connector.warehouse_database_name()
        ))
    }

    fn build_table(&self, database: &str, database_location: &str, table: &Table) -> CatalogTable {
        CatalogTable {
            database: database.to_string(),
            name: table.physical_name(),
            owner: self.options.owner.clone(),
            location: format!("{}/{}/", database_location, table.folder_name()),
            columns: columns_from_schema(&table.json_schema, self.options.lowercase_columns),
            partition_keys: vec![
                CatalogColumn::new(PARTITION_COLUMN, "string").with_comment(PARTITION_COMMENT)
            ],
            storage: StorageFormat::parquet(),
            kind: TableKind::External,
            parameters: BTreeMap::new(),
        }
    }

    async fn existing_table(&self, database: &str, name: &str) -> Result<Option<CatalogTable>> {
        match self.metastore.get_table(database, name).await {
            Ok(table) => Ok(Some(table)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn profile_table(&self, database: &str, table_name: &str) -> Result<()> {
        let mut table = self.metastore.get_table(database, table_name).await?;
        let quoted_table = quote_ident(table_name);

        for column in table.columns.iter_mut() {
            let quoted = quote_ident(&column.name);
            self.compute
                .execute(
                    database,
                    &format!(
                        "ANALYZE TABLE {} COMPUTE STATISTICS FOR COLUMNS {}",
                        quoted_table, quoted
                    ),
                )
                .await?;

            if !CatalogType::is_numeric_name(&column.data_type) {
                continue;
            }

            let statement = format!(
                "SELECT MEAN({c}), PERCENTILE({c}, 0.5), VARIANCE({c}), STDDEV({c}), KURTOSIS({c}) FROM {t}",
                c = quoted,
                t = quoted_table
            );
            let rows = self.compute.execute(database, &statement).await?;
            let Some(row) = rows.first() else {
                debug!(table = %table_name, column = %column.name, "No statistics rows returned");
                continue;
            };
            let stats = ColumnStatistics::from_row(row).map_err(|message| {
                CatalogError::Statistics {
                    table: table_name.to_string(),
                    column: column.name.clone(),
                    message,
                }
            })?;
            column.comment = Some(serde_json::to_string(&stats)?);
        }

        self.metastore
            .alter_table(database, table_name, &table)
            .await?;
        Ok(())
    }
}

/// Order `columns` like `existing`; columns unknown to `existing` go last,
/// keeping their relative order.
pub(crate) fn order_like_existing(
    mut columns: Vec<CatalogColumn>,
    existing: &[CatalogColumn],
) -> Vec<CatalogColumn> {
    let positions: HashMap<&str, usize> = existing
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.as_str(), i))
        .collect();
    columns.sort_by_key(|c| positions.get(c.name.as_str()).copied().unwrap_or(usize::MAX));
    columns
}

#[async_trait]
impl DataCatalog for CatalogReconciler {
    async fn create_database(&self, connector: &mut Connector) -> Result<()> {
        let location = self.database_location(connector)?;
        let name = connector.warehouse_database_name();
        self.metastore
            .create_database(&CatalogDatabase {
                name: name.clone(),
                location: location.clone(),
            })
            .await?;
        info!(database = %name, location = %location, "Created catalog database");
        connector.warehouse_database = name;
        Ok(())
    }

    async fn delete_database(&self, connector: &Connector) -> Result<()> {
        let name = connector.warehouse_database_name();
        match self.metastore.drop_database(&name, true, true).await {
            Ok(()) => {
                info!(database = %name, "Dropped catalog database");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(database = %name, "Catalog database already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_tables(&self, connector: &Connector) -> Result<()> {
        let database = connector.warehouse_database_name();
        let location = self.database_location(connector)?;

        for table in &connector.tables {
            let name = table.physical_name();
            let existing = self.existing_table(&database, &name).await?;

            match (table.sync_enabled, existing) {
                (true, None) => {
                    let desired = self.build_table(&database, &location, table);
                    self.metastore.create_table(&desired).await?;
                    info!(database = %database, table = %name, columns = desired.columns.len(), "Created catalog table");
                }
                (true, Some(current)) => {
                    let mut desired = self.build_table(&database, &location, table);
                    desired.columns = order_like_existing(desired.columns, &current.columns);
                    self.metastore.alter_table(&database, &name, &desired).await?;
                    info!(database = %database, table = %name, columns = desired.columns.len(), "Altered catalog table");
                }
                (false, Some(_)) => {
                    self.metastore.drop_table(&database, &name, false).await?;
                    info!(database = %database, table = %name, "Dropped disabled catalog table");
                }
                (false, None) => {}
            }
        }
        Ok(())
    }

    async fn refresh_partitions(&self, connector: &Connector) -> Result<()> {
        let database = connector.warehouse_database_name();
        for table in connector.enabled_tables() {
            let statement = format!("MSCK REPAIR TABLE {}", quote_ident(&table.physical_name()));
            self.compute.execute(&database, &statement).await?;
        }
        info!(database = %database, "Refreshed table partitions");
        Ok(())
    }

    async fn profile_tables(&self, connector: &Connector) -> Result<()> {
        let database = connector.warehouse_database_name();
        for table in connector.enabled_tables() {
            self.profile_table(&database, &table.physical_name()).await?;
        }
        info!(database = %database, "Profiled tables");
        Ok(())
    }
}
