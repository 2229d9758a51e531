//! Reconciler behaviour against recording fakes of the metastore and the
//! compute engine.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tributary_catalog::{
    CatalogColumn, CatalogError, CatalogReconciler, CatalogTable, DataCatalog, StorageFormat,
    TableKind,
};
use tributary_protocol::{SourceId, Table};
use tributary_test_utils::{
    connector_with_tables, object_schema, FakeComputeEngine, FakeMetastore, MetastoreCall,
};

fn source_id() -> SourceId {
    SourceId::parse("0f8fad5b-d9cb-469f-a165-70867728950e").unwrap()
}

const DB: &str = "0f8fad5bd9cb469fa16570867728950e";

fn setup() -> (Arc<FakeMetastore>, Arc<FakeComputeEngine>, CatalogReconciler) {
    let metastore = Arc::new(FakeMetastore::new());
    let compute = Arc::new(FakeComputeEngine::new());
    let reconciler = CatalogReconciler::new(metastore.clone(), compute.clone());
    (metastore, compute, reconciler)
}

fn existing_table(name: &str, columns: &[(&str, &str)]) -> CatalogTable {
    CatalogTable {
        database: DB.to_string(),
        name: name.to_string(),
        owner: "tributary".to_string(),
        location: format!("s3a://lake/raw/{}/{}/", DB, name),
        columns: columns
            .iter()
            .map(|(n, t)| CatalogColumn::new(*n, *t))
            .collect(),
        partition_keys: Vec::new(),
        storage: StorageFormat::parquet(),
        kind: TableKind::External,
        parameters: BTreeMap::new(),
    }
}

// ============================================================================
// Database lifecycle
// ============================================================================

/// Test creating a database records its name and location
#[tokio::test]
async fn test_create_database_records_name() {
    let (metastore, _, reconciler) = setup();
    let mut connector = connector_with_tables(source_id(), Vec::new());

    reconciler.create_database(&mut connector).await.unwrap();

    assert_eq!(connector.warehouse_database, DB);
    let db = metastore.database(DB).unwrap();
    assert_eq!(db.location, format!("s3a://lake/raw/{}", DB));
}

/// Test destination configuration errors name the missing key
#[tokio::test]
async fn test_create_database_requires_destination() {
    let (metastore, _, reconciler) = setup();

    let mut connector = connector_with_tables(source_id(), Vec::new());
    connector.destination_configuration.clear();
    let err = reconciler.create_database(&mut connector).await.unwrap_err();
    assert_eq!(err.to_string(), "Connector without destination configuration");

    let mut connector = connector_with_tables(source_id(), Vec::new());
    connector.destination_configuration.remove("s3_bucket_path");
    let err = reconciler.create_database(&mut connector).await.unwrap_err();
    assert!(matches!(
        err,
        CatalogError::MissingDestination {
            key: "s3_bucket_path"
        }
    ));
    assert_eq!(
        err.to_string(),
        "Destination configuration is missing s3_bucket_path"
    );

    assert_eq!(metastore.call_count("create_database"), 0);
    assert!(connector.warehouse_database.is_empty());
}

/// Test deleting an absent database succeeds so connector deletion can be retried
#[tokio::test]
async fn test_delete_database_is_idempotent() {
    let (metastore, _, reconciler) = setup();
    let mut connector = connector_with_tables(source_id(), Vec::new());
    reconciler.create_database(&mut connector).await.unwrap();

    reconciler.delete_database(&connector).await.unwrap();
    reconciler.delete_database(&connector).await.unwrap();

    assert!(!metastore.has_database(DB));
    assert_eq!(metastore.call_count("drop_database"), 2);
}

/// Test a failing drop is reported
#[tokio::test]
async fn test_delete_database_propagates_other_errors() {
    let (metastore, _, reconciler) = setup();
    metastore.fail_on("drop_database", "metastore down");
    let connector = connector_with_tables(source_id(), Vec::new());

    let err = reconciler.delete_database(&connector).await.unwrap_err();
    assert!(matches!(err, CatalogError::Metastore(_)));
}

// ============================================================================
// Table reconciliation
// ============================================================================

/// Test an enabled, absent table is created with location, format and partition
#[tokio::test]
async fn test_update_tables_creates_enabled_table() {
    let (metastore, _, reconciler) = setup();
    let table = Table::new(
        "Order Items",
        object_schema(&[("id", "integer"), ("sku.code", "string")]),
    )
    .enabled(true);
    let mut connector = connector_with_tables(source_id(), vec![table]);
    reconciler.create_database(&mut connector).await.unwrap();

    reconciler.update_tables(&connector).await.unwrap();

    let created = metastore.table(DB, "order_items").unwrap();
    assert_eq!(created.location, format!("s3a://lake/raw/{}/Order_Items/", DB));
    assert_eq!(created.kind, TableKind::External);
    assert_eq!(created.storage, StorageFormat::parquet());
    assert_eq!(created.owner, "tributary");
    assert_eq!(created.partition_keys.len(), 1);
    assert_eq!(created.partition_keys[0].name, "ingestion_date");
    assert_eq!(created.partition_keys[0].data_type, "string");

    let mut columns: Vec<_> = created
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c.data_type.as_str()))
        .collect();
    columns.sort();
    assert_eq!(columns, vec![("id", "bigint"), ("sku_code", "string")]);
}

/// Test existing column order is kept and new columns are appended
#[tokio::test]
async fn test_update_tables_preserves_existing_column_order() {
    let (metastore, _, reconciler) = setup();
    metastore.insert_table(existing_table(
        "events",
        &[("b", "string"), ("a", "bigint"), ("c", "double")],
    ));
    let table = Table::new(
        "events",
        object_schema(&[("a", "integer"), ("b", "string"), ("c", "number"), ("d", "boolean")]),
    )
    .enabled(true);
    let connector = connector_with_tables(source_id(), vec![table]);

    reconciler.update_tables(&connector).await.unwrap();

    let altered: Vec<_> = metastore
        .writes()
        .into_iter()
        .filter_map(|call| match call {
            MetastoreCall::AlterTable(t) => Some(t),
            _ => None,
        })
        .collect();
    assert_eq!(altered.len(), 1);
    assert_eq!(altered[0].column_names(), vec!["b", "a", "c", "d"]);
    assert_eq!(metastore.call_count("create_table"), 0);
}

/// Test disabling a created table drops it exactly once and nothing else
#[tokio::test]
async fn test_update_tables_drops_disabled_table() {
    let (metastore, _, reconciler) = setup();
    metastore.insert_table(existing_table("users", &[("id", "bigint")]));
    let table = Table::new("users", object_schema(&[("id", "integer")]));
    let connector = connector_with_tables(source_id(), vec![table]);

    reconciler.update_tables(&connector).await.unwrap();

    assert_eq!(
        metastore.writes(),
        vec![MetastoreCall::DropTable(DB.to_string(), "users".to_string())]
    );
    assert!(metastore.table(DB, "users").is_none());
}

/// Test a disabled table that does not exist is left alone
#[tokio::test]
async fn test_update_tables_disabled_absent_is_noop() {
    let (metastore, _, reconciler) = setup();
    let table = Table::new("users", object_schema(&[("id", "integer")]));
    let connector = connector_with_tables(source_id(), vec![table]);

    reconciler.update_tables(&connector).await.unwrap();

    assert!(metastore.writes().is_empty());
}

/// Test error columns flow through untouched
#[tokio::test]
async fn test_update_tables_keeps_error_columns() {
    let (metastore, _, reconciler) = setup();
    metastore.insert_database(DB, "s3a://lake/raw");
    let schema = json!({
        "type": "object",
        "properties": {
            "tags": {"type": "array"},
            "meta": {"type": "object"}
        }
    });
    let connector =
        connector_with_tables(source_id(), vec![Table::new("docs", schema).enabled(true)]);

    reconciler.update_tables(&connector).await.unwrap();

    let created = metastore.table(DB, "docs").unwrap();
    assert!(created.columns.iter().all(|c| c.data_type == "error"));
    assert_eq!(created.columns.len(), 2);
}

/// Test only not-found counts as absence; other lookup failures stop reconciliation
#[tokio::test]
async fn test_update_tables_propagates_lookup_failures() {
    let (metastore, _, reconciler) = setup();
    metastore.fail_on("get_table", "timeout");
    let table = Table::new("users", object_schema(&[("id", "integer")])).enabled(true);
    let connector = connector_with_tables(source_id(), vec![table]);

    assert!(reconciler.update_tables(&connector).await.is_err());
    assert!(metastore.writes().is_empty());
}

/// Test running reconciliation twice on the same state is stable
#[tokio::test]
async fn test_update_tables_is_idempotent() {
    let (metastore, _, reconciler) = setup();
    let table = Table::new("users", object_schema(&[("id", "integer"), ("name", "string")]))
        .enabled(true);
    let mut connector = connector_with_tables(source_id(), vec![table]);
    reconciler.create_database(&mut connector).await.unwrap();

    reconciler.update_tables(&connector).await.unwrap();
    let first = metastore.table(DB, "users").unwrap();
    reconciler.update_tables(&connector).await.unwrap();
    let second = metastore.table(DB, "users").unwrap();

    assert_eq!(first, second);
    assert_eq!(metastore.call_count("create_table"), 1);
    assert_eq!(metastore.call_count("alter_table"), 1);
}

// ============================================================================
// Partitions and statistics
// ============================================================================

/// Test partition repair runs for enabled tables only
#[tokio::test]
async fn test_refresh_partitions_enabled_tables() {
    let (_, compute, reconciler) = setup();
    let connector = connector_with_tables(
        source_id(),
        vec![
            Table::new("Orders", json!({})).enabled(true),
            Table::new("Legacy", json!({})),
        ],
    );

    reconciler.refresh_partitions(&connector).await.unwrap();

    assert_eq!(
        compute.executed(),
        vec![(DB.to_string(), "MSCK REPAIR TABLE `orders`".to_string())]
    );
}

/// Test numeric columns get statistics in their comment
#[tokio::test]
async fn test_profile_tables_attaches_statistics() {
    let (metastore, compute, reconciler) = setup();
    metastore.insert_table(existing_table("orders", &[("id", "bigint"), ("note", "string")]));
    compute.respond_to(
        "SELECT MEAN(`id`)",
        vec![vec![json!(5.0), json!(5.0), json!(2.5), json!(1.5), json!(0.1)]],
    );
    let connector = connector_with_tables(
        source_id(),
        vec![Table::new("orders", json!({})).enabled(true)],
    );

    reconciler.profile_tables(&connector).await.unwrap();

    let statements = compute.statements();
    assert_eq!(
        statements,
        vec![
            "ANALYZE TABLE `orders` COMPUTE STATISTICS FOR COLUMNS `id`".to_string(),
            "SELECT MEAN(`id`), PERCENTILE(`id`, 0.5), VARIANCE(`id`), STDDEV(`id`), KURTOSIS(`id`) FROM `orders`".to_string(),
            "ANALYZE TABLE `orders` COMPUTE STATISTICS FOR COLUMNS `note`".to_string(),
        ]
    );

    let profiled = metastore.table(DB, "orders").unwrap();
    let stats: serde_json::Value =
        serde_json::from_str(profiled.columns[0].comment.as_deref().unwrap()).unwrap();
    assert_eq!(stats["mean"], json!(5.0));
    assert_eq!(stats["kurtosis"], json!(0.1));
    assert!(profiled.columns[1].comment.is_none());
}

/// Test a statistics failure fails profiling without touching table structure
#[tokio::test]
async fn test_profile_tables_failure_is_fatal() {
    let (metastore, compute, reconciler) = setup();
    metastore.insert_table(existing_table("orders", &[("id", "bigint")]));
    compute.fail_when("KURTOSIS", "engine busy");
    let connector = connector_with_tables(
        source_id(),
        vec![Table::new("orders", json!({})).enabled(true)],
    );

    let err = reconciler.profile_tables(&connector).await.unwrap_err();
    assert!(matches!(err, CatalogError::Compute(_)));
    assert_eq!(metastore.call_count("alter_table"), 0);
}
