//! Orchestration service behaviour against recording fakes.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tributary_broker::InMemoryBroker;
use tributary_catalog::{CatalogError, CatalogReconciler, DataCatalog};
use tributary_extractor::Filters;
use tributary_manager::{Coordinator, IngestionService, ServiceError};
use tributary_protocol::topics::{GET_TABLES_REQUESTS, SYNC_NOTIFICATION_REQUESTS};
use tributary_protocol::{
    CreateConnectorRequest, CreateSourceRequest, CreateSourceStatus, OperationStatus, Source,
    SourceDefinitionId, SourceId, SyncNotification, Table, TicketId, WorkspaceId,
};
use tributary_status_store::{InMemoryStatusStore, StatusStore, StoreError};
use tributary_test_utils::{
    connector_with_tables, object_schema, FakeComputeEngine, FakeExtractor, FakeMetastore,
};

struct Harness {
    platform: Arc<FakeExtractor>,
    metastore: Arc<FakeMetastore>,
    compute: Arc<FakeComputeEngine>,
    broker: Arc<InMemoryBroker>,
    service: IngestionService,
    workspace: WorkspaceId,
}

fn harness() -> Harness {
    let platform = Arc::new(FakeExtractor::new());
    let metastore = Arc::new(FakeMetastore::new());
    let compute = Arc::new(FakeComputeEngine::new());
    let broker = Arc::new(InMemoryBroker::with_history(1024));
    let coordinator = Coordinator::new(Arc::new(InMemoryStatusStore::new()), broker.clone());
    let catalog = CatalogReconciler::new(metastore.clone(), compute.clone());
    let service = IngestionService::new(platform.clone(), Arc::new(catalog), coordinator);
    let workspace = platform.add_workspace("acme");
    Harness {
        platform,
        metastore,
        compute,
        broker,
        service,
        workspace,
    }
}

fn users_table() -> Table {
    Table::new("Users", object_schema(&[("id", "integer"), ("name", "string")])).enabled(true)
}

fn new_source(name: &str) -> Source {
    Source {
        source_definition_id: SourceDefinitionId::new(),
        source_id: None,
        name: name.to_string(),
        documentation_url: String::new(),
        icon: String::new(),
        configuration: None,
    }
}

// ============================================================================
// Create connector saga
// ============================================================================

/// Test a successful saga creates connector, database and tables
#[tokio::test]
async fn test_create_connector_from_source() {
    let h = harness();
    let source_id = h.platform.add_source(&h.workspace, "pg");
    let connector = connector_with_tables(source_id.clone(), vec![users_table()]);

    let created = h
        .service
        .create_connector_from_source(&h.workspace, &connector)
        .await
        .unwrap();

    let database = source_id.without_separators();
    assert!(created.id.is_some());
    assert_eq!(created.warehouse_database, database);
    assert!(h.metastore.has_database(&database));
    let table = h.metastore.table(&database, "users").unwrap();
    assert_eq!(table.column_names(), vec!["id", "name"]);
    assert_eq!(h.platform.connector_count(), 1);
}

/// Test a failed database creation deletes the new connector
#[tokio::test]
async fn test_database_failure_deletes_connector() {
    let h = harness();
    let source_id = h.platform.add_source(&h.workspace, "pg");
    h.metastore.fail_on("create_database", "metastore down");

    let err = h
        .service
        .create_connector_from_source(&h.workspace, &connector_with_tables(source_id, vec![]))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Catalog(CatalogError::Metastore(_))));
    assert_eq!(err.status_code(), 500);
    assert_eq!(h.platform.call_count("delete_connector"), 1);
    assert_eq!(h.platform.connector_count(), 0);
    assert_eq!(h.metastore.call_count("drop_database"), 0);
}

/// Test a connector without destination is rolled back
#[tokio::test]
async fn test_missing_destination_deletes_connector() {
    let h = harness();
    let source_id = h.platform.add_source(&h.workspace, "pg");
    let mut connector = connector_with_tables(source_id, vec![users_table()]);
    connector.destination_configuration.clear();

    let err = h
        .service
        .create_connector_from_source(&h.workspace, &connector)
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Connector without destination configuration"
    );
    assert_eq!(h.platform.connector_count(), 0);
}

/// Test failed table reconciliation deletes database then connector
#[tokio::test]
async fn test_table_failure_runs_two_step_compensation() {
    let h = harness();
    let source_id = h.platform.add_source(&h.workspace, "pg");
    h.metastore.fail_on("create_table", "schema rejected");

    let err = h
        .service
        .create_connector_from_source(
            &h.workspace,
            &connector_with_tables(source_id.clone(), vec![users_table()]),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Catalog(_)));
    assert_eq!(h.metastore.call_count("drop_database"), 1);
    assert_eq!(h.platform.call_count("delete_connector"), 1);
    assert!(!h.metastore.has_database(&source_id.without_separators()));
    assert_eq!(h.platform.connector_count(), 0);
}

/// Test compensation failures are reported next to the cause
#[tokio::test]
async fn test_compensation_failure_is_reported() {
    let h = harness();
    let source_id = h.platform.add_source(&h.workspace, "pg");
    h.metastore.fail_on("create_table", "schema rejected");
    h.platform.fail_api("delete_connector", 503, "platform down");

    let err = h
        .service
        .create_connector_from_source(
            &h.workspace,
            &connector_with_tables(source_id, vec![users_table()]),
        )
        .await
        .unwrap_err();

    match &err {
        ServiceError::Compensation { cause, failures } => {
            assert!(matches!(**cause, ServiceError::Catalog(_)));
            assert_eq!(failures.len(), 1);
            assert!(failures[0].contains("status: 503"));
        }
        other => panic!("expected compensation error, got {other:?}"),
    }
    assert!(err.to_string().contains("schema rejected"));
    assert_eq!(h.platform.connector_count(), 1);
}

/// Test platform failures surface their status code
#[tokio::test]
async fn test_platform_rejection_surfaces_status() {
    let h = harness();
    let source_id = h.platform.add_source(&h.workspace, "pg");
    h.platform.fail_api("create_connector", 422, "bad schedule");

    let err = h
        .service
        .create_connector_from_source(&h.workspace, &connector_with_tables(source_id, vec![]))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 422);
    assert_eq!(h.metastore.call_count("create_database"), 0);
}

// ============================================================================
// Update and delete connector
// ============================================================================

/// Test updating a connector disables a table and drops it from the catalog
#[tokio::test]
async fn test_update_connector_reconciles_tables() {
    let h = harness();
    let source_id = h.platform.add_source(&h.workspace, "pg");
    let orders = Table::new("orders", object_schema(&[("total", "number")])).enabled(true);
    let created = h
        .service
        .create_connector_from_source(
            &h.workspace,
            &connector_with_tables(source_id.clone(), vec![users_table(), orders.clone()]),
        )
        .await
        .unwrap();

    let mut change = created.clone();
    change.name = "renamed".into();
    change.tables = vec![users_table(), orders.enabled(false)];
    let updated = h.service.update_connector(&change).await.unwrap();

    let database = source_id.without_separators();
    assert_eq!(updated.name, "renamed");
    assert!(h.metastore.table(&database, "users").is_some());
    assert!(h.metastore.table(&database, "orders").is_none());
    assert_eq!(h.metastore.call_count("drop_table"), 1);
}

/// Test updating a connector without id is a bad request
#[tokio::test]
async fn test_update_connector_requires_id() {
    let h = harness();
    let connector = connector_with_tables(SourceId::new(), vec![]);
    let err = h.service.update_connector(&connector).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
}

/// Test deleting a connector drops its database first
#[tokio::test]
async fn test_delete_connector() {
    let h = harness();
    let source_id = h.platform.add_source(&h.workspace, "pg");
    let created = h
        .service
        .create_connector_from_source(
            &h.workspace,
            &connector_with_tables(source_id.clone(), vec![users_table()]),
        )
        .await
        .unwrap();
    let connector_id = created.id.unwrap();

    h.service.delete_connector(&connector_id).await.unwrap();

    assert!(!h.metastore.has_database(&source_id.without_separators()));
    assert!(h.platform.connector(&connector_id).is_none());
}

/// Test a failed database drop keeps the connector
#[tokio::test]
async fn test_delete_connector_fails_closed() {
    let h = harness();
    let source_id = h.platform.add_source(&h.workspace, "pg");
    let created = h
        .service
        .create_connector_from_source(
            &h.workspace,
            &connector_with_tables(source_id, vec![users_table()]),
        )
        .await
        .unwrap();
    let connector_id = created.id.unwrap();
    h.metastore.fail_on("drop_database", "metastore down");

    assert!(h.service.delete_connector(&connector_id).await.is_err());
    assert!(h.platform.connector(&connector_id).is_some());
    assert_eq!(h.platform.call_count("delete_connector"), 0);
}

/// Test deleting a connector whose database is already gone succeeds
#[tokio::test]
async fn test_delete_connector_with_absent_database() {
    let h = harness();
    let source_id = h.platform.add_source(&h.workspace, "pg");
    let created = h
        .service
        .create_connector_from_source(&h.workspace, &connector_with_tables(source_id.clone(), vec![]))
        .await
        .unwrap();
    let connector_id = created.id.clone().unwrap();
    CatalogReconciler::new(h.metastore.clone(), h.compute.clone())
        .delete_database(&created)
        .await
        .unwrap();

    h.service.delete_connector(&connector_id).await.unwrap();
    assert!(h.platform.connector(&connector_id).is_none());

    // The connector is gone now, which the platform reports.
    let err = h.service.delete_connector(&connector_id).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}

/// Rejects the first terminal write, then behaves.
struct LosesFirstFinish {
    inner: InMemoryStatusStore,
    tripped: AtomicBool,
}

#[async_trait]
impl StatusStore for LosesFirstFinish {
    async fn get(&self, ticket: &TicketId) -> tributary_status_store::Result<Value> {
        self.inner.get(ticket).await
    }

    async fn set(&self, ticket: &TicketId, value: Value) -> tributary_status_store::Result<()> {
        let terminal = value["status"] != json!("pending");
        if terminal && !self.tripped.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Corrupt {
                ticket: ticket.to_string(),
                message: "write lost".into(),
            });
        }
        self.inner.set(ticket, value).await
    }

    async fn purge_terminal(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> tributary_status_store::Result<u64> {
        self.inner.purge_terminal(cutoff).await
    }
}

/// Test a redelivered connector request after a lost finish reuses the connector
#[tokio::test]
async fn test_create_connector_redelivery_reuses_connector() {
    let platform = Arc::new(FakeExtractor::new());
    let metastore = Arc::new(FakeMetastore::new());
    let store = Arc::new(LosesFirstFinish {
        inner: InMemoryStatusStore::new(),
        tripped: AtomicBool::new(false),
    });
    let coordinator = Coordinator::new(store, Arc::new(InMemoryBroker::new()));
    let catalog = CatalogReconciler::new(metastore.clone(), Arc::new(FakeComputeEngine::new()));
    let service = IngestionService::new(platform.clone(), Arc::new(catalog), coordinator);
    let workspace = platform.add_workspace("acme");
    let source_id = platform.add_source(&workspace, "pg");
    let request = CreateConnectorRequest {
        workspace_id: workspace.clone(),
        connector: connector_with_tables(source_id.clone(), vec![users_table()]),
    };
    let ticket = service
        .create_connector_async(&workspace, request.connector.clone())
        .await
        .unwrap();

    let err = service.create_connector(&ticket, &request).await.unwrap_err();
    assert!(err.is_infrastructure());
    let record = service.create_connector(&ticket, &request).await.unwrap();

    assert_eq!(record.status, OperationStatus::Finished);
    assert_eq!(platform.call_count("create_connector"), 1);
    assert_eq!(platform.connector_count(), 1);
    assert!(platform.connector(&record.connector_id.unwrap()).is_some());
    assert!(metastore.has_database(&source_id.without_separators()));
    assert_eq!(
        service.get_create_connector_status(&ticket).await.unwrap().status,
        OperationStatus::Finished
    );
}

// ============================================================================
// Sources and discovery
// ============================================================================

/// Test the worker side of source creation records the new source id
#[tokio::test]
async fn test_create_source_records_outcome() {
    let h = harness();
    let ticket = h
        .service
        .create_source_async(&h.workspace, new_source("pg"))
        .await
        .unwrap();
    let pending = h.service.get_create_source_status(&ticket).await.unwrap();
    assert_eq!(pending.status, OperationStatus::Pending);

    let request = CreateSourceRequest {
        workspace_id: h.workspace.clone(),
        source: new_source("pg"),
    };
    let record = h
        .service
        .create_source_from_definition(&ticket, &request)
        .await
        .unwrap();

    assert_eq!(record.status, OperationStatus::Finished);
    let source_id = record.source_id.clone().unwrap();
    assert!(h.platform.source(&source_id).is_some());
    assert_eq!(h.service.get_create_source_status(&ticket).await.unwrap(), record);
}

/// Test a platform error fails the ticket with the error text
#[tokio::test]
async fn test_create_source_failure_fails_ticket() {
    let h = harness();
    let request = CreateSourceRequest {
        workspace_id: h.workspace.clone(),
        source: new_source("pg"),
    };
    let ticket = h
        .service
        .create_source_async(&h.workspace, request.source.clone())
        .await
        .unwrap();
    h.platform.fail_api("create_source", 400, "invalid configuration");

    let record: CreateSourceStatus = h
        .service
        .create_source_from_definition(&ticket, &request)
        .await
        .unwrap();

    assert_eq!(record.status, OperationStatus::Failed);
    assert_eq!(
        record.error.as_deref(),
        Some("API failed with status: 400 and body 'invalid configuration'")
    );
    assert!(record.source_id.is_none());
}

/// Test update requires a source id
#[tokio::test]
async fn test_update_source_async_requires_id() {
    let h = harness();
    let err = h
        .service
        .update_source_async(new_source("pg"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

/// Test discovery of a missing source fails before a ticket exists
#[tokio::test]
async fn test_discover_unknown_source_is_rejected() {
    let h = harness();
    let err = h
        .service
        .discover_tables_async(&SourceId::new())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
    assert!(h.broker.published(GET_TABLES_REQUESTS).is_empty());
}

/// Test discovered schemas are cleaned before they are recorded
#[tokio::test]
async fn test_discover_tables_cleans_schemas() {
    let h = harness();
    let source_id = h.platform.add_source(&h.workspace, "pg");
    h.platform.set_discovered_tables(
        &source_id,
        vec![Table::new(
            "users",
            json!({
                "type": "object",
                "$schema": "http://json-schema.org/draft-07/schema#",
                "properties": {
                    "id": {"type": "integer", "description": "primary key"},
                    "blob": {}
                }
            }),
        )],
    );

    let ticket = h.service.discover_tables_async(&source_id).await.unwrap();
    let request = h.broker.published(GET_TABLES_REQUESTS)[0]
        .decode()
        .unwrap();
    let record = h.service.discover_tables(&ticket, &request).await.unwrap();

    assert_eq!(record.status, OperationStatus::Finished);
    assert_eq!(
        record.tables[0].json_schema,
        json!({"type": "object", "properties": {"id": {"type": "integer"}}})
    );
    let polled = h.service.get_discover_tables_status(&ticket).await.unwrap();
    assert_eq!(polled.tables.len(), 1);
}

/// Test listing passes filters through
#[tokio::test]
async fn test_list_connectors_for_workspace() {
    let h = harness();
    let other = h.platform.add_workspace("globex");
    for (workspace, name) in [(&h.workspace, "a"), (&h.workspace, "b"), (&other, "c")] {
        let source_id = h.platform.add_source(workspace, name);
        h.service
            .create_connector_from_source(workspace, &connector_with_tables(source_id, vec![]))
            .await
            .unwrap();
    }

    let listed = h
        .service
        .list_connectors(&Filters::for_workspace(h.workspace.clone()))
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
}

// ============================================================================
// Jobs and sync notifications
// ============================================================================

/// Test job operations go straight to the platform
#[tokio::test]
async fn test_job_operations() {
    let h = harness();
    let source_id = h.platform.add_source(&h.workspace, "pg");
    let created = h
        .service
        .create_connector_from_source(&h.workspace, &connector_with_tables(source_id, vec![]))
        .await
        .unwrap();
    let connector_id = created.id.unwrap();

    let job = h.service.trigger_job(&connector_id).await.unwrap();
    h.platform.set_job_logs(job.id, vec!["attempt 1".into()]);

    let jobs = h
        .service
        .list_connector_jobs(&connector_id, &Filters::default())
        .await
        .unwrap();
    assert_eq!(jobs, vec![job.clone()]);
    assert_eq!(h.service.get_connector_job(job.id).await.unwrap(), job);
    assert_eq!(
        h.service.get_connector_job_logs(job.id).await.unwrap(),
        vec!["attempt 1".to_string()]
    );
}

/// Test the sync webhook queues profiling and refreshes partitions
#[tokio::test]
async fn test_sync_webhook_refreshes_partitions() {
    let h = harness();
    let source_id = h.platform.add_source(&h.workspace, "pg");
    let created = h
        .service
        .create_connector_from_source(
            &h.workspace,
            &connector_with_tables(source_id.clone(), vec![users_table()]),
        )
        .await
        .unwrap();
    let notification = SyncNotification {
        workspace_id: h.workspace.clone(),
        connection_id: created.id.unwrap(),
    };

    h.service.handle_sync_webhook(&notification).await.unwrap();

    let queued = h.broker.published(SYNC_NOTIFICATION_REQUESTS);
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].decode::<SyncNotification>().unwrap(), notification);
    assert_eq!(
        h.compute.executed(),
        vec![(
            source_id.without_separators(),
            "MSCK REPAIR TABLE `users`".to_string()
        )]
    );
}

/// Test the webhook for an unknown workspace fails after queueing
#[tokio::test]
async fn test_sync_webhook_unknown_workspace() {
    let h = harness();
    let source_id = h.platform.add_source(&h.workspace, "pg");
    let created = h
        .service
        .create_connector_from_source(&h.workspace, &connector_with_tables(source_id, vec![]))
        .await
        .unwrap();
    let notification = SyncNotification {
        workspace_id: WorkspaceId::new(),
        connection_id: created.id.unwrap(),
    };

    let err = h.service.handle_sync_webhook(&notification).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
    assert!(h.compute.executed().is_empty());
}

/// Test profiling refreshes partitions and stores numeric statistics
#[tokio::test]
async fn test_trigger_profiling() {
    let h = harness();
    let source_id = h.platform.add_source(&h.workspace, "pg");
    let created = h
        .service
        .create_connector_from_source(
            &h.workspace,
            &connector_with_tables(source_id.clone(), vec![users_table()]),
        )
        .await
        .unwrap();
    h.compute.respond_to(
        "SELECT MEAN(`id`)",
        vec![vec![json!(2.0), json!(2.0), json!(1.0), json!(1.0), json!(-1.5)]],
    );

    h.service
        .trigger_profiling(&SyncNotification {
            workspace_id: h.workspace.clone(),
            connection_id: created.id.unwrap(),
        })
        .await
        .unwrap();

    let statements = h.compute.statements();
    assert_eq!(statements[0], "MSCK REPAIR TABLE `users`");
    let table = h
        .metastore
        .table(&source_id.without_separators(), "users")
        .unwrap();
    let stats: serde_json::Value =
        serde_json::from_str(table.columns[0].comment.as_deref().unwrap()).unwrap();
    assert_eq!(stats["mean"], json!(2.0));
    assert!(table.columns[1].comment.is_none());
}
