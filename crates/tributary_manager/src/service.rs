//! Ingestion operations.
//!
//! Thin composition over the extraction platform, the data catalog and the
//! coordinator. Synchronous operations return the capability's result
//! directly; `*_async` operations submit a ticket and return it, and their
//! worker-side counterparts (which take the ticket) do the work and record
//! the outcome.

use std::sync::Arc;
use tracing::{info, warn};
use tributary_catalog::DataCatalog;
use tributary_extractor::{clean_discovery_schema, ExtractionPlatform, Filters};
use tributary_protocol::{
    Connector, ConnectorId, CreateConnectorRequest, CreateConnectorStatus, CreateSourceRequest,
    CreateSourceStatus, DiscoverTablesRequest, GetSourceTablesStatus, Job, OperationKind,
    OperationStatus, Source, SourceDefinition, SourceDefinitionConfiguration, SourceDefinitionId,
    SourceId, StatusRecord, SyncNotification, Table, TicketId, UpdateSourceStatus, Workspace,
    WorkspaceId,
};

use crate::coordinator::{Coordinator, CoordinatorError};
use crate::error::{Result, ServiceError};

pub struct IngestionService {
    platform: Arc<dyn ExtractionPlatform>,
    catalog: Arc<dyn DataCatalog>,
    coordinator: Coordinator,
}

impl IngestionService {
    pub fn new(
        platform: Arc<dyn ExtractionPlatform>,
        catalog: Arc<dyn DataCatalog>,
        coordinator: Coordinator,
    ) -> Self {
        Self {
            platform,
            catalog,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    // ========================================================================
    // Workspaces and source definitions
    // ========================================================================

    pub async fn list_workspaces(&self, filters: &Filters) -> Result<Vec<Workspace>> {
        Ok(self.platform.list_workspaces(filters).await?)
    }

    pub async fn get_workspace(&self, workspace_id: &WorkspaceId) -> Result<Workspace> {
        Ok(self.platform.get_workspace(workspace_id).await?)
    }

    pub async fn create_workspace(&self, tenant: &str, bucket: &str) -> Result<Workspace> {
        if tenant.trim().is_empty() || bucket.trim().is_empty() {
            return Err(ServiceError::invalid_request(
                "tenant and bucket are required",
            ));
        }
        Ok(self.platform.create_workspace(tenant, bucket).await?)
    }

    pub async fn list_source_definitions(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<Vec<SourceDefinition>> {
        Ok(self.platform.list_source_definitions(workspace_id).await?)
    }

    pub async fn get_source_definition_configuration(
        &self,
        workspace_id: &WorkspaceId,
        definition_id: &SourceDefinitionId,
    ) -> Result<SourceDefinitionConfiguration> {
        Ok(self
            .platform
            .get_source_definition_configuration(workspace_id, definition_id)
            .await?)
    }

    // ========================================================================
    // Sources
    // ========================================================================

    pub async fn create_source_async(
        &self,
        workspace_id: &WorkspaceId,
        source: Source,
    ) -> Result<TicketId> {
        let request = CreateSourceRequest {
            workspace_id: workspace_id.clone(),
            source,
        };
        Ok(self
            .coordinator
            .submit::<CreateSourceStatus, _>(OperationKind::CreateSource, &request)
            .await?)
    }

    /// Worker side of [`Self::create_source_async`].
    pub async fn create_source_from_definition(
        &self,
        ticket: &TicketId,
        request: &CreateSourceRequest,
    ) -> Result<CreateSourceStatus> {
        let outcome = self
            .platform
            .create_source(&request.workspace_id, &request.source)
            .await
            .map_err(ServiceError::from)
            .and_then(|created| {
                created.source_id.ok_or_else(|| {
                    ServiceError::invalid_request("platform returned a source without an id")
                })
            });
        self.record(ticket, outcome, CreateSourceStatus::finished).await
    }

    pub async fn get_create_source_status(&self, ticket: &TicketId) -> Result<CreateSourceStatus> {
        Ok(self.coordinator.poll(ticket).await?)
    }

    pub async fn list_sources(&self, workspace_id: &WorkspaceId) -> Result<Vec<Source>> {
        Ok(self.platform.list_sources(workspace_id).await?)
    }

    pub async fn get_source(&self, source_id: &SourceId) -> Result<Source> {
        Ok(self.platform.get_source(source_id).await?)
    }

    pub async fn update_source_async(&self, source: Source) -> Result<TicketId> {
        if source.source_id.is_none() {
            return Err(ServiceError::invalid_request("source id is required"));
        }
        Ok(self
            .coordinator
            .submit::<UpdateSourceStatus, _>(OperationKind::UpdateSource, &source)
            .await?)
    }

    /// Worker side of [`Self::update_source_async`].
    pub async fn update_source(
        &self,
        ticket: &TicketId,
        source: &Source,
    ) -> Result<UpdateSourceStatus> {
        let outcome = self
            .platform
            .update_source(source)
            .await
            .map_err(ServiceError::from);
        self.record(ticket, outcome, UpdateSourceStatus::finished).await
    }

    pub async fn get_update_source_status(&self, ticket: &TicketId) -> Result<UpdateSourceStatus> {
        Ok(self.coordinator.poll(ticket).await?)
    }

    pub async fn delete_source(&self, source_id: &SourceId) -> Result<()> {
        self.platform.delete_source(source_id).await?;
        info!(source_id = %source_id, "Deleted source");
        Ok(())
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Submit schema discovery. The source must exist at submission time.
    pub async fn discover_tables_async(&self, source_id: &SourceId) -> Result<TicketId> {
        let source = self.platform.get_source(source_id).await?;
        let request = DiscoverTablesRequest {
            source_id: source.source_id.unwrap_or_else(|| source_id.clone()),
        };
        Ok(self
            .coordinator
            .submit::<GetSourceTablesStatus, _>(OperationKind::DiscoverTables, &request)
            .await?)
    }

    /// Worker side of [`Self::discover_tables_async`]. Discovered schemas are
    /// cleaned before they are recorded.
    pub async fn discover_tables(
        &self,
        ticket: &TicketId,
        request: &DiscoverTablesRequest,
    ) -> Result<GetSourceTablesStatus> {
        let outcome = self.discover_clean_tables(&request.source_id).await;
        self.record(ticket, outcome, GetSourceTablesStatus::finished).await
    }

    async fn discover_clean_tables(&self, source_id: &SourceId) -> Result<Vec<Table>> {
        // The source may have been deleted since submission.
        self.platform.get_source(source_id).await?;
        let mut tables = self.platform.discover_tables(source_id).await?;
        for table in &mut tables {
            table.json_schema = clean_discovery_schema(&table.json_schema);
        }
        Ok(tables)
    }

    pub async fn get_discover_tables_status(
        &self,
        ticket: &TicketId,
    ) -> Result<GetSourceTablesStatus> {
        Ok(self.coordinator.poll(ticket).await?)
    }

    // ========================================================================
    // Connectors
    // ========================================================================

    /// Create a connector and its catalog database and tables.
    ///
    /// Each failed step undoes the steps before it: a failed database
    /// creation deletes the connector; failed table reconciliation deletes
    /// the database, then the connector. Undo failures are reported with the
    /// original error.
    pub async fn create_connector_from_source(
        &self,
        workspace_id: &WorkspaceId,
        connector: &Connector,
    ) -> Result<Connector> {
        let mut created = self
            .platform
            .create_connector(workspace_id, connector)
            .await?;
        let connector_id = created.id.clone().ok_or_else(|| {
            ServiceError::invalid_request("platform returned a connector without an id")
        })?;
        info!(connector_id = %connector_id, source_id = %created.source_id, "Created connector");

        if let Err(e) = self.catalog.create_database(&mut created).await {
            let mut failures = Vec::new();
            if let Err(undo) = self.platform.delete_connector(&connector_id).await {
                failures.push(format!("delete connector {}: {}", connector_id, undo));
            }
            return Err(compensated(e.into(), failures));
        }

        if let Err(e) = self.catalog.update_tables(&created).await {
            let mut failures = Vec::new();
            if let Err(undo) = self.catalog.delete_database(&created).await {
                failures.push(format!("delete database {}: {}", created.warehouse_database, undo));
            }
            if let Err(undo) = self.platform.delete_connector(&connector_id).await {
                failures.push(format!("delete connector {}: {}", connector_id, undo));
            }
            return Err(compensated(e.into(), failures));
        }

        info!(
            connector_id = %connector_id,
            database = %created.warehouse_database,
            tables = created.tables.len(),
            "Connector catalog ready"
        );
        Ok(created)
    }

    pub async fn create_connector_async(
        &self,
        workspace_id: &WorkspaceId,
        connector: Connector,
    ) -> Result<TicketId> {
        let request = CreateConnectorRequest {
            workspace_id: workspace_id.clone(),
            connector,
        };
        Ok(self
            .coordinator
            .submit::<CreateConnectorStatus, _>(OperationKind::CreateConnector, &request)
            .await?)
    }

    /// Worker side of [`Self::create_connector_async`].
    ///
    /// Once the saga succeeds the connector id is checkpointed on the pending
    /// ticket. A redelivery that finds it finishes the ticket with that
    /// connector instead of building a second one.
    pub async fn create_connector(
        &self,
        ticket: &TicketId,
        request: &CreateConnectorRequest,
    ) -> Result<CreateConnectorStatus> {
        let progress = match self.coordinator.poll::<CreateConnectorStatus>(ticket).await {
            Ok(record) => record.connector_id,
            Err(CoordinatorError::TicketNotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        if let Some(connector_id) = progress {
            info!(ticket_id = %ticket, connector_id = %connector_id, "Connector already created, finishing ticket");
            return self
                .record(ticket, Ok(connector_id), CreateConnectorStatus::finished)
                .await;
        }

        let created = match self
            .create_connector_from_source(&request.workspace_id, &request.connector)
            .await
        {
            Ok(created) => created,
            Err(e) => return self.record(ticket, Err(e), CreateConnectorStatus::finished).await,
        };
        let Some(connector_id) = created.id.clone() else {
            let e = ServiceError::invalid_request("platform returned a connector without an id");
            return self.record(ticket, Err(e), CreateConnectorStatus::finished).await;
        };

        let checkpoint = CreateConnectorStatus {
            connector_id: Some(connector_id.clone()),
            status: OperationStatus::Pending,
            error: None,
        };
        if let Err(e) = self.coordinator.checkpoint(ticket, &checkpoint).await {
            // Without the checkpoint a retry cannot tell this connector exists.
            let mut failures = Vec::new();
            if let Err(undo) = self.catalog.delete_database(&created).await {
                failures.push(format!("delete database {}: {}", created.warehouse_database, undo));
            }
            if let Err(undo) = self.platform.delete_connector(&connector_id).await {
                failures.push(format!("delete connector {}: {}", connector_id, undo));
            }
            return Err(compensated(e.into(), failures));
        }

        self.record(ticket, Ok(connector_id), CreateConnectorStatus::finished)
            .await
    }

    pub async fn get_create_connector_status(
        &self,
        ticket: &TicketId,
    ) -> Result<CreateConnectorStatus> {
        Ok(self.coordinator.poll(ticket).await?)
    }

    /// Apply the mutable parts of `connector` (name, schedule, tables) to the
    /// stored connector and reconcile its catalog tables.
    pub async fn update_connector(&self, connector: &Connector) -> Result<Connector> {
        let connector_id = connector
            .id
            .as_ref()
            .ok_or_else(|| ServiceError::invalid_request("connector id is required"))?;
        let mut current = self.platform.get_connector(connector_id).await?;
        current.name = connector.name.clone();
        current.schedule_type = connector.schedule_type;
        current.schedule = connector.schedule.clone();
        current.tables = connector.tables.clone();

        let updated = self.platform.update_connector(&current).await?;
        self.catalog.update_tables(&updated).await?;
        info!(connector_id = %connector_id, "Updated connector");
        Ok(updated)
    }

    pub async fn get_connector(&self, connector_id: &ConnectorId) -> Result<Connector> {
        Ok(self.platform.get_connector(connector_id).await?)
    }

    pub async fn list_connectors(&self, filters: &Filters) -> Result<Vec<Connector>> {
        Ok(self.platform.list_connectors(filters).await?)
    }

    /// Drop the catalog database, then the connector. If the database cannot
    /// be dropped the connector is kept.
    pub async fn delete_connector(&self, connector_id: &ConnectorId) -> Result<()> {
        let connector = self.platform.get_connector(connector_id).await?;
        self.catalog.delete_database(&connector).await?;
        self.platform.delete_connector(connector_id).await?;
        info!(connector_id = %connector_id, "Deleted connector");
        Ok(())
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    pub async fn trigger_job(&self, connector_id: &ConnectorId) -> Result<Job> {
        Ok(self.platform.trigger_job(connector_id).await?)
    }

    pub async fn list_connector_jobs(
        &self,
        connector_id: &ConnectorId,
        filters: &Filters,
    ) -> Result<Vec<Job>> {
        Ok(self.platform.list_jobs(connector_id, filters).await?)
    }

    pub async fn get_connector_job(&self, job_id: i64) -> Result<Job> {
        Ok(self.platform.get_job(job_id).await?)
    }

    pub async fn get_connector_job_logs(&self, job_id: i64) -> Result<Vec<String>> {
        Ok(self.platform.get_job_logs(job_id).await?)
    }

    // ========================================================================
    // Sync notifications
    // ========================================================================

    /// Called when the platform reports a finished sync. Queues profiling
    /// and refreshes partitions right away so new data is queryable sooner.
    pub async fn handle_sync_webhook(&self, notification: &SyncNotification) -> Result<()> {
        self.coordinator
            .notify(OperationKind::SyncNotification, notification)
            .await?;
        let connector = self.notified_connector(notification).await?;
        self.catalog.refresh_partitions(&connector).await?;
        Ok(())
    }

    /// Worker side of the sync notification: refresh partitions, then
    /// compute column statistics.
    pub async fn trigger_profiling(&self, notification: &SyncNotification) -> Result<()> {
        let connector = self.notified_connector(notification).await?;
        self.catalog.refresh_partitions(&connector).await?;
        self.catalog.profile_tables(&connector).await?;
        info!(connector_id = %notification.connection_id, "Profiled connector tables");
        Ok(())
    }

    async fn notified_connector(&self, notification: &SyncNotification) -> Result<Connector> {
        let connector = self
            .platform
            .get_connector(&notification.connection_id)
            .await?;
        // The workspace must still exist.
        self.platform
            .get_workspace(&notification.workspace_id)
            .await?;
        Ok(connector)
    }

    // ========================================================================
    // Ticket outcomes
    // ========================================================================

    /// Turn a worker outcome into the ticket's terminal record.
    ///
    /// Capability failures fail the ticket and are returned as the record;
    /// infrastructure failures are returned as errors so the broker retries.
    async fn record<T, R>(
        &self,
        ticket: &TicketId,
        outcome: Result<T>,
        finished: impl FnOnce(T) -> R,
    ) -> Result<R>
    where
        R: StatusRecord,
    {
        let record = match outcome {
            Ok(value) => finished(value),
            Err(e) if e.is_infrastructure() => return Err(e),
            Err(e) => {
                warn!(ticket_id = %ticket, status_code = e.status_code(), "Operation failed: {}", e);
                R::failed(e.to_string())
            }
        };
        if !self.coordinator.finish(ticket, &record).await? {
            // Someone else finished it first; report what was kept.
            return Ok(self.coordinator.poll(ticket).await?);
        }
        Ok(record)
    }
}

fn compensated(cause: ServiceError, failures: Vec<String>) -> ServiceError {
    if failures.is_empty() {
        return cause;
    }
    warn!(failures = failures.len(), "Compensation incomplete: {}", cause);
    ServiceError::Compensation {
        cause: Box::new(cause),
        failures,
    }
}
