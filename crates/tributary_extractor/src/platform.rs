//! Capability interface for the extraction platform.

use async_trait::async_trait;
use tributary_protocol::{
    Connector, ConnectorId, Job, Source, SourceDefinition, SourceDefinitionConfiguration,
    SourceDefinitionId, SourceId, Table, Workspace, WorkspaceId,
};

use crate::error::Result;
use crate::filters::Filters;

/// Everything Tributary asks of the extraction platform.
///
/// Calls may take seconds to minutes and fail transiently. Adapters enforce
/// their own client timeouts; callers never hold locks across these calls.
#[async_trait]
pub trait ExtractionPlatform: Send + Sync {
    // Workspaces

    async fn list_workspaces(&self, filters: &Filters) -> Result<Vec<Workspace>>;
    async fn get_workspace(&self, workspace_id: &WorkspaceId) -> Result<Workspace>;
    /// Create a tenant workspace whose destination writes into `bucket`.
    async fn create_workspace(&self, tenant: &str, bucket: &str) -> Result<Workspace>;
    async fn update_workspace(&self, workspace: &Workspace) -> Result<Workspace>;
    async fn delete_workspace(&self, workspace_id: &WorkspaceId) -> Result<()>;

    // Source definitions

    async fn list_source_definitions(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<Vec<SourceDefinition>>;
    async fn get_source_definition_configuration(
        &self,
        workspace_id: &WorkspaceId,
        definition_id: &SourceDefinitionId,
    ) -> Result<SourceDefinitionConfiguration>;

    // Sources

    /// Create a source and return it with its platform-assigned id.
    async fn create_source(&self, workspace_id: &WorkspaceId, source: &Source) -> Result<Source>;
    async fn list_sources(&self, workspace_id: &WorkspaceId) -> Result<Vec<Source>>;
    async fn get_source(&self, source_id: &SourceId) -> Result<Source>;
    async fn update_source(&self, source: &Source) -> Result<Source>;
    async fn delete_source(&self, source_id: &SourceId) -> Result<()>;
    /// Run schema discovery against the source.
    async fn discover_tables(&self, source_id: &SourceId) -> Result<Vec<Table>>;

    // Connectors

    async fn create_connector(
        &self,
        workspace_id: &WorkspaceId,
        connector: &Connector,
    ) -> Result<Connector>;
    async fn list_connectors(&self, filters: &Filters) -> Result<Vec<Connector>>;
    async fn get_connector(&self, connector_id: &ConnectorId) -> Result<Connector>;
    async fn update_connector(&self, connector: &Connector) -> Result<Connector>;
    async fn delete_connector(&self, connector_id: &ConnectorId) -> Result<()>;

    // Jobs

    async fn trigger_job(&self, connector_id: &ConnectorId) -> Result<Job>;
    async fn list_jobs(&self, connector_id: &ConnectorId, filters: &Filters) -> Result<Vec<Job>>;
    async fn get_job(&self, job_id: i64) -> Result<Job>;
    /// Log lines of every attempt of the job, oldest attempt first.
    async fn get_job_logs(&self, job_id: i64) -> Result<Vec<String>>;
}
