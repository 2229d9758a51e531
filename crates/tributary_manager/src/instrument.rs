//! Logging and metrics decorator for the extraction platform.
//!
//! Wraps any [`ExtractionPlatform`] at construction time; the service never
//! knows it is talking to a decorator.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use tributary_extractor::{ExtractionPlatform, Filters, Result};
use tributary_protocol::{
    Connector, ConnectorId, Job, Source, SourceDefinition, SourceDefinitionConfiguration,
    SourceDefinitionId, SourceId, Table, Workspace, WorkspaceId,
};

/// Call counters for one decorated platform.
#[derive(Debug, Default)]
pub struct ExtractorMetrics {
    pub calls: AtomicU64,
    pub failures: AtomicU64,
    /// Cumulative microseconds spent in platform calls.
    pub call_time_us: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtractorMetricsSnapshot {
    pub calls: u64,
    pub failures: u64,
    pub call_time_us: u64,
}

impl ExtractorMetrics {
    pub fn snapshot(&self) -> ExtractorMetricsSnapshot {
        ExtractorMetricsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            call_time_us: self.call_time_us.load(Ordering::Relaxed),
        }
    }

    /// Average call latency in microseconds
    pub fn avg_call_time_us(&self) -> u64 {
        let calls = self.calls.load(Ordering::Relaxed);
        if calls == 0 {
            return 0;
        }
        self.call_time_us.load(Ordering::Relaxed) / calls
    }
}

pub struct InstrumentedExtractor {
    inner: Arc<dyn ExtractionPlatform>,
    metrics: Arc<ExtractorMetrics>,
}

impl InstrumentedExtractor {
    pub fn new(inner: Arc<dyn ExtractionPlatform>) -> Self {
        Self {
            inner,
            metrics: Arc::new(ExtractorMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<ExtractorMetrics> {
        self.metrics.clone()
    }

    fn record<T>(&self, op: &'static str, started: Instant, result: &Result<T>) {
        let elapsed = started.elapsed();
        self.metrics.calls.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .call_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        match result {
            Ok(_) => debug!(op, elapsed_ms = elapsed.as_millis() as u64, "Platform call succeeded"),
            Err(e) => {
                self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    op,
                    elapsed_ms = elapsed.as_millis() as u64,
                    status = ?e.status_code(),
                    "Platform call failed: {}",
                    e
                );
            }
        }
    }
}

macro_rules! observed {
    ($self:ident, $op:literal, $call:expr) => {{
        let started = Instant::now();
        let result = $call.await;
        $self.record($op, started, &result);
        result
    }};
}

#[async_trait]
impl ExtractionPlatform for InstrumentedExtractor {
    async fn list_workspaces(&self, filters: &Filters) -> Result<Vec<Workspace>> {
        observed!(self, "list_workspaces", self.inner.list_workspaces(filters))
    }

    async fn get_workspace(&self, workspace_id: &WorkspaceId) -> Result<Workspace> {
        observed!(self, "get_workspace", self.inner.get_workspace(workspace_id))
    }

    async fn create_workspace(&self, tenant: &str, bucket: &str) -> Result<Workspace> {
        observed!(self, "create_workspace", self.inner.create_workspace(tenant, bucket))
    }

    async fn update_workspace(&self, workspace: &Workspace) -> Result<Workspace> {
        observed!(self, "update_workspace", self.inner.update_workspace(workspace))
    }

    async fn delete_workspace(&self, workspace_id: &WorkspaceId) -> Result<()> {
        observed!(self, "delete_workspace", self.inner.delete_workspace(workspace_id))
    }

    async fn list_source_definitions(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<Vec<SourceDefinition>> {
        observed!(
            self,
            "list_source_definitions",
            self.inner.list_source_definitions(workspace_id)
        )
    }

    async fn get_source_definition_configuration(
        &self,
        workspace_id: &WorkspaceId,
        definition_id: &SourceDefinitionId,
    ) -> Result<SourceDefinitionConfiguration> {
        observed!(
            self,
            "get_source_definition_configuration",
            self.inner
                .get_source_definition_configuration(workspace_id, definition_id)
        )
    }

    async fn create_source(&self, workspace_id: &WorkspaceId, source: &Source) -> Result<Source> {
        observed!(self, "create_source", self.inner.create_source(workspace_id, source))
    }

    async fn list_sources(&self, workspace_id: &WorkspaceId) -> Result<Vec<Source>> {
        observed!(self, "list_sources", self.inner.list_sources(workspace_id))
    }

    async fn get_source(&self, source_id: &SourceId) -> Result<Source> {
        observed!(self, "get_source", self.inner.get_source(source_id))
    }

    async fn update_source(&self, source: &Source) -> Result<Source> {
        observed!(self, "update_source", self.inner.update_source(source))
    }

    async fn delete_source(&self, source_id: &SourceId) -> Result<()> {
        observed!(self, "delete_source", self.inner.delete_source(source_id))
    }

    async fn discover_tables(&self, source_id: &SourceId) -> Result<Vec<Table>> {
        observed!(self, "discover_tables", self.inner.discover_tables(source_id))
    }

    async fn create_connector(
        &self,
        workspace_id: &WorkspaceId,
        connector: &Connector,
    ) -> Result<Connector> {
        observed!(
            self,
            "create_connector",
            self.inner.create_connector(workspace_id, connector)
        )
    }

    async fn list_connectors(&self, filters: &Filters) -> Result<Vec<Connector>> {
        observed!(self, "list_connectors", self.inner.list_connectors(filters))
    }

    async fn get_connector(&self, connector_id: &ConnectorId) -> Result<Connector> {
        observed!(self, "get_connector", self.inner.get_connector(connector_id))
    }

    async fn update_connector(&self, connector: &Connector) -> Result<Connector> {
        observed!(self, "update_connector", self.inner.update_connector(connector))
    }

    async fn delete_connector(&self, connector_id: &ConnectorId) -> Result<()> {
        observed!(self, "delete_connector", self.inner.delete_connector(connector_id))
    }

    async fn trigger_job(&self, connector_id: &ConnectorId) -> Result<Job> {
        observed!(self, "trigger_job", self.inner.trigger_job(connector_id))
    }

    async fn list_jobs(&self, connector_id: &ConnectorId, filters: &Filters) -> Result<Vec<Job>> {
        observed!(self, "list_jobs", self.inner.list_jobs(connector_id, filters))
    }

    async fn get_job(&self, job_id: i64) -> Result<Job> {
        observed!(self, "get_job", self.inner.get_job(job_id))
    }

    async fn get_job_logs(&self, job_id: i64) -> Result<Vec<String>> {
        observed!(self, "get_job_logs", self.inner.get_job_logs(job_id))
    }
}
