use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tributary_extractor::{ExtractionPlatform, ExtractorError, Filters, Result};
use tributary_protocol::{
    Connector, ConnectorId, Job, Source, SourceDefinition, SourceDefinitionConfiguration,
    SourceDefinitionId, SourceId, Table, Workspace, WorkspaceId,
};

/// A failure the fake returns instead of doing the work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectedFailure {
    Api { code: u16, body: String },
    Transport(String),
}

impl InjectedFailure {
    fn to_error(&self) -> ExtractorError {
        match self {
            InjectedFailure::Api { code, body } => ExtractorError::api(*code, body),
            InjectedFailure::Transport(msg) => ExtractorError::transport(msg.clone()),
        }
    }
}

#[derive(Default)]
struct State {
    workspaces: BTreeMap<WorkspaceId, Workspace>,
    definitions: Vec<SourceDefinitionConfiguration>,
    definition_names: HashMap<SourceDefinitionId, String>,
    sources: BTreeMap<SourceId, (WorkspaceId, Source)>,
    discovered: HashMap<SourceId, Vec<Table>>,
    connectors: BTreeMap<ConnectorId, (WorkspaceId, Connector)>,
    jobs: BTreeMap<i64, (ConnectorId, Job)>,
    job_logs: HashMap<i64, Vec<String>>,
    next_job_id: i64,
    calls: Vec<&'static str>,
    failures: HashMap<&'static str, InjectedFailure>,
}

/// In-memory extraction platform that records every call.
#[derive(Default)]
pub struct FakeExtractor {
    state: Mutex<State>,
}

fn not_found(what: &str, id: impl std::fmt::Display) -> ExtractorError {
    ExtractorError::api(404, format!("{} {} not found", what, id))
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, op: &'static str) -> Result<std::sync::MutexGuard<'_, State>> {
        let mut state = self.state();
        state.calls.push(op);
        if let Some(failure) = state.failures.get(op) {
            return Err(failure.to_error());
        }
        Ok(state)
    }

    // ------------------------------------------------------------------
    // Failure injection and inspection
    // ------------------------------------------------------------------

    pub fn fail_on(&self, op: &'static str, failure: InjectedFailure) {
        self.state().failures.insert(op, failure);
    }

    pub fn fail_api(&self, op: &'static str, code: u16, body: &str) {
        self.fail_on(
            op,
            InjectedFailure::Api {
                code,
                body: body.to_string(),
            },
        );
    }

    pub fn clear_failure(&self, op: &'static str) {
        self.state().failures.remove(op);
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == op).count()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    pub fn add_workspace(&self, name: &str) -> WorkspaceId {
        let id = WorkspaceId::new();
        self.state().workspaces.insert(
            id.clone(),
            Workspace {
                id: Some(id.clone()),
                name: name.to_string(),
            },
        );
        id
    }

    pub fn add_source_definition(
        &self,
        name: &str,
        configuration: serde_json::Map<String, serde_json::Value>,
    ) -> SourceDefinitionId {
        let id = SourceDefinitionId::new();
        let mut state = self.state();
        state.definition_names.insert(id.clone(), name.to_string());
        state.definitions.push(SourceDefinitionConfiguration {
            source_definition_id: id.clone(),
            documentation_url: Some(format!("https://docs.example.com/{}", name)),
            source_configuration: configuration,
        });
        id
    }

    /// Insert a source directly, bypassing `create_source`.
    pub fn add_source(&self, workspace_id: &WorkspaceId, name: &str) -> SourceId {
        let id = SourceId::new();
        let source = Source {
            source_definition_id: SourceDefinitionId::new(),
            source_id: Some(id.clone()),
            name: name.to_string(),
            documentation_url: String::new(),
            icon: String::new(),
            configuration: None,
        };
        self.state()
            .sources
            .insert(id.clone(), (workspace_id.clone(), source));
        id
    }

    pub fn set_discovered_tables(&self, source_id: &SourceId, tables: Vec<Table>) {
        self.state().discovered.insert(source_id.clone(), tables);
    }

    pub fn set_job_logs(&self, job_id: i64, lines: Vec<String>) {
        self.state().job_logs.insert(job_id, lines);
    }

    pub fn source(&self, source_id: &SourceId) -> Option<Source> {
        self.state().sources.get(source_id).map(|(_, s)| s.clone())
    }

    pub fn connector(&self, connector_id: &ConnectorId) -> Option<Connector> {
        self.state()
            .connectors
            .get(connector_id)
            .map(|(_, c)| c.clone())
    }

    pub fn connector_count(&self) -> usize {
        self.state().connectors.len()
    }
}

#[async_trait]
impl ExtractionPlatform for FakeExtractor {
    async fn list_workspaces(&self, filters: &Filters) -> Result<Vec<Workspace>> {
        let state = self.enter("list_workspaces")?;
        let all: Vec<Workspace> = state
            .workspaces
            .values()
            .filter(|w| {
                filters
                    .name_contains
                    .as_deref()
                    .map_or(true, |needle| w.name.contains(needle))
            })
            .cloned()
            .collect();
        Ok(filters.paginate(all))
    }

    async fn get_workspace(&self, workspace_id: &WorkspaceId) -> Result<Workspace> {
        let state = self.enter("get_workspace")?;
        state
            .workspaces
            .get(workspace_id)
            .cloned()
            .ok_or_else(|| not_found("workspace", workspace_id))
    }

    async fn create_workspace(&self, tenant: &str, bucket: &str) -> Result<Workspace> {
        let mut state = self.enter("create_workspace")?;
        if bucket.is_empty() {
            return Err(ExtractorError::api(422, "bucket is required"));
        }
        let id = WorkspaceId::new();
        let workspace = Workspace {
            id: Some(id.clone()),
            name: tenant.to_string(),
        };
        state.workspaces.insert(id, workspace.clone());
        Ok(workspace)
    }

    async fn update_workspace(&self, workspace: &Workspace) -> Result<Workspace> {
        let mut state = self.enter("update_workspace")?;
        let id = workspace
            .id
            .clone()
            .ok_or_else(|| ExtractorError::invalid_request("workspace id is required"))?;
        let slot = state
            .workspaces
            .get_mut(&id)
            .ok_or_else(|| not_found("workspace", &id))?;
        *slot = workspace.clone();
        Ok(workspace.clone())
    }

    async fn delete_workspace(&self, workspace_id: &WorkspaceId) -> Result<()> {
        let mut state = self.enter("delete_workspace")?;
        state
            .workspaces
            .remove(workspace_id)
            .map(|_| ())
            .ok_or_else(|| not_found("workspace", workspace_id))
    }

    async fn list_source_definitions(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<Vec<SourceDefinition>> {
        let state = self.enter("list_source_definitions")?;
        if !state.workspaces.contains_key(workspace_id) {
            return Err(not_found("workspace", workspace_id));
        }
        Ok(state
            .definitions
            .iter()
            .map(|d| SourceDefinition {
                source_definition_id: d.source_definition_id.clone(),
                name: state
                    .definition_names
                    .get(&d.source_definition_id)
                    .cloned()
                    .unwrap_or_default(),
                documentation_url: d.documentation_url.clone().unwrap_or_default(),
                icon: String::new(),
            })
            .collect())
    }

    async fn get_source_definition_configuration(
        &self,
        _workspace_id: &WorkspaceId,
        definition_id: &SourceDefinitionId,
    ) -> Result<SourceDefinitionConfiguration> {
        let state = self.enter("get_source_definition_configuration")?;
        state
            .definitions
            .iter()
            .find(|d| &d.source_definition_id == definition_id)
            .cloned()
            .ok_or_else(|| not_found("source definition", definition_id))
    }

    async fn create_source(&self, workspace_id: &WorkspaceId, source: &Source) -> Result<Source> {
        let mut state = self.enter("create_source")?;
        if !state.workspaces.contains_key(workspace_id) {
            return Err(not_found("workspace", workspace_id));
        }
        let id = SourceId::new();
        let mut created = source.clone();
        created.source_id = Some(id.clone());
        state
            .sources
            .insert(id, (workspace_id.clone(), created.clone()));
        Ok(created)
    }

    async fn list_sources(&self, workspace_id: &WorkspaceId) -> Result<Vec<Source>> {
        let state = self.enter("list_sources")?;
        Ok(state
            .sources
            .values()
            .filter(|(ws, _)| ws == workspace_id)
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn get_source(&self, source_id: &SourceId) -> Result<Source> {
        let state = self.enter("get_source")?;
        state
            .sources
            .get(source_id)
            .map(|(_, s)| s.clone())
            .ok_or_else(|| not_found("source", source_id))
    }

    async fn update_source(&self, source: &Source) -> Result<Source> {
        let mut state = self.enter("update_source")?;
        let id = source
            .source_id
            .clone()
            .ok_or_else(|| ExtractorError::invalid_request("source id is required"))?;
        let (_, slot) = state
            .sources
            .get_mut(&id)
            .ok_or_else(|| not_found("source", &id))?;
        *slot = source.clone();
        Ok(source.clone())
    }

    async fn delete_source(&self, source_id: &SourceId) -> Result<()> {
        let mut state = self.enter("delete_source")?;
        state
            .sources
            .remove(source_id)
            .map(|_| ())
            .ok_or_else(|| not_found("source", source_id))
    }

    async fn discover_tables(&self, source_id: &SourceId) -> Result<Vec<Table>> {
        let state = self.enter("discover_tables")?;
        if !state.sources.contains_key(source_id) {
            return Err(not_found("source", source_id));
        }
        Ok(state.discovered.get(source_id).cloned().unwrap_or_default())
    }

    async fn create_connector(
        &self,
        workspace_id: &WorkspaceId,
        connector: &Connector,
    ) -> Result<Connector> {
        let mut state = self.enter("create_connector")?;
        if !state.sources.contains_key(&connector.source_id) {
            return Err(not_found("source", &connector.source_id));
        }
        let id = ConnectorId::new();
        let mut created = connector.clone();
        created.id = Some(id.clone());
        state
            .connectors
            .insert(id, (workspace_id.clone(), created.clone()));
        Ok(created)
    }

    async fn list_connectors(&self, filters: &Filters) -> Result<Vec<Connector>> {
        let state = self.enter("list_connectors")?;
        let all: Vec<Connector> = state
            .connectors
            .values()
            .filter(|(ws, _)| filters.workspace_id.as_ref().map_or(true, |w| w == ws))
            .filter(|(_, c)| {
                filters
                    .name_contains
                    .as_deref()
                    .map_or(true, |needle| c.name.contains(needle))
            })
            .map(|(_, c)| c.clone())
            .collect();
        Ok(filters.paginate(all))
    }

    async fn get_connector(&self, connector_id: &ConnectorId) -> Result<Connector> {
        let state = self.enter("get_connector")?;
        state
            .connectors
            .get(connector_id)
            .map(|(_, c)| c.clone())
            .ok_or_else(|| not_found("connector", connector_id))
    }

    async fn update_connector(&self, connector: &Connector) -> Result<Connector> {
        let mut state = self.enter("update_connector")?;
        let id = connector
            .id
            .clone()
            .ok_or_else(|| ExtractorError::invalid_request("connector id is required"))?;
        let (_, slot) = state
            .connectors
            .get_mut(&id)
            .ok_or_else(|| not_found("connector", &id))?;
        *slot = connector.clone();
        Ok(connector.clone())
    }

    async fn delete_connector(&self, connector_id: &ConnectorId) -> Result<()> {
        let mut state = self.enter("delete_connector")?;
        state
            .connectors
            .remove(connector_id)
            .map(|_| ())
            .ok_or_else(|| not_found("connector", connector_id))
    }

    async fn trigger_job(&self, connector_id: &ConnectorId) -> Result<Job> {
        let mut state = self.enter("trigger_job")?;
        if !state.connectors.contains_key(connector_id) {
            return Err(not_found("connector", connector_id));
        }
        state.next_job_id += 1;
        let job = Job {
            id: state.next_job_id,
            status: "pending".to_string(),
            created_at: None,
            updated_at: None,
            bytes_synced: 0,
            rows_synced: 0,
        };
        state
            .jobs
            .insert(job.id, (connector_id.clone(), job.clone()));
        Ok(job)
    }

    async fn list_jobs(&self, connector_id: &ConnectorId, filters: &Filters) -> Result<Vec<Job>> {
        let state = self.enter("list_jobs")?;
        let all: Vec<Job> = state
            .jobs
            .values()
            .filter(|(c, _)| c == connector_id)
            .filter(|(_, j)| filters.status.as_deref().map_or(true, |s| j.status == s))
            .map(|(_, j)| j.clone())
            .collect();
        Ok(filters.paginate(all))
    }

    async fn get_job(&self, job_id: i64) -> Result<Job> {
        let state = self.enter("get_job")?;
        state
            .jobs
            .get(&job_id)
            .map(|(_, j)| j.clone())
            .ok_or_else(|| not_found("job", job_id))
    }

    async fn get_job_logs(&self, job_id: i64) -> Result<Vec<String>> {
        let state = self.enter("get_job_logs")?;
        if !state.jobs.contains_key(&job_id) {
            return Err(not_found("job", job_id));
        }
        Ok(state.job_logs.get(&job_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_source_assigns_id() {
        let fake = FakeExtractor::new();
        let ws = fake.add_workspace("tenant");
        let source = Source {
            source_definition_id: SourceDefinitionId::new(),
            source_id: None,
            name: "pg".into(),
            documentation_url: String::new(),
            icon: String::new(),
            configuration: None,
        };

        let created = fake.create_source(&ws, &source).await.unwrap();
        let id = created.source_id.unwrap();
        assert_eq!(fake.source(&id).unwrap().name, "pg");
        assert_eq!(fake.call_count("create_source"), 1);
    }

    #[tokio::test]
    async fn test_injected_api_failure() {
        let fake = FakeExtractor::new();
        fake.fail_api("get_source", 503, "busy");

        let err = fake.get_source(&SourceId::new()).await.unwrap_err();
        assert_eq!(err.status_code(), Some(503));

        fake.clear_failure("get_source");
        let err = fake.get_source(&SourceId::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
