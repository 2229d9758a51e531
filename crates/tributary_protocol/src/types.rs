//! The extraction-platform view of workspaces, sources, tables and connectors.
//!
//! None of these are persisted by Tributary; they are fetched from and written
//! to the extraction platform. Field names follow its camelCase JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tributary_ids::{ConnectorId, SourceDefinitionId, SourceId, WorkspaceId};

use crate::naming;

/// Opaque configuration blob owned by the extraction platform.
pub type Configuration = Map<String, Value>;

// ============================================================================
// Workspaces and source definitions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<WorkspaceId>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDefinition {
    pub source_definition_id: SourceDefinitionId,
    pub name: String,
    #[serde(default)]
    pub documentation_url: String,
    #[serde(default)]
    pub icon: String,
}

/// Configuration schema a source of a given definition must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDefinitionConfiguration {
    pub source_definition_id: SourceDefinitionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    #[serde(default)]
    pub source_configuration: Configuration,
}

// ============================================================================
// Sources
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub source_definition_id: SourceDefinitionId,
    /// Absent until the platform has created the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<SourceId>,
    pub name: String,
    #[serde(default)]
    pub documentation_url: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Configuration>,
}

// ============================================================================
// Tables
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    FullRefresh,
    Incremental,
}

/// A stream discovered on a source, as declared on a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub name: String,
    /// Discovery schema: a nested, union-typed JSON schema tree.
    #[serde(default)]
    pub json_schema: Value,
    #[serde(default)]
    pub supported_sync_modes: Vec<SyncMode>,
    #[serde(default)]
    pub source_defined_cursor: bool,
    #[serde(default)]
    pub default_cursor_field: Vec<String>,
    /// Composite key: a list of key paths.
    #[serde(default)]
    pub source_defined_primary_key: Vec<Vec<String>>,
    #[serde(default)]
    pub sync_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_cursor_field: Option<Vec<String>>,
}

impl Table {
    pub fn new(name: impl Into<String>, json_schema: Value) -> Self {
        Self {
            name: name.into(),
            json_schema,
            supported_sync_modes: vec![SyncMode::FullRefresh],
            source_defined_cursor: false,
            default_cursor_field: Vec::new(),
            source_defined_primary_key: Vec::new(),
            sync_enabled: false,
            namespace: None,
            selected_cursor_field: None,
        }
    }

    pub fn enabled(mut self, sync_enabled: bool) -> Self {
        self.sync_enabled = sync_enabled;
        self
    }

    /// Catalog identifier for this table.
    pub fn physical_name(&self) -> String {
        naming::physical_table_name(&self.name)
    }

    /// Folder segment the extraction platform writes this table under.
    pub fn folder_name(&self) -> String {
        naming::table_folder_name(&self.name)
    }
}

// ============================================================================
// Connectors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    #[default]
    Manual,
    Basic,
    Cron,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicSchedule {
    pub time_unit: TimeUnit,
    pub units: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronSchedule {
    pub time_zone: String,
    pub expression: String,
}

/// Either a basic interval or a cron expression, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Schedule {
    BasicSchedule(BasicSchedule),
    CronSchedule(CronSchedule),
}

/// Kubernetes-style resource limits for sync jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_request: Option<String>,
}

/// A source activated and linked to the shared storage destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ConnectorId>,
    pub source_id: SourceId,
    /// Physical catalog database. Set by the catalog when the database is
    /// created; derived from `source_id`, never from user input.
    #[serde(default)]
    pub warehouse_database: String,
    pub name: String,
    #[serde(default)]
    pub schedule_type: ScheduleType,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub source_configuration: Configuration,
    #[serde(default)]
    pub destination_configuration: Configuration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_requirements: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

impl Connector {
    pub fn new(source_id: SourceId, name: impl Into<String>) -> Self {
        Self {
            id: None,
            source_id,
            warehouse_database: String::new(),
            name: name.into(),
            schedule_type: ScheduleType::Manual,
            tables: Vec::new(),
            source_configuration: Configuration::new(),
            destination_configuration: Configuration::new(),
            resource_requirements: None,
            schedule: None,
        }
    }

    /// Warehouse database name: the source id with separators stripped.
    ///
    /// Table locations are computed from this name, so it must stay stable
    /// for the connector's lifetime.
    pub fn warehouse_database_name(&self) -> String {
        self.source_id.without_separators()
    }

    /// Tables that should exist in the catalog.
    pub fn enabled_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter().filter(|t| t.sync_enabled)
    }
}

// ============================================================================
// Jobs
// ============================================================================

/// A sync job run by the extraction platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: i64,
    pub status: String,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bytes_synced: i64,
    #[serde(default)]
    pub rows_synced: i64,
}
