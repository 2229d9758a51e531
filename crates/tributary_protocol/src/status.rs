//! Ticket status records.
//!
//! Each operation kind has its own record shape; the status store holds
//! whatever was written last and callers interpret it by kind.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tributary_ids::{ConnectorId, SourceId};

use crate::types::{Source, Table};

/// Lifecycle of a ticket. Terminal once it leaves `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    #[default]
    Pending,
    Finished,
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Finished => "finished",
            OperationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Pending)
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read the `status` field of any stored record without knowing its kind.
pub fn status_of(value: &Value) -> Option<OperationStatus> {
    value
        .get("status")
        .and_then(|s| serde_json::from_value(s.clone()).ok())
}

/// A kind-specific status payload stored under a ticket.
pub trait StatusRecord: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn pending() -> Self;
    fn failed(error: String) -> Self;
    fn status(&self) -> OperationStatus;
    fn error(&self) -> Option<&str>;
}

macro_rules! status_record {
    ($name:ident { $field:ident : $ty:ty }) => {
        impl StatusRecord for $name {
            fn pending() -> Self {
                Self {
                    $field: <$ty>::default(),
                    status: OperationStatus::Pending,
                    error: None,
                }
            }

            fn failed(error: String) -> Self {
                Self {
                    $field: <$ty>::default(),
                    status: OperationStatus::Failed,
                    error: Some(error),
                }
            }

            fn status(&self) -> OperationStatus {
                self.status
            }

            fn error(&self) -> Option<&str> {
                self.error.as_deref()
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSourceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<SourceId>,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CreateSourceStatus {
    pub fn finished(source_id: SourceId) -> Self {
        Self {
            source_id: Some(source_id),
            status: OperationStatus::Finished,
            error: None,
        }
    }
}

status_record!(CreateSourceStatus { source_id: Option<SourceId> });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSourceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpdateSourceStatus {
    pub fn finished(source: Source) -> Self {
        Self {
            source: Some(source),
            status: OperationStatus::Finished,
            error: None,
        }
    }
}

status_record!(UpdateSourceStatus { source: Option<Source> });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSourceTablesStatus {
    #[serde(default)]
    pub tables: Vec<Table>,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GetSourceTablesStatus {
    pub fn finished(tables: Vec<Table>) -> Self {
        Self {
            tables,
            status: OperationStatus::Finished,
            error: None,
        }
    }
}

status_record!(GetSourceTablesStatus { tables: Vec<Table> });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConnectorStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<ConnectorId>,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CreateConnectorStatus {
    pub fn finished(connector_id: ConnectorId) -> Self {
        Self {
            connector_id: Some(connector_id),
            status: OperationStatus::Finished,
            error: None,
        }
    }
}

status_record!(CreateConnectorStatus { connector_id: Option<ConnectorId> });
