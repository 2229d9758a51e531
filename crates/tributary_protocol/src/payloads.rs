//! Request bodies published on the request topics.

use serde::{Deserialize, Serialize};
use tributary_ids::{ConnectorId, SourceId, WorkspaceId};

use crate::types::{Connector, Source};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSourceRequest {
    pub workspace_id: WorkspaceId,
    pub source: Source,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverTablesRequest {
    pub source_id: SourceId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConnectorRequest {
    pub workspace_id: WorkspaceId,
    pub connector: Connector,
}

/// Sent by the extraction platform after a successful sync.
///
/// `connection_id` is the connector id on the platform side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncNotification {
    pub workspace_id: WorkspaceId,
    pub connection_id: ConnectorId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_source_request_shape() {
        let request: CreateSourceRequest = serde_json::from_value(json!({
            "workspaceId": "00000000-0000-4000-8000-000000000001",
            "source": {
                "sourceDefinitionId": "00000000-0000-4000-8000-000000000002",
                "name": "postgres",
                "configuration": {"host": "db", "port": 5432}
            }
        }))
        .unwrap();
        assert_eq!(request.source.name, "postgres");
        assert!(request.source.source_id.is_none());
        assert_eq!(request.source.configuration.unwrap()["port"], json!(5432));
    }
}
