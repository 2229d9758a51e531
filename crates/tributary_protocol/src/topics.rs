//! Broker topics and the operation kinds routed over them.

pub const CREATE_SOURCE_REQUESTS: &str = "create-source-requests";
pub const CREATE_SOURCE_RESPONSES: &str = "create-source-responses";
pub const UPDATE_SOURCE_REQUESTS: &str = "update-source-requests";
pub const UPDATE_SOURCE_RESPONSES: &str = "update-source-responses";
pub const GET_TABLES_REQUESTS: &str = "get-tables-requests";
pub const GET_TABLES_RESPONSES: &str = "get-tables-responses";
pub const CREATE_CONNECTOR_REQUESTS: &str = "create-connector-requests";
pub const CREATE_CONNECTOR_RESPONSES: &str = "create-connector-responses";
pub const SYNC_NOTIFICATION_REQUESTS: &str = "successful-sync-notifications-requests";
pub const SYNC_NOTIFICATION_RESPONSES: &str = "successful-sync-notifications-responses";
pub const DEAD_LETTER: &str = "dead-letter";

/// Asynchronous operations handled by workers, one topic pair each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    CreateSource,
    UpdateSource,
    DiscoverTables,
    CreateConnector,
    SyncNotification,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::CreateSource,
        OperationKind::UpdateSource,
        OperationKind::DiscoverTables,
        OperationKind::CreateConnector,
        OperationKind::SyncNotification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::CreateSource => "create_source",
            OperationKind::UpdateSource => "update_source",
            OperationKind::DiscoverTables => "discover_tables",
            OperationKind::CreateConnector => "create_connector",
            OperationKind::SyncNotification => "sync_notification",
        }
    }

    pub fn request_topic(&self) -> &'static str {
        match self {
            OperationKind::CreateSource => CREATE_SOURCE_REQUESTS,
            OperationKind::UpdateSource => UPDATE_SOURCE_REQUESTS,
            OperationKind::DiscoverTables => GET_TABLES_REQUESTS,
            OperationKind::CreateConnector => CREATE_CONNECTOR_REQUESTS,
            OperationKind::SyncNotification => SYNC_NOTIFICATION_REQUESTS,
        }
    }

    pub fn response_topic(&self) -> &'static str {
        match self {
            OperationKind::CreateSource => CREATE_SOURCE_RESPONSES,
            OperationKind::UpdateSource => UPDATE_SOURCE_RESPONSES,
            OperationKind::DiscoverTables => GET_TABLES_RESPONSES,
            OperationKind::CreateConnector => CREATE_CONNECTOR_RESPONSES,
            OperationKind::SyncNotification => SYNC_NOTIFICATION_RESPONSES,
        }
    }

    /// Whether submissions of this kind are tracked by a ticket.
    pub fn is_ticketed(&self) -> bool {
        !matches!(self, OperationKind::SyncNotification)
    }

    pub fn from_request_topic(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.request_topic() == topic)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_topics_are_unique() {
        let mut seen = HashSet::new();
        for kind in OperationKind::ALL {
            assert!(seen.insert(kind.request_topic()));
            assert!(seen.insert(kind.response_topic()));
        }
        assert!(!seen.contains(DEAD_LETTER));
    }

    #[test]
    fn test_from_request_topic() {
        assert_eq!(
            OperationKind::from_request_topic("get-tables-requests"),
            Some(OperationKind::DiscoverTables)
        );
        assert_eq!(OperationKind::from_request_topic(DEAD_LETTER), None);
    }
}
