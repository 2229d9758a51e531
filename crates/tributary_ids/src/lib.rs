//! Identifier wrappers shared by every Tributary crate.
//!
//! All identifiers are UUID strings. They stay `String`-backed so values
//! handed out by the extraction platform round-trip byte for byte.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Error returned when parsing a UUID-backed identifier fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    message: String,
}

impl IdParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdParseError {}

macro_rules! define_uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn parse(value: &str) -> Result<Self, IdParseError> {
                Uuid::parse_str(value)
                    .map_err(|e| IdParseError::new(format!("Invalid {}: {}", $label, e)))?;
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

define_uuid_id!(
    /// Handle for an in-flight asynchronous operation.
    ///
    /// The same value is used as the broker message uuid for the request, so
    /// a worker can find the ticket from the message alone. One generated
    /// identifier, two uses: keep them equal when publishing.
    TicketId,
    "ticket ID"
);
define_uuid_id!(SourceId, "source ID");
define_uuid_id!(SourceDefinitionId, "source definition ID");
define_uuid_id!(ConnectorId, "connector ID");
define_uuid_id!(WorkspaceId, "workspace ID");

impl SourceId {
    /// The source id with separators stripped.
    ///
    /// This is the warehouse database name of every connector built on the
    /// source, so it must never depend on anything mutable.
    pub fn without_separators(&self) -> String {
        self.0.chars().filter(|c| *c != '-').collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_parse_back() {
        let id = TicketId::new();
        let parsed = TicketId::parse(id.as_str()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_rejects_non_uuid() {
        let err = ConnectorId::parse("not-a-uuid").unwrap_err();
        assert!(err.to_string().starts_with("Invalid connector ID"));
    }

    #[test]
    fn test_source_id_without_separators() {
        let id = SourceId::parse("3f2a1c9e-0b1d-4c7a-9e55-1a2b3c4d5e6f").unwrap();
        assert_eq!(id.without_separators(), "3f2a1c9e0b1d4c7a9e551a2b3c4d5e6f");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = WorkspaceId::parse("00000000-0000-4000-8000-000000000001").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000-0000-4000-8000-000000000001\"");
    }
}
