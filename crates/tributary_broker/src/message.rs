use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::Result;

pub type Metadata = BTreeMap<String, String>;

/// A broker message: correlation uuid, opaque payload, string metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub uuid: String,
    pub payload: Vec<u8>,
    pub metadata: Metadata,
}

impl Message {
    pub fn new(uuid: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            uuid: uuid.into(),
            payload: payload.into(),
            metadata: Metadata::new(),
        }
    }

    /// JSON-encode `value` as the payload.
    pub fn json<T: Serialize>(uuid: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self::new(uuid, serde_json::to_vec(value)?))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
