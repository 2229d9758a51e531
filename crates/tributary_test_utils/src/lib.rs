//! Recording fakes of the capabilities Tributary drives.
//!
//! Each fake keeps its state in memory, records every call, and can be told
//! to fail a named operation so error paths can be exercised without real
//! services.

pub mod compute;
pub mod extractor;
pub mod metastore;

pub use compute::FakeComputeEngine;
pub use extractor::{FakeExtractor, InjectedFailure};
pub use metastore::{FakeMetastore, MetastoreCall};

use serde_json::{json, Map, Value};
use tributary_protocol::{Connector, SourceId, Table};

/// Destination configuration accepted by the catalog reconciler.
pub fn destination_config(bucket: &str, path: &str) -> Map<String, Value> {
    let mut config = Map::new();
    config.insert("s3_bucket_name".into(), json!(bucket));
    config.insert("s3_bucket_path".into(), json!(path));
    config
}

/// A connector on `source_id` with a valid destination and the given tables.
pub fn connector_with_tables(source_id: SourceId, tables: Vec<Table>) -> Connector {
    let mut connector = Connector::new(source_id, "test connector");
    connector.destination_configuration = destination_config("lake", "raw");
    connector.tables = tables;
    connector
}

/// A flat object schema with the given `(name, json type)` properties.
pub fn object_schema(properties: &[(&str, &str)]) -> Value {
    let props: Map<String, Value> = properties
        .iter()
        .map(|(name, ty)| (name.to_string(), json!({ "type": ty })))
        .collect();
    json!({ "type": "object", "properties": props })
}
