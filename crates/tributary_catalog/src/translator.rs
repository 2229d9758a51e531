//! Discovery schema to catalog type translation.
//!
//! The extraction platform writes Parquet through an Avro conversion of the
//! discovery schema, so the catalog types produced here mirror that mapping.
//! Translation is total: shapes that cannot be represented become
//! [`CatalogType::Error`], a visible sentinel column type, never a failure.

use serde_json::{Map, Value};
use std::fmt;
use tributary_protocol::naming::clean_column_name;

use crate::metastore::CatalogColumn;

const TYPE: &str = "type";
const PROPERTIES: &str = "properties";
const ITEMS: &str = "items";
const FORMAT: &str = "format";
const AIRBYTE_TYPE: &str = "airbyte_type";
const COMPOSITION_KEYS: [&str; 3] = ["anyOf", "oneOf", "allOf"];

/// Closed vocabulary of catalog column types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogType {
    BigInt,
    Double,
    String,
    Date,
    Timestamp,
    Boolean,
    Binary,
    Struct(Vec<(String, CatalogType)>),
    Array(Box<CatalogType>),
    Error,
}

impl CatalogType {
    /// Types that get numeric statistics when profiled.
    pub fn is_numeric_name(type_name: &str) -> bool {
        type_name == "bigint" || type_name == "double"
    }

    /// True if this type or any nested member is the error sentinel.
    pub fn contains_error(&self) -> bool {
        match self {
            CatalogType::Error => true,
            CatalogType::Array(item) => item.contains_error(),
            CatalogType::Struct(members) => members.iter().any(|(_, t)| t.contains_error()),
            _ => false,
        }
    }

    fn from_scalar_tag(tag: &str) -> Self {
        match tag {
            "integer" => CatalogType::BigInt,
            "number" => CatalogType::Double,
            "string" => CatalogType::String,
            "date" => CatalogType::Date,
            "date-time" => CatalogType::Timestamp,
            "time" | "time_with_timezone" | "time_without_timezone" => CatalogType::BigInt,
            "timestamp_with_timezone" | "timestamp_without_timezone" => CatalogType::Timestamp,
            "binary" => CatalogType::Binary,
            "boolean" => CatalogType::Boolean,
            _ => CatalogType::Error,
        }
    }
}

impl fmt::Display for CatalogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogType::BigInt => f.write_str("bigint"),
            CatalogType::Double => f.write_str("double"),
            CatalogType::String => f.write_str("string"),
            CatalogType::Date => f.write_str("date"),
            CatalogType::Timestamp => f.write_str("timestamp"),
            CatalogType::Boolean => f.write_str("boolean"),
            CatalogType::Binary => f.write_str("binary"),
            CatalogType::Error => f.write_str("error"),
            CatalogType::Array(item) => write!(f, "array<{}>", item),
            CatalogType::Struct(members) => {
                f.write_str("struct<")?;
                for (i, (name, ty)) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}:{}", name, ty)?;
                }
                f.write_str(">")
            }
        }
    }
}

/// Translate one discovery schema node into a catalog type.
pub fn translate(schema: &Value) -> CatalogType {
    match schema.as_object() {
        Some(node) => translate_node(node),
        None => CatalogType::Error,
    }
}

fn translate_node(node: &Map<String, Value>) -> CatalogType {
    let declared = declared_type(node);
    match declared {
        Some("object") => match node.get(PROPERTIES) {
            Some(Value::Object(properties)) => CatalogType::Struct(
                properties
                    .iter()
                    .map(|(name, member)| (name.clone(), translate(member)))
                    .collect(),
            ),
            _ => CatalogType::Error,
        },
        Some("array") => match node.get(ITEMS) {
            Some(items) => CatalogType::Array(Box::new(translate(items))),
            None => CatalogType::Error,
        },
        None if has_composition(node) => translate_node(&merge_branches(node)),
        _ => {
            let tag = hint(node, AIRBYTE_TYPE)
                .or_else(|| hint(node, FORMAT))
                .or(declared);
            tag.map(CatalogType::from_scalar_tag)
                .unwrap_or(CatalogType::Error)
        }
    }
}

/// `type` as declared; for the nullable-union form, the first non-null
/// alternative.
fn declared_type(node: &Map<String, Value>) -> Option<&str> {
    match node.get(TYPE)? {
        Value::String(s) => Some(s.as_str()),
        Value::Array(alternatives) => alternatives
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null"),
        _ => None,
    }
}

fn hint<'a>(node: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    node.get(key).and_then(Value::as_str)
}

fn has_composition(node: &Map<String, Value>) -> bool {
    COMPOSITION_KEYS.iter().any(|k| node.contains_key(*k))
}

/// Merge every `anyOf`/`oneOf`/`allOf` branch into one schema.
///
/// Later branches win on scalar collisions; objects present on both sides
/// are merged member by member, so properties from every branch survive.
/// The result is a union of fields, not a sum type.
fn merge_branches(node: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = Map::new();
    for key in COMPOSITION_KEYS {
        let Some(Value::Array(branches)) = node.get(key) else {
            continue;
        };
        for branch in branches.iter().filter_map(Value::as_object) {
            merge_into(&mut merged, branch);
        }
    }
    merged
}

fn merge_into(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Catalog columns for the top-level properties of a table schema.
///
/// Top-level names have path separators replaced (and are lowercased when
/// `lowercase` is set); nested struct member names are kept as reported.
/// A schema without top-level properties yields no columns.
pub fn columns_from_schema(schema: &Value, lowercase: bool) -> Vec<CatalogColumn> {
    let Some(Value::Object(properties)) = schema.get(PROPERTIES) else {
        return Vec::new();
    };
    properties
        .iter()
        .map(|(name, node)| {
            CatalogColumn::new(clean_column_name(name, lowercase), translate(node).to_string())
        })
        .collect()
}
