//! Discovery schema cleaning.
//!
//! Platforms report discovery schemas with annotations, empty property
//! nodes and shapes no catalog reader can handle. Cleaning keeps only the
//! keys the translator understands and drops properties that carry nothing.

use serde_json::{Map, Value};

const TYPE: &str = "type";
const PROPERTIES: &str = "properties";
const ITEMS: &str = "items";
const FORMAT: &str = "format";
const AIRBYTE_TYPE: &str = "airbyte_type";
const COMPOSITION_KEYS: [&str; 3] = ["anyOf", "oneOf", "allOf"];

/// Reduce a discovery schema to `type`, `properties`, `items`, composition
/// branches, `format` and `airbyte_type`.
///
/// Returns an empty object for nodes with no usable type. Property nodes
/// that are empty before or after cleaning are removed.
pub fn clean_discovery_schema(schema: &Value) -> Value {
    let Some(node) = schema.as_object() else {
        return Value::Object(Map::new());
    };
    Value::Object(clean_node(node))
}

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

fn clean_node(node: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();

    let Some(ty) = declared_type(node) else {
        for key in COMPOSITION_KEYS {
            if let Some(Value::Array(branches)) = node.get(key) {
                let cleaned = branches.iter().map(clean_discovery_schema).collect();
                out.insert(key.to_string(), Value::Array(cleaned));
            }
        }
        return out;
    };

    match ty {
        "object" => {
            let Some(Value::Object(properties)) = node.get(PROPERTIES) else {
                return out;
            };
            let mut cleaned = Map::new();
            for (name, property) in properties {
                let Some(property) = property.as_object().filter(|p| !p.is_empty()) else {
                    continue;
                };
                let value = clean_node(property);
                if !value.is_empty() {
                    cleaned.insert(name.clone(), Value::Object(value));
                }
            }
            if !properties.is_empty() {
                out.insert(TYPE.to_string(), Value::from(ty));
                out.insert(PROPERTIES.to_string(), Value::Object(cleaned));
            }
        }
        "array" => {
            if let Some(items) = node.get(ITEMS) {
                out.insert(TYPE.to_string(), Value::from(ty));
                out.insert(ITEMS.to_string(), clean_discovery_schema(items));
            }
        }
        _ => {
            for key in [AIRBYTE_TYPE, FORMAT] {
                if let Some(value) = node.get(key) {
                    out.insert(key.to_string(), value.clone());
                }
            }
            out.insert(TYPE.to_string(), Value::from(ty));
        }
    }
    out
}
