//!
//! JSON-schema sanitizer for tool `input_schema` documents (C4).
//!
//! Clients write JSON Schema the way their own model family expects it; the
//! upstream rejects a handful of keywords outright. This walks a schema
//! recursively and returns a copy it will accept.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::{Map, Value};

/* --- constants --------------------------------------------------------------------------------*/

/** `format` values the upstream recognises; any other value on a string schema is dropped. */
const RECOGNISED_FORMATS: &[&str] = &["date-time", "enum", "uuid"];

/* --- start of code -------------------------------------------------------------------------- */

///
/// Return a copy of `schema` acceptable to the upstream. Recurses into
/// `properties`, `items`, and the boolean-combinator keywords (`anyOf`,
/// `oneOf`, `allOf`). Idempotent: sanitizing an already-sanitized schema is a
/// no-op.
pub fn sanitize(schema: &Value) -> Value {
    match schema {
        Value::Object(obj) => Value::Object(sanitize_object(obj)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        other => other.clone(),
    }
}

fn sanitize_object(obj: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();

    for (key, value) in obj {
        match key.as_str() {
            "$schema" => continue,
            "format" => {
                if let Some(fmt) = value.as_str() {
                    if RECOGNISED_FORMATS.contains(&fmt) {
                        out.insert(key.clone(), value.clone());
                    }
                }
            }
            "additionalProperties" => {
                let empty_properties = obj
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(Map::is_empty)
                    .unwrap_or(false);
                if value == &Value::Bool(false) && empty_properties {
                    continue;
                }
                out.insert(key.clone(), sanitize(value));
            }
            "type" => {
                out.insert(key.clone(), sanitize_type(value));
            }
            "properties" => {
                if let Some(props) = value.as_object() {
                    let mut sanitized_props = Map::new();
                    for (prop_key, prop_schema) in props {
                        sanitized_props.insert(prop_key.clone(), sanitize(prop_schema));
                    }
                    out.insert(key.clone(), Value::Object(sanitized_props));
                } else {
                    out.insert(key.clone(), sanitize(value));
                }
            }
            "items" | "anyOf" | "oneOf" | "allOf" => {
                out.insert(key.clone(), sanitize(value));
            }
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }

    if let Some(Value::Array(types)) = out.get("type").cloned() {
        if types.iter().any(|t| t == "null") {
            let remaining: Vec<Value> = types.into_iter().filter(|t| t != "null").collect();
            out.insert("nullable".to_string(), Value::Bool(true));
            match remaining.len() {
                0 => {
                    out.remove("type");
                }
                1 => {
                    out.insert("type".to_string(), remaining.into_iter().next().unwrap());
                }
                _ => {
                    out.insert("type".to_string(), Value::Array(remaining));
                }
            }
        }
    }

    out
}

fn sanitize_type(value: &Value) -> Value {
    value.clone()
}

/* --- tests ----------------------------------------------------------------------------------- */
