//! Response validation relaxation.
//!
//! Backends in this space routinely return `null` for fields their documents
//! declare as plain strings or numbers. Rejecting the whole response for that
//! is useless, so exactly that case is coerced to a sentinel (`""`, `0`,
//! `false`). Every other mismatch is a hard `ResponseShape` error naming the
//! JSON path, which keeps the rest of the declared schema binding.

use crate::error::{BridgeError, Result};
use serde_json::{Map, Value, json};

/// Walk `value` against `schema`, coercing permitted nulls and rejecting
/// everything else that does not fit.
pub fn relax_response(schema: &Value, value: &Value) -> Result<Value> {
    relax_at(schema, value, "$")
}

fn relax_at(schema: &Value, value: &Value, path: &str) -> Result<Value> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(value.clone());
    };
    let Some(ty) = schema_obj.get("type").and_then(Value::as_str) else {
        // No recognized type constraint; pass through untouched.
        return Ok(value.clone());
    };
    let nullable = schema_obj
        .get("nullable")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if value.is_null() {
        if nullable {
            return Ok(Value::Null);
        }
        return match ty {
            "string" => Ok(json!("")),
            "number" | "integer" => Ok(json!(0)),
            "boolean" => Ok(json!(false)),
            other => Err(shape_error(path, other, value)),
        };
    }

    match ty {
        "string" => {
            if value.is_string() {
                Ok(value.clone())
            } else {
                Err(shape_error(path, ty, value))
            }
        }
        "boolean" => {
            if value.is_boolean() {
                Ok(value.clone())
            } else {
                Err(shape_error(path, ty, value))
            }
        }
        "number" => {
            if value.is_number() {
                Ok(value.clone())
            } else {
                Err(shape_error(path, ty, value))
            }
        }
        "integer" => {
            if value.is_i64() || value.is_u64() {
                Ok(value.clone())
            } else {
                Err(shape_error(path, ty, value))
            }
        }
        "array" => {
            let Some(items) = value.as_array() else {
                return Err(shape_error(path, ty, value));
            };
            let item_schema = schema_obj.get("items");
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item_schema {
                    Some(s) => out.push(relax_at(s, item, &format!("{path}[{i}]"))?),
                    None => out.push(item.clone()),
                }
            }
            Ok(Value::Array(out))
        }
        "object" => {
            let Some(fields) = value.as_object() else {
                return Err(shape_error(path, ty, value));
            };
            if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
                for name in required.iter().filter_map(Value::as_str) {
                    if !fields.contains_key(name) {
                        return Err(BridgeError::ResponseShape(format!(
                            "{path}.{name}: required field is missing"
                        )));
                    }
                }
            }
            let props = schema_obj.get("properties").and_then(Value::as_object);
            let mut out = Map::with_capacity(fields.len());
            for (name, field) in fields {
                let relaxed = match props.and_then(|p| p.get(name)) {
                    Some(prop_schema) => {
                        relax_at(prop_schema, field, &format!("{path}.{name}"))?
                    }
                    // Undeclared fields pass through; documents underspecify.
                    None => field.clone(),
                };
                out.insert(name.clone(), relaxed);
            }
            Ok(Value::Object(out))
        }
        _ => Ok(value.clone()),
    }
}

fn shape_error(path: &str, expected: &str, value: &Value) -> BridgeError {
    BridgeError::ResponseShape(format!(
        "{path}: expected {expected}, got {}",
        kind_of(value)
    ))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
