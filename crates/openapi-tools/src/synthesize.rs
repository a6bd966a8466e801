//! Tool synthesis.
//!
//! Turns role-filtered operations into MCP tool descriptors. Names are a pure
//! function of (method, path), so the same document always produces the same
//! tool names. Collisions are fatal, never silently deduplicated.

use crate::error::{BridgeError, Result};
use crate::spec::{Method, OperationDescriptor};
use rmcp::model::{JsonObject, Tool, ToolAnnotations};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub operation: OperationDescriptor,
    /// Strict JSON schema for tool arguments.
    pub input_schema: Value,
    /// Advertised output schema (`{body: <response schema>}` wrapper).
    pub output_schema: Option<Value>,
}

impl ToolDescriptor {
    /// Materialize the MCP `Tool` this descriptor advertises.
    pub fn to_mcp_tool(&self) -> Tool {
        let schema_obj = self
            .input_schema
            .as_object()
            .cloned()
            .unwrap_or_else(JsonObject::new);
        let mut tool = Tool::new(
            self.name.clone(),
            self.description.clone(),
            Arc::new(schema_obj),
        );
        tool.output_schema = self
            .output_schema
            .as_ref()
            .and_then(Value::as_object)
            .cloned()
            .map(Arc::new);
        tool.annotations = Some(annotations_for_method(self.operation.method));
        tool
    }
}

/// Synthesize tool descriptors for every operation, in order.
///
/// A path that survives filtering with a single method keeps the bare path
/// name; a path exposing several methods gets a method prefix on each.
pub fn synthesize_tools(operations: &[OperationDescriptor]) -> Result<Vec<ToolDescriptor>> {
    let mut methods_per_path: HashMap<&str, usize> = HashMap::new();
    for op in operations {
        *methods_per_path.entry(op.path.as_str()).or_default() += 1;
    }

    let mut tools: Vec<ToolDescriptor> = Vec::with_capacity(operations.len());
    let mut owners: HashMap<String, (Method, String)> = HashMap::new();

    for op in operations {
        let multi = methods_per_path[op.path.as_str()] > 1;
        let name = tool_name(op.method, &op.path, multi);

        if let Some((prev_method, prev_path)) =
            owners.insert(name.clone(), (op.method, op.path.clone()))
        {
            return Err(BridgeError::NameCollision(format!(
                "'{name}' is derived from both {prev_method} {prev_path} and {} {}",
                op.method, op.path
            )));
        }

        tools.push(ToolDescriptor {
            name,
            description: op.description.clone(),
            input_schema: build_input_schema(op),
            output_schema: op.response_schema.as_ref().map(wrap_body_output_schema),
            operation: op.clone(),
        });
    }

    Ok(tools)
}

fn tool_name(method: Method, path: &str, multi_method: bool) -> String {
    let mut canonical = canonical_path_name(path);
    if canonical.is_empty() {
        // A bare "/" path has no alphanumerics to name the tool after.
        canonical = "root".to_string();
    }
    if multi_method {
        format!("{}_{canonical}", method.as_lower())
    } else {
        canonical
    }
}

/// Lower-case the path and collapse every run of non-alphanumerics (slashes,
/// braces, dashes) into a single `_`, trimming the ends.
fn canonical_path_name(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut pending_sep = false;
    for c in path.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Strict input schema: one property per parameter, `required` from the
/// required flags. Response-side nullability never loosens inputs, so the
/// `nullable` marker is dropped from parameter fragments.
fn build_input_schema(op: &OperationDescriptor) -> Value {
    let mut properties = json!({});
    let mut required: Vec<&str> = Vec::new();

    for param in &op.parameters {
        let mut fragment = param.schema.clone();
        if let Some(obj) = fragment.as_object_mut() {
            obj.remove("nullable");
        }
        properties[&param.name] = fragment;
        if param.required {
            required.push(&param.name);
        }
    }

    let mut schema = json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": false,
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

/// MCP structured content is always emitted under a `body` key, so the
/// advertised schema wraps the response schema the same way.
fn wrap_body_output_schema(body_schema: &Value) -> Value {
    json!({
        "type": "object",
        "required": ["body"],
        "properties": { "body": body_schema },
    })
}

/// MCP tool annotations from RFC 9110 method semantics. HTTP tools always
/// interact with an external system, so `openWorldHint` is always true.
pub fn annotations_for_method(method: Method) -> ToolAnnotations {
    let open_world_hint = Some(true);
    match method {
        Method::Get => ToolAnnotations {
            title: None,
            read_only_hint: Some(true),
            destructive_hint: Some(false),
            idempotent_hint: Some(true),
            open_world_hint,
        },
        Method::Post => ToolAnnotations {
            title: None,
            read_only_hint: Some(false),
            destructive_hint: Some(false),
            idempotent_hint: Some(false),
            open_world_hint,
        },
        Method::Put | Method::Delete => ToolAnnotations {
            title: None,
            read_only_hint: Some(false),
            destructive_hint: Some(true),
            idempotent_hint: Some(true),
            open_world_hint,
        },
        // PATCH may or may not be idempotent; do not guess.
        Method::Patch => ToolAnnotations {
            title: None,
            read_only_hint: Some(false),
            destructive_hint: Some(true),
            idempotent_hint: None,
            open_world_hint,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{ParamLocation, ParameterDescriptor};
    use serde_json::json;

    fn op(method: Method, path: &str, params: Vec<ParameterDescriptor>) -> OperationDescriptor {
        OperationDescriptor {
            method,
            path: path.to_string(),
            operation_id: None,
            description: format!("Calls {method} {path}"),
            parameters: params,
            response_schema: Some(json!({"type": "object"})),
        }
    }

    fn param(name: &str, required: bool, nullable: bool) -> ParameterDescriptor {
        let mut schema = json!({"type": "string"});
        if nullable {
            schema["nullable"] = json!(true);
        }
        ParameterDescriptor {
            name: name.to_string(),
            location: ParamLocation::Query,
            required,
            nullable,
            sensitive: false,
            schema,
        }
    }

    #[test]
    fn canonical_names_collapse_separators() {
        assert_eq!(canonical_path_name("/devices"), "devices");
        assert_eq!(
            canonical_path_name("/devices/{serial}/clients"),
            "devices_serial_clients"
        );
        assert_eq!(
            canonical_path_name("/dna/intent/api/v1/network-device"),
            "dna_intent_api_v1_network_device"
        );
    }

    #[test]
    fn bare_root_path_gets_a_name() {
        let single = synthesize_tools(&[op(Method::Get, "/", vec![])]).expect("synthesize");
        assert_eq!(single[0].name, "root");

        let multi = synthesize_tools(&[
            op(Method::Get, "/", vec![]),
            op(Method::Post, "/", vec![]),
        ])
        .expect("synthesize");
        let names: Vec<&str> = multi.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["get_root", "post_root"]);
    }

    #[test]
    fn method_prefix_only_for_multi_method_paths() {
        let ops = vec![
            op(Method::Get, "/devices", vec![]),
            op(Method::Post, "/devices", vec![]),
            op(Method::Get, "/clients", vec![]),
        ];
        let tools = synthesize_tools(&ops).expect("synthesize");
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["get_devices", "post_devices", "clients"]);
    }

    #[test]
    fn synthesis_is_idempotent() {
        let ops = vec![
            op(Method::Get, "/devices", vec![param("tag", false, false)]),
            op(Method::Post, "/devices", vec![param("name", true, false)]),
        ];
        let a = synthesize_tools(&ops).expect("synthesize");
        let b = synthesize_tools(&ops).expect("synthesize");
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.name, y.name);
            assert_eq!(x.input_schema, y.input_schema);
        }
    }

    #[test]
    fn distinct_paths_mapping_to_one_name_collide() {
        let ops = vec![
            op(Method::Get, "/network-device", vec![]),
            op(Method::Get, "/network_device", vec![]),
        ];
        let err = synthesize_tools(&ops).unwrap_err();
        assert!(matches!(err, BridgeError::NameCollision(msg) if msg.contains("network_device")));
    }

    #[test]
    fn input_schema_is_strict_and_drops_nullable() {
        let ops = vec![op(
            Method::Post,
            "/devices",
            vec![param("name", true, true), param("tag", false, false)],
        )];
        let tools = synthesize_tools(&ops).expect("synthesize");
        let schema = &tools[0].input_schema;
        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(schema["required"], json!(["name"]));
        assert!(schema["properties"]["name"].get("nullable").is_none());
    }

    #[test]
    fn output_schema_wraps_body() {
        let ops = vec![op(Method::Get, "/devices", vec![])];
        let tools = synthesize_tools(&ops).expect("synthesize");
        let out = tools[0].output_schema.as_ref().expect("output schema");
        assert_eq!(out["required"], json!(["body"]));
        assert_eq!(out["properties"]["body"]["type"], json!("object"));
    }

    #[test]
    fn annotations_follow_method_semantics() {
        let get = annotations_for_method(Method::Get);
        assert_eq!(get.read_only_hint, Some(true));
        assert_eq!(get.idempotent_hint, Some(true));

        let put = annotations_for_method(Method::Put);
        assert_eq!(put.destructive_hint, Some(true));
        assert_eq!(put.idempotent_hint, Some(true));

        let patch = annotations_for_method(Method::Patch);
        assert_eq!(patch.idempotent_hint, None);
        assert_eq!(patch.open_world_hint, Some(true));
    }
}
