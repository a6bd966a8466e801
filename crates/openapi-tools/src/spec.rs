//! OpenAPI document loading.
//!
//! Parses a YAML or JSON OpenAPI document into an ordered operation index.
//! Performs no I/O: only internal `#/components/...` references are resolved,
//! by inlining. Descriptor order follows document order, so the same document
//! always yields the same index.

use crate::error::{BridgeError, Result};
use openapiv3::{
    OpenAPI, Operation, Parameter, ParameterSchemaOrContent, PathItem, ReferenceOr, RequestBody,
    Response, Schema, StatusCode,
};
use serde_json::{Value, json};

/// Nested internal refs are inlined up to this depth, then left as `$ref`.
const MAX_REF_DEPTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
        }
    }

    pub fn as_lower(self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Delete => "delete",
            Method::Patch => "patch",
        }
    }

    pub fn is_mutating(self) -> bool {
        !matches!(self, Method::Get)
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            other => Err(BridgeError::Config(format!(
                "unsupported HTTP method '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Body,
}

#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    /// The OpenAPI schema allowed `null` for this parameter.
    pub nullable: bool,
    /// Value must never appear in logs.
    pub sensitive: bool,
    /// JSON-schema fragment for the parameter value.
    pub schema: Value,
}

#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    pub method: Method,
    pub path: String,
    pub operation_id: Option<String>,
    pub description: String,
    pub parameters: Vec<ParameterDescriptor>,
    /// Schema of the success response body, when the document declares one.
    pub response_schema: Option<Value>,
}

/// Everything the bridge needs out of one OpenAPI document.
#[derive(Debug, Clone)]
pub struct SpecIndex {
    pub title: String,
    /// First `servers` entry, if any. Config `baseUrl` takes precedence.
    pub server_url: Option<String>,
    pub operations: Vec<OperationDescriptor>,
}

/// Parse `document` (YAML or JSON) into an operation index.
///
/// `location` only labels errors; nothing is read from disk here.
pub fn load_spec(document: &str, location: &str, sensitive_params: &[String]) -> Result<SpecIndex> {
    let spec: OpenAPI = serde_yaml::from_str(document).map_err(|e| BridgeError::SpecParse {
        location: location.to_string(),
        source: e,
    })?;

    let mut operations = Vec::new();
    for (path, item) in &spec.paths.paths {
        let item = match item {
            ReferenceOr::Item(item) => item,
            ReferenceOr::Reference { reference } => {
                return Err(BridgeError::SpecSchema(format!(
                    "path '{path}' is a reference ('{reference}'); path items must be inline"
                )));
            }
        };
        if !path.starts_with('/') {
            return Err(BridgeError::SpecSchema(format!(
                "path '{path}' does not start with '/'"
            )));
        }
        collect_path_operations(&spec, path, item, sensitive_params, &mut operations)?;
    }

    Ok(SpecIndex {
        title: spec.info.title.clone(),
        server_url: spec.servers.first().map(|s| s.url.clone()),
        operations,
    })
}

fn collect_path_operations(
    spec: &OpenAPI,
    path: &str,
    item: &PathItem,
    sensitive_params: &[String],
    out: &mut Vec<OperationDescriptor>,
) -> Result<()> {
    let methods: [(Method, Option<&Operation>); 5] = [
        (Method::Get, item.get.as_ref()),
        (Method::Post, item.post.as_ref()),
        (Method::Put, item.put.as_ref()),
        (Method::Delete, item.delete.as_ref()),
        (Method::Patch, item.patch.as_ref()),
    ];
    for (method, op) in methods {
        if let Some(op) = op {
            out.push(build_descriptor(
                spec,
                method,
                path,
                &item.parameters,
                op,
                sensitive_params,
            )?);
        }
    }
    Ok(())
}

fn build_descriptor(
    spec: &OpenAPI,
    method: Method,
    path: &str,
    path_item_params: &[ReferenceOr<Parameter>],
    op: &Operation,
    sensitive_params: &[String],
) -> Result<OperationDescriptor> {
    if op.responses.responses.is_empty() && op.responses.default.is_none() {
        return Err(BridgeError::SpecSchema(format!(
            "operation {method} {path} declares no responses"
        )));
    }

    let mut parameters = Vec::new();
    for param in merge_parameters(spec, path_item_params, &op.parameters, method, path)? {
        if let Some(descriptor) = extract_parameter(spec, param, method, path, sensitive_params)? {
            push_unique(&mut parameters, descriptor, method, path)?;
        }
    }

    if let Some(body_ref) = &op.request_body {
        let body = resolve_request_body(spec, body_ref)?;
        for descriptor in extract_body_params(spec, body, sensitive_params)? {
            push_unique(&mut parameters, descriptor, method, path)?;
        }
    }

    let description = op
        .summary
        .clone()
        .or_else(|| op.description.clone())
        .unwrap_or_else(|| format!("Calls {method} {path}"));

    Ok(OperationDescriptor {
        method,
        path: path.to_string(),
        operation_id: op.operation_id.clone(),
        description,
        parameters,
        response_schema: derive_response_schema(spec, op)?,
    })
}

fn push_unique(
    parameters: &mut Vec<ParameterDescriptor>,
    descriptor: ParameterDescriptor,
    method: Method,
    path: &str,
) -> Result<()> {
    if parameters.iter().any(|p| p.name == descriptor.name) {
        return Err(BridgeError::SpecSchema(format!(
            "parameter '{}' appears more than once in {method} {path}",
            descriptor.name
        )));
    }
    parameters.push(descriptor);
    Ok(())
}

/// Path-item parameters first, operation parameters override by (location, name).
fn merge_parameters<'a>(
    spec: &'a OpenAPI,
    path_item_params: &'a [ReferenceOr<Parameter>],
    operation_params: &'a [ReferenceOr<Parameter>],
    method: Method,
    path: &str,
) -> Result<Vec<&'a Parameter>> {
    fn key(p: &Parameter) -> (&'static str, &str) {
        match p {
            Parameter::Path { parameter_data, .. } => ("path", parameter_data.name.as_str()),
            Parameter::Query { parameter_data, .. } => ("query", parameter_data.name.as_str()),
            Parameter::Header { parameter_data, .. } => ("header", parameter_data.name.as_str()),
            Parameter::Cookie { parameter_data, .. } => ("cookie", parameter_data.name.as_str()),
        }
    }

    let mut merged: Vec<&Parameter> = Vec::new();
    for group in [path_item_params, operation_params] {
        for param_ref in group {
            let param = resolve_parameter(spec, param_ref, method, path)?;
            if let Some(slot) = merged.iter_mut().find(|m| key(m) == key(param)) {
                *slot = param;
            } else {
                merged.push(param);
            }
        }
    }
    Ok(merged)
}

/// Returns `None` for parameters the bridge does not surface (optional headers).
fn extract_parameter(
    spec: &OpenAPI,
    param: &Parameter,
    method: Method,
    path: &str,
    sensitive_params: &[String],
) -> Result<Option<ParameterDescriptor>> {
    let (data, location, required) = match param {
        Parameter::Path { parameter_data, .. } => (parameter_data, ParamLocation::Path, true),
        Parameter::Query { parameter_data, .. } => {
            (parameter_data, ParamLocation::Query, parameter_data.required)
        }
        Parameter::Header { parameter_data, .. } => {
            if parameter_data.required {
                return Err(BridgeError::SpecSchema(format!(
                    "required header parameter '{}' in {method} {path} is not supported",
                    parameter_data.name
                )));
            }
            tracing::debug!(
                parameter = %parameter_data.name,
                operation = %format!("{method} {path}"),
                "skipping optional header parameter"
            );
            return Ok(None);
        }
        Parameter::Cookie { parameter_data, .. } => {
            return Err(BridgeError::SpecSchema(format!(
                "cookie parameter '{}' in {method} {path} is not supported",
                parameter_data.name
            )));
        }
    };

    let mut schema = param_schema_json(spec, &data.format);
    if let Some(obj) = schema.as_object_mut()
        && !obj.contains_key("description")
        && let Some(desc) = &data.description
    {
        obj.insert("description".to_string(), Value::String(desc.clone()));
    }

    Ok(Some(ParameterDescriptor {
        sensitive: is_sensitive(&data.name, &schema, sensitive_params),
        nullable: is_nullable(&schema),
        name: data.name.clone(),
        location,
        required,
        schema,
    }))
}

fn param_schema_json(spec: &OpenAPI, format: &ParameterSchemaOrContent) -> Value {
    match format {
        ParameterSchemaOrContent::Schema(schema_ref) => {
            schema_ref_to_json(spec, schema_ref, MAX_REF_DEPTH)
        }
        // Content-typed parameters degrade to an opaque string.
        ParameterSchemaOrContent::Content(_) => json!({"type": "string"}),
    }
}

/// Flatten an object request body into one descriptor per property; any other
/// body shape becomes a single required-or-not `body` parameter.
fn extract_body_params(
    spec: &OpenAPI,
    body: &RequestBody,
    sensitive_params: &[String],
) -> Result<Vec<ParameterDescriptor>> {
    let media = body.content.get("application/json").or_else(|| {
        body.content.iter().find_map(|(k, v)| {
            let lower = k.to_ascii_lowercase();
            (lower.contains("json")).then_some(v)
        })
    });
    let Some(media) = media else {
        return Ok(Vec::new());
    };
    let Some(schema_ref) = &media.schema else {
        return Ok(Vec::new());
    };

    let schema = schema_ref_to_json(spec, schema_ref, MAX_REF_DEPTH);
    let is_object = schema.get("type").and_then(Value::as_str) == Some("object");

    if is_object && let Some(props) = schema.get("properties").and_then(Value::as_object) {
        let required_fields: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let mut out = Vec::new();
        for (name, prop) in props {
            out.push(ParameterDescriptor {
                name: name.clone(),
                location: ParamLocation::Body,
                required: body.required && required_fields.contains(&name.as_str()),
                nullable: is_nullable(prop),
                sensitive: is_sensitive(name, prop, sensitive_params),
                schema: prop.clone(),
            });
        }
        return Ok(out);
    }

    Ok(vec![ParameterDescriptor {
        name: "body".to_string(),
        location: ParamLocation::Body,
        required: body.required,
        nullable: is_nullable(&schema),
        sensitive: false,
        schema,
    }])
}

/// Prefer the lowest explicit 2xx response, then the `2XX` range.
fn derive_response_schema(spec: &OpenAPI, op: &Operation) -> Result<Option<Value>> {
    let mut explicit_2xx: Vec<(u16, &ReferenceOr<Response>)> = Vec::new();
    let mut range_2xx: Option<&ReferenceOr<Response>> = None;

    for (code, resp) in &op.responses.responses {
        match code {
            StatusCode::Code(n) if (200..300).contains(n) => explicit_2xx.push((*n, resp)),
            StatusCode::Range(n) if *n == 2 => range_2xx = Some(resp),
            _ => {}
        }
    }
    explicit_2xx.sort_by_key(|(n, _)| *n);

    let resp_ref = match explicit_2xx.first().map(|(_, r)| *r).or(range_2xx) {
        Some(r) => r,
        None => return Ok(None),
    };
    let resp = resolve_response(spec, resp_ref)?;

    let media = resp.content.get("application/json").or_else(|| {
        resp.content.iter().find_map(|(k, v)| {
            let lower = k.to_ascii_lowercase();
            (lower.contains("json")).then_some(v)
        })
    });
    let Some(media) = media else {
        return Ok(None);
    };
    let Some(schema_ref) = &media.schema else {
        return Ok(None);
    };
    Ok(Some(schema_ref_to_json(spec, schema_ref, MAX_REF_DEPTH)))
}

fn is_nullable(schema: &Value) -> bool {
    schema.get("nullable").and_then(Value::as_bool).unwrap_or(false)
}

fn is_sensitive(name: &str, schema: &Value, sensitive_params: &[String]) -> bool {
    if sensitive_params.iter().any(|p| p == name) {
        return true;
    }
    schema.get("format").and_then(Value::as_str) == Some("password")
}

fn component_name<'a>(reference: &'a str, kind: &str) -> Result<&'a str> {
    let prefix = format!("#/components/{kind}/");
    reference.strip_prefix(prefix.as_str()).ok_or_else(|| {
        BridgeError::SpecSchema(format!(
            "unsupported reference '{reference}' (only internal {kind} references are resolved)"
        ))
    })
}

fn resolve_parameter<'a>(
    spec: &'a OpenAPI,
    param_ref: &'a ReferenceOr<Parameter>,
    method: Method,
    path: &str,
) -> Result<&'a Parameter> {
    match param_ref {
        ReferenceOr::Item(p) => Ok(p),
        ReferenceOr::Reference { reference } => {
            let name = component_name(reference, "parameters")?;
            match spec
                .components
                .as_ref()
                .and_then(|c| c.parameters.get(name))
            {
                Some(ReferenceOr::Item(p)) => Ok(p),
                _ => Err(BridgeError::SpecSchema(format!(
                    "unresolvable parameter reference '{reference}' in {method} {path}"
                ))),
            }
        }
    }
}

fn resolve_request_body<'a>(
    spec: &'a OpenAPI,
    body_ref: &'a ReferenceOr<RequestBody>,
) -> Result<&'a RequestBody> {
    match body_ref {
        ReferenceOr::Item(b) => Ok(b),
        ReferenceOr::Reference { reference } => {
            let name = component_name(reference, "requestBodies")?;
            match spec
                .components
                .as_ref()
                .and_then(|c| c.request_bodies.get(name))
            {
                Some(ReferenceOr::Item(b)) => Ok(b),
                _ => Err(BridgeError::SpecSchema(format!(
                    "unresolvable request body reference '{reference}'"
                ))),
            }
        }
    }
}

fn resolve_response<'a>(
    spec: &'a OpenAPI,
    resp_ref: &'a ReferenceOr<Response>,
) -> Result<&'a Response> {
    match resp_ref {
        ReferenceOr::Item(r) => Ok(r),
        ReferenceOr::Reference { reference } => {
            let name = component_name(reference, "responses")?;
            match spec.components.as_ref().and_then(|c| c.responses.get(name)) {
                Some(ReferenceOr::Item(r)) => Ok(r),
                _ => Err(BridgeError::SpecSchema(format!(
                    "unresolvable response reference '{reference}'"
                ))),
            }
        }
    }
}

fn lookup_schema<'a>(spec: &'a OpenAPI, reference: &str) -> Option<&'a Schema> {
    let name = reference.strip_prefix("#/components/schemas/")?;
    match spec.components.as_ref()?.schemas.get(name)? {
        ReferenceOr::Item(s) => Some(s),
        ReferenceOr::Reference { .. } => None,
    }
}

fn schema_ref_to_json(spec: &OpenAPI, schema_ref: &ReferenceOr<Schema>, depth: usize) -> Value {
    match schema_ref {
        ReferenceOr::Item(s) => schema_to_json(spec, s, depth),
        ReferenceOr::Reference { reference } => inline_ref(spec, reference, depth),
    }
}

fn boxed_schema_ref_to_json(
    spec: &OpenAPI,
    schema_ref: &ReferenceOr<Box<Schema>>,
    depth: usize,
) -> Value {
    match schema_ref {
        ReferenceOr::Item(s) => schema_to_json(spec, s, depth),
        ReferenceOr::Reference { reference } => inline_ref(spec, reference, depth),
    }
}

fn inline_ref(spec: &OpenAPI, reference: &str, depth: usize) -> Value {
    if depth > 0 && let Some(s) = lookup_schema(spec, reference) {
        schema_to_json(spec, s, depth - 1)
    } else {
        json!({"$ref": reference})
    }
}

/// Convert an OpenAPI schema into a JSON-schema fragment. `nullable` and
/// `format: password` markers are preserved for the relaxer and for
/// sensitivity flagging.
fn schema_to_json(spec: &OpenAPI, schema: &Schema, depth: usize) -> Value {
    let mut result = json!({});

    if let Some(desc) = &schema.schema_data.description {
        result["description"] = json!(desc);
    }
    if schema.schema_data.nullable {
        result["nullable"] = json!(true);
    }

    match &schema.schema_kind {
        openapiv3::SchemaKind::Type(t) => match t {
            openapiv3::Type::String(s) => {
                result["type"] = json!("string");
                if matches!(
                    s.format,
                    openapiv3::VariantOrUnknownOrEmpty::Item(openapiv3::StringFormat::Password)
                ) {
                    result["format"] = json!("password");
                }
                if !s.enumeration.is_empty() {
                    let enum_values: Vec<_> =
                        s.enumeration.iter().filter_map(Clone::clone).collect();
                    result["enum"] = json!(enum_values);
                }
            }
            openapiv3::Type::Number(_) => {
                result["type"] = json!("number");
            }
            openapiv3::Type::Integer(_) => {
                result["type"] = json!("integer");
            }
            openapiv3::Type::Boolean(_) => {
                result["type"] = json!("boolean");
            }
            openapiv3::Type::Array(a) => {
                result["type"] = json!("array");
                if let Some(items) = &a.items {
                    result["items"] = boxed_schema_ref_to_json(spec, items, depth);
                }
            }
            openapiv3::Type::Object(o) => {
                result["type"] = json!("object");
                if !o.properties.is_empty() {
                    let mut properties = json!({});
                    for (name, prop) in &o.properties {
                        properties[name] = boxed_schema_ref_to_json(spec, prop, depth);
                    }
                    result["properties"] = properties;
                }
                if !o.required.is_empty() {
                    result["required"] = json!(o.required);
                }
            }
        },
        _ => {
            result["type"] = json!("object");
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DEVICE_SPEC: &str = r##"
openapi: 3.0.0
info:
  title: Device Inventory API
  version: "1.0"
servers:
  - url: https://api.example.net/v1
paths:
  /devices:
    get:
      operationId: listDevices
      summary: List managed devices
      parameters:
        - name: tag
          in: query
          required: false
          schema:
            type: string
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema:
                type: object
                required: [devices]
                properties:
                  devices:
                    type: array
                    items:
                      $ref: "#/components/schemas/Device"
    post:
      operationId: createDevice
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              required: [name]
              properties:
                name:
                  type: string
                secret:
                  type: string
                  format: password
      responses:
        "201":
          description: created
  /devices/{serial}:
    parameters:
      - name: serial
        in: path
        required: true
        schema:
          type: string
    get:
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema:
                $ref: "#/components/schemas/Device"
components:
  schemas:
    Device:
      type: object
      required: [serial]
      properties:
        serial:
          type: string
        name:
          type: string
          nullable: true
"##;

    #[test]
    fn loads_operations_in_document_order() {
        let index = load_spec(DEVICE_SPEC, "test", &[]).expect("load");
        assert_eq!(index.title, "Device Inventory API");
        assert_eq!(index.server_url.as_deref(), Some("https://api.example.net/v1"));
        let signatures: Vec<String> = index
            .operations
            .iter()
            .map(|op| format!("{} {}", op.method, op.path))
            .collect();
        assert_eq!(
            signatures,
            vec!["GET /devices", "POST /devices", "GET /devices/{serial}"]
        );
    }

    #[test]
    fn loading_is_deterministic() {
        let a = load_spec(DEVICE_SPEC, "test", &[]).expect("load");
        let b = load_spec(DEVICE_SPEC, "test", &[]).expect("load");
        for (x, y) in a.operations.iter().zip(&b.operations) {
            assert_eq!(x.path, y.path);
            assert_eq!(
                x.parameters.iter().map(|p| &p.name).collect::<Vec<_>>(),
                y.parameters.iter().map(|p| &p.name).collect::<Vec<_>>()
            );
            assert_eq!(x.response_schema, y.response_schema);
        }
    }

    #[test]
    fn flattens_body_properties_and_flags_password_format() {
        let index = load_spec(DEVICE_SPEC, "test", &[]).expect("load");
        let create = &index.operations[1];
        assert_eq!(create.method, Method::Post);

        let name = create.parameters.iter().find(|p| p.name == "name").unwrap();
        assert_eq!(name.location, ParamLocation::Body);
        assert!(name.required);
        assert!(!name.sensitive);

        let secret = create
            .parameters
            .iter()
            .find(|p| p.name == "secret")
            .unwrap();
        assert!(secret.sensitive);
        assert!(!secret.required);
    }

    #[test]
    fn path_item_parameters_apply_and_refs_inline() {
        let index = load_spec(DEVICE_SPEC, "test", &[]).expect("load");
        let get_one = &index.operations[2];
        let serial = &get_one.parameters[0];
        assert_eq!(serial.name, "serial");
        assert_eq!(serial.location, ParamLocation::Path);
        assert!(serial.required);

        let schema = get_one.response_schema.as_ref().expect("schema");
        assert_eq!(schema["type"], json!("object"));
        assert_eq!(schema["properties"]["name"]["nullable"], json!(true));
    }

    #[test]
    fn sensitive_params_config_flags_by_name() {
        let index = load_spec(DEVICE_SPEC, "test", &["tag".to_string()]).expect("load");
        let tag = index.operations[0]
            .parameters
            .iter()
            .find(|p| p.name == "tag")
            .unwrap();
        assert!(tag.sensitive);
    }

    #[test]
    fn garbage_document_is_a_parse_error() {
        let err = load_spec(": not openapi", "bad.yaml", &[]).unwrap_err();
        assert!(matches!(err, BridgeError::SpecParse { ref location, .. } if location == "bad.yaml"));
    }

    #[test]
    fn operation_without_responses_is_a_schema_error() {
        let doc = r#"
openapi: 3.0.0
info: {title: t, version: "1"}
paths:
  /things:
    get:
      responses: {}
"#;
        let err = load_spec(doc, "test", &[]).unwrap_err();
        assert!(matches!(err, BridgeError::SpecSchema(_)));
    }

    #[test]
    fn cookie_parameters_are_rejected() {
        let doc = r#"
openapi: 3.0.0
info: {title: t, version: "1"}
paths:
  /things:
    get:
      parameters:
        - name: session
          in: cookie
          schema: {type: string}
      responses:
        "200": {description: ok}
"#;
        let err = load_spec(doc, "test", &[]).unwrap_err();
        assert!(matches!(err, BridgeError::SpecSchema(msg) if msg.contains("cookie")));
    }

    #[test]
    fn non_object_body_becomes_single_body_parameter() {
        let doc = r#"
openapi: 3.0.0
info: {title: t, version: "1"}
paths:
  /names:
    post:
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: array
              items: {type: string}
      responses:
        "200": {description: ok}
"#;
        let index = load_spec(doc, "test", &[]).expect("load");
        let params = &index.operations[0].parameters;
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "body");
        assert_eq!(params[0].location, ParamLocation::Body);
        assert!(params[0].required);
        assert_eq!(params[0].schema["type"], json!("array"));
    }
}
