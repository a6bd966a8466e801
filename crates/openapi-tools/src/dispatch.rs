//! Outbound request dispatch.
//!
//! Validates arguments against the tool's input schema, builds and executes
//! the HTTP request, classifies failures into the bridge error taxonomy, and
//! runs successful bodies through the response relaxer. Read operations are
//! retried on connect failures and 502/503/504; mutating verbs never are.

use crate::config::{AuthConfig, EndpointDefaults, PaginationConfig};
use crate::credentials::CredentialContext;
use crate::error::{BridgeError, Result};
use crate::relax::relax_response;
use crate::spec::{Method, OperationDescriptor, ParamLocation};
use crate::synthesize::ToolDescriptor;
use reqwest::{Client, StatusCode, header};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

const MAX_READ_RETRIES: u32 = 2;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_SNIPPET_LIMIT: usize = 200;

#[derive(Debug)]
pub struct Dispatcher {
    client: Client,
    base_url: String,
    credentials: Arc<CredentialContext>,
    /// `None` means the per-request timeout is explicitly disabled.
    timeout: Option<Duration>,
    headers: BTreeMap<String, String>,
    pagination: PaginationConfig,
}

impl Dispatcher {
    pub fn new(
        base_url: String,
        credentials: Arc<CredentialContext>,
        defaults: &EndpointDefaults,
        pagination: PaginationConfig,
    ) -> Result<Self> {
        let parsed = Url::parse(&base_url)
            .map_err(|e| BridgeError::Config(format!("invalid base URL '{base_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BridgeError::Config(format!(
                "base URL '{base_url}' must be http or https"
            )));
        }

        let client = Client::builder()
            .build()
            .map_err(|e| BridgeError::Config(format!("failed to build HTTP client: {e}")))?;

        let timeout = match defaults.timeout {
            Some(0) => None, // explicit disable
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(DEFAULT_TIMEOUT),
        };

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            timeout,
            headers: defaults.headers.clone(),
            pagination,
        })
    }

    /// Execute one tool invocation end to end.
    pub async fn invoke(&self, tool: &ToolDescriptor, arguments: &Value) -> Result<Value> {
        validate_arguments(tool, arguments)?;
        let parts = build_request_parts(&tool.operation, arguments)?;

        tracing::debug!(
            tool = %tool.name,
            arguments = %redact_arguments(&tool.operation, arguments),
            "dispatching tool call"
        );

        let started = Instant::now();
        let outcome = self.execute_with_recovery(tool, &parts).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (status, mut body) = match outcome {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(
                    tool = %tool.name,
                    method = %tool.operation.method,
                    path = %parts.path,
                    latency_ms,
                    error = %e,
                    "tool call failed"
                );
                return Err(e);
            }
        };

        tracing::info!(
            tool = %tool.name,
            method = %tool.operation.method,
            path = %parts.path,
            status = status.as_u16(),
            latency_ms,
            "tool call completed"
        );

        if self.pagination.follow_next && tool.operation.method == Method::Get {
            body = self.follow_pagination(body).await?;
        }

        match &tool.operation.response_schema {
            Some(schema) => relax_response(schema, &body),
            None => Ok(body),
        }
    }

    /// One transparent refresh-and-retry after a 401 on session backends.
    async fn execute_with_recovery(
        &self,
        tool: &ToolDescriptor,
        parts: &RequestParts,
    ) -> Result<(StatusCode, Value)> {
        match self.execute_with_retries(tool, parts).await {
            Err(BridgeError::Authentication(_)) if self.credentials.is_session() => {
                self.credentials.invalidate_session_token().await;
                tracing::info!(tool = %tool.name, "session token rejected, refreshing once");
                self.execute_with_retries(tool, parts).await
            }
            other => other,
        }
    }

    async fn execute_with_retries(
        &self,
        tool: &ToolDescriptor,
        parts: &RequestParts,
    ) -> Result<(StatusCode, Value)> {
        let budget = if tool.operation.method.is_mutating() {
            0
        } else {
            MAX_READ_RETRIES
        };
        let mut delay = RETRY_BASE_DELAY;
        let mut attempt: u32 = 0;

        loop {
            let retryable_failure = match self.execute_once(tool, parts).await {
                Ok((status, text, retry_after)) => {
                    if status.is_success() {
                        let body =
                            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text));
                        return Ok((status, body));
                    }
                    if !matches!(status.as_u16(), 502 | 503 | 504) || attempt >= budget {
                        return Err(classify_status(status, &text, retry_after));
                    }
                    format!("HTTP {status}")
                }
                Err(e) => {
                    if !matches!(e, BridgeError::BackendUnavailable(_)) || attempt >= budget {
                        return Err(e);
                    }
                    e.to_string()
                }
            };

            attempt += 1;
            tracing::debug!(
                tool = %tool.name,
                attempt,
                reason = %retryable_failure,
                "retrying read operation"
            );
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }

    /// One request/response cycle. `Ok` carries any HTTP completion, success
    /// or not; `Err` is reserved for transport-level failures.
    async fn execute_once(
        &self,
        tool: &ToolDescriptor,
        parts: &RequestParts,
    ) -> Result<(StatusCode, String, Option<Duration>)> {
        let url = self.build_url(&parts.path, &parts.query)?;

        let mut request = self
            .client
            .request(to_reqwest_method(tool.operation.method), url);
        request = self.apply_headers(request);
        request = self.apply_auth(request).await?;
        if let Some(body) = &parts.body {
            request = request.json(body);
        }
        if let Some(t) = self.timeout {
            request = request.timeout(t);
        }

        let response = request.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| BridgeError::Http(sanitize_reqwest_error(&e)))?;
        Ok((status, text, retry_after))
    }

    fn build_url(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|e| BridgeError::Http(format!("invalid request URL for '{path}': {e}")))?;

        let auth_pair = match self.credentials.auth() {
            AuthConfig::Query { name, value } => Some((name.clone(), value.clone())),
            _ => None,
        };
        if !query.is_empty() || auth_pair.is_some() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            if let Some((key, value)) = auth_pair {
                pairs.append_pair(&key, &value);
            }
        }
        Ok(url)
    }

    fn apply_headers(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        request
    }

    async fn apply_auth(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        Ok(match self.credentials.auth() {
            AuthConfig::None | AuthConfig::Query { .. } => request,
            AuthConfig::Bearer { token } => request.bearer_auth(token),
            AuthConfig::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            AuthConfig::Header { name, value } => request.header(name, value),
            AuthConfig::Session(_) => {
                let token = self
                    .credentials
                    .session_token(
                        &self.client,
                        &self.base_url,
                        self.timeout.unwrap_or(DEFAULT_TIMEOUT),
                    )
                    .await?;
                let header_name = self
                    .credentials
                    .session_header()
                    .unwrap_or("X-Auth-Token")
                    .to_string();
                request.header(header_name, token)
            }
        })
    }

    /// Concatenate `{results, next}` pages into one result set, up to the
    /// configured page cap.
    async fn follow_pagination(&self, first: Value) -> Result<Value> {
        let has_shape = first.get("results").is_some_and(Value::is_array)
            && first.get("next").is_some_and(|n| n.is_string());
        if !has_shape {
            return Ok(first);
        }

        let mut merged = first;
        let mut all: Vec<Value> = merged["results"].as_array().cloned().unwrap_or_default();
        let mut next = merged["next"].as_str().map(ToString::to_string);
        let mut pages = 1usize;

        while let Some(next_url) = next {
            if pages >= self.pagination.max_pages {
                tracing::warn!(pages, "pagination page cap reached, truncating result set");
                break;
            }
            let url = Url::parse(&next_url)
                .map_err(|e| BridgeError::Http(format!("invalid pagination URL: {e}")))?;

            let mut request = self.client.get(url);
            request = self.apply_headers(request);
            request = self.apply_auth(request).await?;
            if let Some(t) = self.timeout {
                request = request.timeout(t);
            }

            let response = request.send().await.map_err(|e| classify_transport(&e))?;
            let status = response.status();
            let retry_after = parse_retry_after(response.headers());
            let text = response
                .text()
                .await
                .map_err(|e| BridgeError::Http(sanitize_reqwest_error(&e)))?;
            if !status.is_success() {
                return Err(classify_status(status, &text, retry_after));
            }

            let page: Value = serde_json::from_str(&text)
                .map_err(|_| BridgeError::Http("pagination page is not JSON".to_string()))?;
            if let Some(results) = page.get("results").and_then(Value::as_array) {
                all.extend(results.iter().cloned());
            }
            next = page.get("next").and_then(Value::as_str).map(ToString::to_string);
            pages += 1;
        }

        merged["results"] = Value::Array(all);
        merged["next"] = Value::Null;
        Ok(merged)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestParts {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// Strict argument validation. Collects every problem instead of stopping at
/// the first, so a caller can fix the whole invocation in one pass.
pub fn validate_arguments(tool: &ToolDescriptor, arguments: &Value) -> Result<()> {
    let Some(args) = arguments.as_object() else {
        return Err(BridgeError::InvalidArgument(
            "arguments must be a JSON object".to_string(),
        ));
    };

    let mut problems: Vec<String> = Vec::new();
    for param in &tool.operation.parameters {
        match args.get(&param.name) {
            None | Some(Value::Null) => {
                if param.required {
                    problems.push(format!("missing required parameter '{}'", param.name));
                }
            }
            Some(value) => {
                if let Some(expected) = param.schema.get("type").and_then(Value::as_str)
                    && !value_matches_type(value, expected)
                {
                    problems.push(format!(
                        "parameter '{}' expected {expected}, got {}",
                        param.name,
                        kind_of(value)
                    ));
                }
            }
        }
    }
    for name in args.keys() {
        if !tool.operation.parameters.iter().any(|p| &p.name == name) {
            problems.push(format!("unknown parameter '{name}'"));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(BridgeError::InvalidArgument(problems.join("; ")))
    }
}

/// Substitute path parameters, collect query pairs (arrays become repeated
/// keys) and assemble the JSON body. `null` arguments count as absent.
pub fn build_request_parts(op: &OperationDescriptor, arguments: &Value) -> Result<RequestParts> {
    let mut path = op.path.clone();
    let mut query: Vec<(String, String)> = Vec::new();
    let mut body_fields = Map::new();
    let mut body_payload: Option<Value> = None;

    let body_param_count = op
        .parameters
        .iter()
        .filter(|p| p.location == ParamLocation::Body)
        .count();

    for param in &op.parameters {
        let value = match arguments.get(&param.name) {
            None | Some(Value::Null) => continue,
            Some(v) => v.clone(),
        };
        match param.location {
            ParamLocation::Path => {
                path = path.replace(&format!("{{{}}}", param.name), &value_to_string(&value));
            }
            ParamLocation::Query => match &value {
                Value::Array(items) => {
                    for item in items {
                        query.push((param.name.clone(), value_to_string(item)));
                    }
                }
                other => query.push((param.name.clone(), value_to_string(other))),
            },
            ParamLocation::Body => {
                if body_param_count == 1 && param.name == "body" {
                    body_payload = Some(value);
                } else {
                    body_fields.insert(param.name.clone(), value);
                }
            }
        }
    }

    if path.contains('{') {
        return Err(BridgeError::InvalidArgument(format!(
            "unresolved path parameters in '{path}'"
        )));
    }

    let body = body_payload.or_else(|| {
        if body_fields.is_empty() {
            None
        } else {
            Some(Value::Object(body_fields))
        }
    });

    Ok(RequestParts { path, query, body })
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
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

/// Argument view safe for debug logs: sensitive values replaced outright.
fn redact_arguments(op: &OperationDescriptor, arguments: &Value) -> Value {
    let Some(args) = arguments.as_object() else {
        return arguments.clone();
    };
    let mut out = Map::with_capacity(args.len());
    for (name, value) in args {
        let sensitive = op
            .parameters
            .iter()
            .any(|p| &p.name == name && p.sensitive);
        out.insert(
            name.clone(),
            if sensitive { json!("***") } else { value.clone() },
        );
    }
    Value::Object(out)
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Patch => reqwest::Method::PATCH,
    }
}

fn classify_transport(e: &reqwest::Error) -> BridgeError {
    let msg = sanitize_reqwest_error(e);
    if e.is_timeout() {
        BridgeError::Timeout(msg)
    } else if e.is_connect() {
        BridgeError::BackendUnavailable(msg)
    } else {
        BridgeError::Http(msg)
    }
}

fn classify_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> BridgeError {
    let snippet = snippet_of(body);
    match status.as_u16() {
        401 => BridgeError::Authentication(format!("backend returned HTTP 401: {snippet}")),
        429 => BridgeError::RateLimited {
            message: format!("backend returned HTTP 429: {snippet}"),
            retry_after,
        },
        500..=599 => BridgeError::BackendUnavailable(format!("HTTP {status}: {snippet}")),
        _ => BridgeError::Http(format!("HTTP {status}: {snippet}")),
    }
}

fn snippet_of(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= ERROR_SNIPPET_LIMIT {
        return trimmed.to_string();
    }
    let cut = trimmed
        .char_indices()
        .take_while(|(i, _)| *i < ERROR_SNIPPET_LIMIT)
        .last()
        .map_or(0, |(i, c)| i + c.len_utf8());
    format!("{}...", &trimmed[..cut])
}

fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Strip the request URL (which can carry query credentials) out of reqwest
/// error text.
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}

fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ParameterDescriptor;
    use crate::synthesize::synthesize_tools;
    use serde_json::json;

    fn descriptor(params: Vec<ParameterDescriptor>) -> ToolDescriptor {
        let op = OperationDescriptor {
            method: Method::Get,
            path: "/devices/{serial}/clients".to_string(),
            operation_id: None,
            description: "list clients".to_string(),
            parameters: params,
            response_schema: None,
        };
        synthesize_tools(std::slice::from_ref(&op))
            .expect("synthesize")
            .remove(0)
    }

    fn param(name: &str, location: ParamLocation, required: bool, ty: &str) -> ParameterDescriptor {
        ParameterDescriptor {
            name: name.to_string(),
            location,
            required,
            nullable: false,
            sensitive: name == "secret",
            schema: json!({"type": ty}),
        }
    }

    #[test]
    fn validation_collects_every_problem() {
        let tool = descriptor(vec![
            param("serial", ParamLocation::Path, true, "string"),
            param("count", ParamLocation::Query, false, "integer"),
        ]);
        let err = validate_arguments(&tool, &json!({"count": "five", "bogus": 1})).unwrap_err();
        let BridgeError::InvalidArgument(msg) = err else {
            panic!("expected InvalidArgument");
        };
        assert!(msg.contains("missing required parameter 'serial'"));
        assert!(msg.contains("parameter 'count' expected integer, got string"));
        assert!(msg.contains("unknown parameter 'bogus'"));
    }

    #[test]
    fn validation_accepts_well_typed_arguments() {
        let tool = descriptor(vec![
            param("serial", ParamLocation::Path, true, "string"),
            param("count", ParamLocation::Query, false, "integer"),
        ]);
        assert!(validate_arguments(&tool, &json!({"serial": "Q2XX", "count": 3})).is_ok());
    }

    #[test]
    fn null_optional_argument_counts_as_absent() {
        let tool = descriptor(vec![
            param("serial", ParamLocation::Path, true, "string"),
            param("tag", ParamLocation::Query, false, "string"),
        ]);
        assert!(validate_arguments(&tool, &json!({"serial": "a", "tag": null})).is_ok());
        let parts =
            build_request_parts(&tool.operation, &json!({"serial": "a", "tag": null})).unwrap();
        assert!(parts.query.is_empty());
    }

    #[test]
    fn path_substitution_and_repeated_query_keys() {
        let op = OperationDescriptor {
            method: Method::Get,
            path: "/devices/{serial}/clients".to_string(),
            operation_id: None,
            description: String::new(),
            parameters: vec![
                param("serial", ParamLocation::Path, true, "string"),
                param("tags", ParamLocation::Query, false, "array"),
            ],
            response_schema: None,
        };
        let parts = build_request_parts(
            &op,
            &json!({"serial": "Q2XX-1", "tags": ["wan", "lan"]}),
        )
        .unwrap();
        assert_eq!(parts.path, "/devices/Q2XX-1/clients");
        assert_eq!(
            parts.query,
            vec![
                ("tags".to_string(), "wan".to_string()),
                ("tags".to_string(), "lan".to_string())
            ]
        );
        assert!(parts.body.is_none());
    }

    #[test]
    fn body_fields_assemble_into_one_object() {
        let op = OperationDescriptor {
            method: Method::Post,
            path: "/devices".to_string(),
            operation_id: None,
            description: String::new(),
            parameters: vec![
                param("name", ParamLocation::Body, true, "string"),
                param("tags", ParamLocation::Body, false, "array"),
            ],
            response_schema: None,
        };
        let parts =
            build_request_parts(&op, &json!({"name": "sw1", "tags": ["edge"]})).unwrap();
        assert_eq!(parts.body, Some(json!({"name": "sw1", "tags": ["edge"]})));
    }

    #[test]
    fn single_body_parameter_is_sent_verbatim() {
        let op = OperationDescriptor {
            method: Method::Post,
            path: "/names".to_string(),
            operation_id: None,
            description: String::new(),
            parameters: vec![param("body", ParamLocation::Body, true, "array")],
            response_schema: None,
        };
        let parts = build_request_parts(&op, &json!({"body": ["a", "b"]})).unwrap();
        assert_eq!(parts.body, Some(json!(["a", "b"])));
    }

    #[test]
    fn unresolved_path_parameter_is_rejected() {
        let op = OperationDescriptor {
            method: Method::Get,
            path: "/devices/{serial}".to_string(),
            operation_id: None,
            description: String::new(),
            parameters: vec![],
            response_schema: None,
        };
        let err = build_request_parts(&op, &json!({})).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
    }

    #[test]
    fn sensitive_arguments_are_redacted_for_logs() {
        let op = OperationDescriptor {
            method: Method::Post,
            path: "/login".to_string(),
            operation_id: None,
            description: String::new(),
            parameters: vec![
                param("user", ParamLocation::Body, true, "string"),
                param("secret", ParamLocation::Body, true, "string"),
            ],
            response_schema: None,
        };
        let redacted = redact_arguments(&op, &json!({"user": "ops", "secret": "hunter2"}));
        assert_eq!(redacted, json!({"user": "ops", "secret": "***"}));
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "", None),
            BridgeError::Authentication(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "", None),
            BridgeError::BackendUnavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "gone", None),
            BridgeError::Http(msg) if msg.contains("404") && msg.contains("gone")
        ));
        let BridgeError::RateLimited { retry_after, .. } = classify_status(
            StatusCode::TOO_MANY_REQUESTS,
            "slow down",
            Some(Duration::from_secs(7)),
        ) else {
            panic!("expected RateLimited");
        };
        assert_eq!(retry_after, Some(Duration::from_secs(7)));
    }

    #[test]
    fn retry_after_header_parses_seconds_only() {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::RETRY_AFTER, "12".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));

        headers.insert(
            header::RETRY_AFTER,
            "Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap(),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let s = snippet_of(&"x".repeat(500));
        assert!(s.len() <= ERROR_SNIPPET_LIMIT + 3);
        assert!(s.ends_with("..."));
    }
}
