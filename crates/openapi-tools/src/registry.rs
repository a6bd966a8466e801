//! Tool registry: the bridge's server-facing surface.
//!
//! `build` runs the whole pipeline to completion before anything is served,
//! so a caller never observes a partial tool set. After that the registry is
//! immutable; the session token cell inside the credential context is the
//! only shared mutable state, so invocations can run concurrently.

use crate::config::ApiBridgeConfig;
use crate::credentials::CredentialContext;
use crate::dispatch::Dispatcher;
use crate::error::{BridgeError, Result};
use crate::policy::RolePolicy;
use crate::spec::load_spec;
use crate::synthesize::{ToolDescriptor, synthesize_tools};
use rmcp::model::{CallToolResult, Content, Tool};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct ToolRegistry {
    role: String,
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
    dispatcher: Dispatcher,
}

impl ToolRegistry {
    /// Load the document, resolve the role, filter, synthesize and bind the
    /// dispatcher. Any failure here is fatal for the process.
    pub fn build(config: &ApiBridgeConfig, document: &str) -> Result<Self> {
        tracing::info!(spec = %config.spec, "loading OpenAPI document");
        let spec = load_spec(document, &config.spec, &config.sensitive_params)?;
        tracing::info!(
            title = %spec.title,
            operations = spec.operations.len(),
            "loaded OpenAPI operations"
        );

        let policy = RolePolicy::resolve(&config.roles, &config.role)?;
        let allowed = policy.filter(&spec.operations);
        tracing::info!(
            role = %policy.name(),
            total = spec.operations.len(),
            allowed = allowed.len(),
            "filtered operations by role"
        );

        let tools = synthesize_tools(&allowed)?;

        let base_url = config
            .base_url
            .clone()
            .or(spec.server_url)
            .ok_or_else(|| {
                BridgeError::Config(
                    "no base URL: set baseUrl or declare servers in the document".to_string(),
                )
            })?;
        let credentials = Arc::new(CredentialContext::new(config.auth.clone()));
        let dispatcher = Dispatcher::new(
            base_url,
            credentials,
            &config.defaults,
            config.pagination.clone(),
        )?;

        let index = tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();

        tracing::info!(tools = tools.len(), role = %policy.name(), "tool registry ready");
        Ok(Self {
            role: policy.name().to_string(),
            tools,
            index,
            dispatcher,
        })
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// MCP tool listing: names, schemas and annotations, nothing about the
    /// dispatch internals.
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.iter().map(ToolDescriptor::to_mcp_tool).collect()
    }

    /// Execute one tool call. Failures are scoped to this call.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let tool = self
            .index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| BridgeError::ToolNotFound(name.to_string()))?;

        let body = self.dispatcher.invoke(tool, &arguments).await?;

        // Structured content only when the tool advertises an output schema.
        if tool.output_schema.is_some() {
            let structured = json!({ "body": body });
            let text =
                serde_json::to_string(&structured).unwrap_or_else(|_| structured.to_string());
            Ok(CallToolResult {
                content: vec![Content::text(text)],
                structured_content: Some(structured),
                is_error: Some(false),
                meta: None,
            })
        } else {
            let text = if let Some(s) = body.as_str() {
                s.to_string()
            } else {
                serde_json::to_string(&body).unwrap_or_else(|_| body.to_string())
            };
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }
    }
}
