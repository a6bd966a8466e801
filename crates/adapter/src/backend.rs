//! Backend abstraction for the MCP endpoint.
//!
//! The HTTP layer only needs listing and calling; which kind of backend sits
//! behind the process is decided once at startup. Per-invocation failures map
//! either to JSON-RPC protocol errors (caller mistakes) or to `isError` tool
//! results (backend trouble), never to credential-bearing messages.

use async_trait::async_trait;
use netbridge_openapi_tools::{BridgeError, ToolRegistry};
use netbridge_ssh_tools::{DeviceToolSource, SshToolsError};
use rmcp::model::{CallToolResult, Content, Tool};
use serde_json::Value;

/// JSON-RPC "invalid params" code.
pub const INVALID_PARAMS: i64 = -32602;

pub enum CallOutcome {
    Success(CallToolResult),
    /// Tool-level failure: delivered as a result with `isError: true`.
    ToolError(String),
    /// Caller mistake: delivered as a JSON-RPC error object.
    Protocol { code: i64, message: String },
}

impl CallOutcome {
    fn tool_error(message: String) -> Self {
        CallOutcome::ToolError(message)
    }

    fn invalid_params(message: String) -> Self {
        CallOutcome::Protocol {
            code: INVALID_PARAMS,
            message,
        }
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;
    fn tool_count(&self) -> usize;
    fn list_tools(&self) -> Vec<Tool>;
    async fn call_tool(&self, name: &str, arguments: Value) -> CallOutcome;
}

pub struct OpenApiBackend {
    name: String,
    registry: ToolRegistry,
}

impl OpenApiBackend {
    pub fn new(name: impl Into<String>, registry: ToolRegistry) -> Self {
        Self {
            name: name.into(),
            registry,
        }
    }
}

#[async_trait]
impl Backend for OpenApiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn tool_count(&self) -> usize {
        self.registry.len()
    }

    fn list_tools(&self) -> Vec<Tool> {
        self.registry.list_tools()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> CallOutcome {
        match self.registry.call_tool(name, arguments).await {
            Ok(result) => CallOutcome::Success(result),
            Err(e @ (BridgeError::ToolNotFound(_) | BridgeError::InvalidArgument(_))) => {
                CallOutcome::invalid_params(e.to_string())
            }
            Err(BridgeError::RateLimited {
                message,
                retry_after,
            }) => {
                let hint = retry_after
                    .map(|d| format!(" (retry after {}s)", d.as_secs()))
                    .unwrap_or_default();
                CallOutcome::tool_error(format!("{message}{hint}"))
            }
            Err(e) => CallOutcome::tool_error(e.to_string()),
        }
    }
}

pub struct SshBackend {
    source: DeviceToolSource,
}

impl SshBackend {
    pub fn new(source: DeviceToolSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Backend for SshBackend {
    fn name(&self) -> &str {
        self.source.name()
    }

    fn tool_count(&self) -> usize {
        2
    }

    fn list_tools(&self) -> Vec<Tool> {
        self.source.list_tools()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> CallOutcome {
        match self.source.call_tool(name, arguments).await {
            Ok(result) => CallOutcome::Success(result),
            Err(e @ (SshToolsError::ToolNotFound(_) | SshToolsError::InvalidArgument(_))) => {
                CallOutcome::invalid_params(e.to_string())
            }
            Err(e) => CallOutcome::tool_error(e.to_string()),
        }
    }
}

/// Materialize a tool-level failure as an MCP error result.
pub fn error_result(message: String) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(message)],
        structured_content: None,
        is_error: Some(true),
        meta: None,
    }
}
