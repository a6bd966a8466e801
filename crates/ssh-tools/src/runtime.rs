//! Device tool source.
//!
//! Two tools per device adapter: a read-only `show_command` and a
//! configuration-mode `config_commands` that applies a command list and saves
//! the running config. Config pushes are never retried here; partial
//! application on a flaky link is worse than surfacing the failure.

use crate::config::DeviceConfig;
use crate::error::{Result, SshToolsError};
use crate::redact::mask_password;
use crate::transport::{CommandMode, CommandTransport, Ssh2Transport};
use rmcp::model::{CallToolResult, Content, JsonObject, Tool, ToolAnnotations};
use serde_json::{Value, json};
use std::sync::Arc;

pub const SHOW_COMMAND: &str = "show_command";
pub const CONFIG_COMMANDS: &str = "config_commands";

pub struct DeviceToolSource {
    name: String,
    config: DeviceConfig,
    transport: Arc<dyn CommandTransport>,
}

impl DeviceToolSource {
    pub fn new(name: impl Into<String>, config: DeviceConfig) -> Self {
        Self::with_transport(name, config, Arc::new(Ssh2Transport))
    }

    pub fn with_transport(
        name: impl Into<String>,
        config: DeviceConfig,
        transport: Arc<dyn CommandTransport>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            transport,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            make_tool(
                SHOW_COMMAND,
                "Run a single 'show ...' command on a device and return its output",
                json!({
                    "type": "object",
                    "required": ["host", "command"],
                    "additionalProperties": false,
                    "properties": {
                        "host": {"type": "string", "description": "Device hostname or IP"},
                        "command": {"type": "string", "description": "Command, must start with 'show '"},
                    },
                }),
                ToolAnnotations {
                    title: None,
                    read_only_hint: Some(true),
                    destructive_hint: Some(false),
                    idempotent_hint: Some(true),
                    open_world_hint: Some(true),
                },
            ),
            make_tool(
                CONFIG_COMMANDS,
                "Apply configuration commands to a device and save the configuration",
                json!({
                    "type": "object",
                    "required": ["host", "commands"],
                    "additionalProperties": false,
                    "properties": {
                        "host": {"type": "string", "description": "Device hostname or IP"},
                        "commands": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Configuration-mode commands, applied in order",
                        },
                    },
                }),
                ToolAnnotations {
                    title: None,
                    read_only_hint: Some(false),
                    destructive_hint: Some(true),
                    // Config replay depends on device state; do not guess.
                    idempotent_hint: None,
                    open_world_hint: Some(true),
                },
            ),
        ]
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let result = match name {
            SHOW_COMMAND => self.show_command(&arguments).await,
            CONFIG_COMMANDS => self.config_commands(&arguments).await,
            other => Err(SshToolsError::ToolNotFound(other.to_string())),
        };
        // Anything that touched the wire may echo credentials.
        result.map_err(|e| e.sanitized(&self.config.password))
    }

    async fn show_command(&self, arguments: &Value) -> Result<CallToolResult> {
        let host = require_host(arguments)?;
        let command = arguments
            .get("command")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                SshToolsError::InvalidArgument("'command' must be a non-empty string".to_string())
            })?;
        if !command.starts_with("show ") {
            return Err(SshToolsError::InvalidArgument(format!(
                "only 'show ...' commands are allowed, got '{command}'"
            )));
        }

        tracing::info!(source = %self.name, host, command, "running show command");
        tracing::debug!(
            username = %self.config.username,
            password = %mask_password(&self.config.password),
            "device login"
        );

        let output = self
            .transport
            .run(host, &self.config, &[command.to_string()], CommandMode::Show)
            .await?;
        Ok(CallToolResult::success(vec![Content::text(output)]))
    }

    async fn config_commands(&self, arguments: &Value) -> Result<CallToolResult> {
        let host = require_host(arguments)?;
        let commands: Vec<String> = arguments
            .get("commands")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if commands.is_empty() {
            return Err(SshToolsError::InvalidArgument(
                "'commands' must be a non-empty array of strings".to_string(),
            ));
        }

        tracing::info!(
            source = %self.name,
            host,
            command_count = commands.len(),
            "applying configuration commands"
        );

        // Enter config mode, apply, leave, save.
        let mut sequence = Vec::with_capacity(commands.len() + 3);
        sequence.push("configure terminal".to_string());
        sequence.extend(commands);
        sequence.push("end".to_string());
        sequence.push("write memory".to_string());

        let output = self
            .transport
            .run(host, &self.config, &sequence, CommandMode::Configure)
            .await?;
        Ok(CallToolResult::success(vec![Content::text(output)]))
    }
}

fn require_host(arguments: &Value) -> Result<&str> {
    arguments
        .get("host")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| {
            SshToolsError::InvalidArgument("'host' must be a non-empty string".to_string())
        })
}

fn make_tool(name: &str, description: &str, input_schema: Value, annotations: ToolAnnotations) -> Tool {
    let schema_obj = input_schema
        .as_object()
        .cloned()
        .unwrap_or_else(JsonObject::new);
    let mut tool = Tool::new(name.to_string(), description.to_string(), Arc::new(schema_obj));
    tool.annotations = Some(annotations);
    tool
}
