//! Adapter process configuration.
//!
//! One YAML file, one backend per process. Credential material reaches the
//! file through `${VAR}` environment interpolation; a referenced variable
//! that is not set is fatal at startup, never a silent empty default.

use netbridge_openapi_tools::ApiBridgeConfig;
use netbridge_ssh_tools::DeviceConfig;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Invalid(String),

    #[error("environment variable '{0}' referenced by the configuration is not set")]
    MissingEnv(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AdapterConfig {
    /// Display name for logs and the MCP serverInfo. Defaults per backend.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub openapi: Option<ApiBridgeConfig>,
    #[serde(default)]
    pub ssh: Option<DeviceConfig>,
}

impl AdapterConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let expanded = expand_env(&raw, |name| std::env::var(name).ok())?;
        let config: AdapterConfig = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match (&self.openapi, &self.ssh) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (Some(_), Some(_)) => Err(ConfigError::Invalid(
                "exactly one backend per process: remove either `openapi` or `ssh`".to_string(),
            )),
            (None, None) => Err(ConfigError::Invalid(
                "no backend configured: set `openapi` or `ssh`".to_string(),
            )),
        }
    }

    /// Apply a CLI/env role override. Only OpenAPI backends have a role
    /// policy; asking for one on an ssh backend is loudly ignored rather than
    /// silently dropped.
    pub fn apply_role_override(&mut self, role: Option<String>) {
        let Some(role) = role else { return };
        match &mut self.openapi {
            Some(api) => api.role = role,
            None => tracing::warn!(
                role = %role,
                "role override ignored: the configured backend has no role policy"
            ),
        }
    }

    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match (&self.openapi, &self.ssh) {
            (Some(api), _) => api.spec.clone(),
            (_, Some(_)) => "ssh-device".to_string(),
            _ => "netbridge".to_string(),
        }
    }
}

/// Substitute every `${NAME}` occurrence. `$` without a `{` passes through.
pub fn expand_env(
    raw: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(ConfigError::Invalid(format!(
                "unterminated '${{' in configuration near '{}'",
                &rest[start..rest.len().min(start + 20)]
            )));
        };
        let name = &after[..end];
        match lookup(name) {
            Some(value) => out.push_str(&value),
            None => return Err(ConfigError::MissingEnv(name.to_string())),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
