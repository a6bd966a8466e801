//! SSH device command tools.
//!
//! Exposes two MCP tools over interactive SSH to network devices:
//! `show_command` (read-only) and `config_commands` (applies configuration
//! and saves it). Device credentials come from configuration only; the
//! per-call `host` argument is the one piece of routing a caller controls.

pub mod config;
pub mod error;
pub mod redact;
pub mod runtime;
pub mod transport;

pub use config::DeviceConfig;
pub use error::{SshToolsError, Result};
pub use runtime::DeviceToolSource;
