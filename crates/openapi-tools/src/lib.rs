//! OpenAPI -> MCP tool bridge.
//!
//! Turns an OpenAPI document plus a role name into a frozen set of MCP tools:
//! load the operations ([`spec`]), keep the ones the role allows ([`policy`]),
//! synthesize tool descriptors ([`synthesize`]), and dispatch invocations to
//! the backend API ([`dispatch`]) with response relaxation ([`relax`]).
//! [`registry::ToolRegistry`] ties the pipeline together.

pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod policy;
pub mod registry;
pub mod relax;
pub mod spec;
pub mod synthesize;

pub use config::ApiBridgeConfig;
pub use error::{BridgeError, Result};
pub use registry::ToolRegistry;
