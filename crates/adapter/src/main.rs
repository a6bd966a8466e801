//! Adapter process entry point.
//!
//! Builds the configured backend to completion (no partial tool set is ever
//! served), then exposes it over MCP streamable HTTP.

mod backend;
mod config;
mod http;

use anyhow::Context as _;
use backend::{Backend, OpenApiBackend, SshBackend};
use clap::Parser;
use config::AdapterConfig;
use netbridge_openapi_tools::ToolRegistry;
use netbridge_ssh_tools::DeviceToolSource;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "netbridge-mcp-adapter", version, about)]
struct Cli {
    /// Backend configuration file.
    #[arg(long, env = "NETBRIDGE_CONFIG", default_value = "netbridge.yaml")]
    config: PathBuf,

    /// Listen address.
    #[arg(long, env = "MCP_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Listen port.
    #[arg(long, env = "MCP_PORT", default_value_t = 8000)]
    port: u16,

    /// Override the role configured for an OpenAPI backend.
    #[arg(long, env = "MCP_ROLE")]
    role: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "NETBRIDGE_LOG_JSON", default_value_t = false)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = AdapterConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    config.apply_role_override(cli.role);
    let server_name = config.display_name();

    let backend: Arc<dyn Backend> = if let Some(api) = config.openapi {
        let document = std::fs::read_to_string(&api.spec)
            .with_context(|| format!("reading OpenAPI document '{}'", api.spec))?;
        let registry = ToolRegistry::build(&api, &document)
            .with_context(|| format!("building tool registry for '{}'", api.spec))?;
        tracing::info!(
            backend = %server_name,
            role = registry.role(),
            tools = registry.len(),
            "OpenAPI backend ready"
        );
        Arc::new(OpenApiBackend::new(server_name.clone(), registry))
    } else if let Some(device) = config.ssh {
        tracing::info!(backend = %server_name, "SSH device backend ready");
        Arc::new(SshBackend::new(DeviceToolSource::new(
            server_name.clone(),
            device,
        )))
    } else {
        // AdapterConfig::load validated exactly one backend.
        unreachable!("validated configuration has a backend");
    };

    let state = http::AppState {
        backend,
        server_name: server_name.clone(),
    };
    let app = http::router(state);

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, server = %server_name, "serving MCP over streamable HTTP");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    Ok(())
}
