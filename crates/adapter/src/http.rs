//! MCP over streamable HTTP.
//!
//! `POST /mcp` carries one JSON-RPC message per request and answers with
//! JSON; notifications (no `id`) are accepted with 202 and no body.
//! `GET /health` reports the backend and its tool count.

use crate::backend::{Backend, CallOutcome, error_result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;

const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const DEFAULT_PROTOCOL_VERSION: &str = "2025-03-26";

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub server_name: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/mcp", post(mcp_post))
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "backend": state.backend.name(),
        "tools": state.backend.tool_count(),
    }))
}

async fn mcp_post(State(state): State<AppState>, Json(message): Json<Value>) -> Response {
    match handle_message(&state, &message).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Dispatch one JSON-RPC message. `None` means no response is due.
pub async fn handle_message(state: &AppState, message: &Value) -> Option<Value> {
    // Notifications carry no id and get no response.
    let id = message.get("id")?.clone();

    let Some(method) = message.get("method").and_then(Value::as_str) else {
        return Some(jsonrpc_err(
            &id,
            INVALID_REQUEST,
            "request has no string 'method'",
        ));
    };

    let response = match method {
        "initialize" => jsonrpc_ok(&id, initialize_result(state, message)),
        "ping" => jsonrpc_ok(&id, json!({})),
        "tools/list" => jsonrpc_ok(&id, json!({ "tools": state.backend.list_tools() })),
        "tools/call" => tools_call(state, &id, message).await,
        other => {
            tracing::debug!(method = other, "unsupported MCP method");
            jsonrpc_err(&id, METHOD_NOT_FOUND, &format!("method not found: {other}"))
        }
    };
    Some(response)
}

fn initialize_result(state: &AppState, message: &Value) -> Value {
    let protocol_version = message
        .get("params")
        .and_then(|p| p.get("protocolVersion"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PROTOCOL_VERSION);

    json!({
        "protocolVersion": protocol_version,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": state.server_name,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

async fn tools_call(state: &AppState, id: &Value, message: &Value) -> Value {
    let params = message.get("params");
    let Some(name) = params
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
    else {
        return jsonrpc_err(id, INVALID_PARAMS, "tools/call requires params.name");
    };
    let arguments = params
        .and_then(|p| p.get("arguments"))
        .cloned()
        .unwrap_or_else(|| json!({}));

    match state.backend.call_tool(name, arguments).await {
        CallOutcome::Success(result) => match serde_json::to_value(&result) {
            Ok(value) => jsonrpc_ok(id, value),
            Err(e) => jsonrpc_err(id, -32603, &format!("failed to encode result: {e}")),
        },
        CallOutcome::ToolError(message) => {
            let result = error_result(message);
            match serde_json::to_value(&result) {
                Ok(value) => jsonrpc_ok(id, value),
                Err(e) => jsonrpc_err(id, -32603, &format!("failed to encode result: {e}")),
            }
        }
        CallOutcome::Protocol { code, message } => jsonrpc_err(id, code, &message),
    }
}

fn jsonrpc_ok(id: &Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn jsonrpc_err(id: &Value, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}
