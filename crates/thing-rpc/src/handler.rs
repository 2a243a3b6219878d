//! JSON-RPC request handlers.

use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thing_registry::{RegistryError, ThingDescription};
use tracing::{debug, error, warn};

// ============================================================================
// JSON-RPC types
// ============================================================================

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Code for an unknown method.
const METHOD_NOT_FOUND: i32 = -32601;

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }
}

// ============================================================================
// Parameter extraction helpers
// ============================================================================

/// Extract a required string parameter or return an error.
fn require_str_param(params: &Value, name: &str) -> thing_registry::Result<String> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| RegistryError::InvalidParams {
            message: format!("Missing required parameter: {}", name),
        })
}

/// Extract a required Thing description parameter.
fn require_description_param(params: &Value, name: &str) -> thing_registry::Result<ThingDescription> {
    let raw = params
        .get(name)
        .cloned()
        .ok_or_else(|| RegistryError::InvalidParams {
            message: format!("Missing required parameter: {}", name),
        })?;
    serde_json::from_value(raw).map_err(|e| RegistryError::InvalidParams {
        message: format!("Invalid {}: {}", name, e),
    })
}

// ============================================================================
// HTTP handlers
// ============================================================================

/// Health check endpoint.
pub async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "subscribers": state.api.hub().len(),
    }))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let method = &request.method;
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    let id = request.id.clone();

    debug!("RPC call: {}({:?})", method, params);

    match dispatch_method(&state, method, &params).await {
        Ok(Some(value)) => (StatusCode::OK, Json(JsonRpcResponse::success(id, value))),
        Ok(None) => {
            warn!("Method not found: {}", method);
            (
                StatusCode::OK,
                Json(JsonRpcResponse::error(
                    id,
                    METHOD_NOT_FOUND,
                    format!("Method not found: {}", method),
                )),
            )
        }
        Err(e) => {
            if e.is_not_found() {
                debug!("RPC {} found nothing: {}", method, e);
            } else {
                error!("RPC error for {}: {}", method, e);
            }
            (
                StatusCode::OK,
                Json(JsonRpcResponse::error(id, e.to_rpc_error_code(), e.to_string())),
            )
        }
    }
}

// ============================================================================
// Method dispatcher
// ============================================================================

/// Dispatch a method call. `Ok(None)` means the method is unknown.
async fn dispatch_method(
    state: &AppState,
    method: &str,
    params: &Value,
) -> thing_registry::Result<Option<Value>> {
    let value = match method {
        // Registry
        "list_things" => serde_json::to_value(state.api.list_things().await?)?,
        "get_thing" => {
            let id = require_str_param(params, "id")?;
            serde_json::to_value(state.api.get_thing(&id).await?)?
        }
        "create_thing" => {
            let id = require_str_param(params, "id")?;
            let description = require_description_param(params, "description")?;
            serde_json::to_value(state.api.create_thing(&id, description).await?)?
        }
        "remove_thing" => {
            let id = require_str_param(params, "id")?;
            state.api.remove_thing(&id).await?;
            json!({"removed": id})
        }

        // Discovery
        "list_new_things" => serde_json::to_value(state.api.new_things().await?)?,
        "report_device_connected" => {
            let description = require_description_param(params, "description")?;
            let added = state.discovery.device_connected(description)?;
            json!({"added": added})
        }
        "report_device_disconnected" => {
            let id = require_str_param(params, "id")?;
            let removed = state.discovery.device_disconnected(&id)?;
            json!({"removed": removed})
        }

        _ => return Ok(None),
    };
    Ok(Some(value))
}
