//! JSON surface for invoking the registered CRM tools directly.
//!
//! - `GET  /agent/tools`        — list tool descriptors
//! - `POST /agent/tools/{name}` — execute one tool with JSON arguments

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::info;

use casebridge_agent::{ToolDescriptor, ToolError, ToolRegistry};

#[derive(Clone)]
pub struct ToolsState {
    pub registry: Arc<ToolRegistry>,
}

pub fn router(state: ToolsState) -> Router {
    Router::new()
        .route("/agent/tools", get(list_tools))
        .route("/agent/tools/{name}", post(execute_tool))
        .with_state(state)
}

pub async fn list_tools(State(state): State<ToolsState>) -> Json<Vec<ToolDescriptor>> {
    Json(state.registry.descriptors())
}

pub async fn execute_tool(
    State(state): State<ToolsState>,
    Path(name): Path<String>,
    Json(args): Json<Value>,
) -> (StatusCode, Json<Value>) {
    match state.registry.execute(&name, args).await {
        Ok(result) => {
            info!(event_name = "tools.executed", tool = %name, "tool executed");
            (StatusCode::OK, Json(json!({ "result": result })))
        }
        Err(error @ ToolError::Unknown(_)) => {
            (StatusCode::NOT_FOUND, Json(json!({ "error": error.to_string() })))
        }
        Err(error @ ToolError::InvalidArguments { .. }) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": error.to_string() })))
        }
        Err(error @ ToolError::Execution { .. }) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": error.to_string() })))
        }
    }
}
