use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::auth::AuthPrincipal;
use crate::api::error::ApiError;
use crate::api::http_routes::AppState;
use crate::api::response::ApiResponse;
use crate::domain::lineage::SpawnOverrides;
use crate::domain::types::AgentId;

#[derive(Deserialize)]
pub struct SpawnRequest {
    pub child_agent_id: AgentId,
    #[serde(default)]
    pub overrides: SpawnOverrides,
}

#[derive(Deserialize)]
pub struct TerminateLineageRequest {
    #[serde(default = "default_cascade")]
    pub cascade: bool,
}

fn default_cascade() -> bool {
    true
}

// Handler: Spawn de un agente hijo (dueño). El hijo debe existir como
// agente del mismo dueño; el governor deriva su política monótona.
// POST /agents/{id}/spawn
pub async fn spawn_child(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(parent_id): Path<AgentId>,
    Json(payload): Json<SpawnRequest>,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), ApiError> {
    let owner = principal.require_owner()?;
    super::owned_agent(&state, AuthPrincipal::Owner(owner.clone()), parent_id).await?;
    super::owned_agent(
        &state,
        AuthPrincipal::Owner(owner),
        payload.child_agent_id,
    )
    .await?;

    let lineage = state
        .spawn_agent_use_case
        .spawn(parent_id, payload.child_agent_id, payload.overrides)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(serde_json::json!(lineage))),
    ))
}

// Handler: Leer el linaje (dueño o el propio agente miembro)
// GET /agents/{id}/lineage
pub async fn get_lineage(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<AgentId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    match principal {
        AuthPrincipal::Owner(_) => {
            super::owned_agent(&state, principal, id).await?;
        }
        AuthPrincipal::Agent(ref agent) if agent.id == id => {}
        AuthPrincipal::Agent(_) => {
            return Err(ApiError::Forbidden(
                "Agents may only read their own lineage".to_string(),
            ));
        }
    }
    let lineage = state.spawn_agent_use_case.get_lineage(id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!(lineage))))
}

// Handler: Terminar el linaje completo — irreversible (dueño)
// POST /agents/{id}/terminate-lineage
pub async fn terminate_lineage(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<AgentId>,
    Json(payload): Json<TerminateLineageRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    super::owned_agent(&state, principal, id).await?;
    let terminated = state
        .spawn_agent_use_case
        .terminate_lineage(id, payload.cascade)
        .await?;
    Ok(Json(ApiResponse::success(
        serde_json::json!({ "terminated": terminated }),
    )))
}
