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
use crate::domain::entities::AgentStatus;
use crate::domain::types::AgentId;

#[derive(Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateOwnerRequest {
    pub contact: String,
}

// Handler: Alta de un dueño — bootstrap sin credencial previa.
// POST /owners
//
// La api key se devuelve una única vez; la rotación la reemplaza.
pub async fn create_owner(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOwnerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), ApiError> {
    let owner = crate::domain::entities::Owner::new(payload.contact)?;
    let saved = state.owner_repo.create(owner).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(serde_json::json!(saved))),
    ))
}

// Handler: Rotación atómica de la api key del dueño autenticado.
// POST /owners/rotate-key
pub async fn rotate_owner_key(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let owner = principal.require_owner()?;
    let api_key = crate::domain::entities::generate_api_key("owner");
    state.owner_repo.rotate_api_key(owner.id, api_key.clone()).await?;
    Ok(Json(ApiResponse::success(
        serde_json::json!({ "api_key": api_key }),
    )))
}

// Handler: Crear un agente (dueño). La api key vuelve una sola vez.
// POST /agents
pub async fn create_agent(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Json(payload): Json<CreateAgentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), ApiError> {
    let owner = principal.require_owner()?;
    let agent = state
        .manage_agents_use_case
        .create(owner.id, payload.name)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(serde_json::json!(agent))),
    ))
}

// Handler: Listar agentes del dueño
// GET /agents
pub async fn list_agents(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let owner = principal.require_owner()?;
    let agents = state.manage_agents_use_case.list(owner.id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!(agents))))
}

// Handler: Detalle de un agente
// GET /agents/{id}
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<AgentId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let agent = super::owned_agent(&state, principal, id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!(agent))))
}

// Handler: Pausar un agente (dueño)
// POST /agents/{id}/pause
pub async fn pause_agent(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<AgentId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let owner = principal.require_owner()?;
    let agent = state
        .manage_agents_use_case
        .set_status(owner.id, id, AgentStatus::Paused)
        .await?;
    Ok(Json(ApiResponse::success(serde_json::json!(agent))))
}

// Handler: Billeteras de un agente
// GET /agents/{id}/wallets
pub async fn list_agent_wallets(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<AgentId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    super::agent_in_scope(&state, principal, id).await?;
    let wallets = state.manage_wallets_use_case.list_for_agent(id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!(wallets))))
}

// Handler: Reactivar un agente pausado (dueño)
// POST /agents/{id}/activate
pub async fn activate_agent(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<AgentId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let owner = principal.require_owner()?;
    let agent = state
        .manage_agents_use_case
        .set_status(owner.id, id, AgentStatus::Active)
        .await?;
    Ok(Json(ApiResponse::success(serde_json::json!(agent))))
}
