use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::auth::AuthPrincipal;
use crate::api::error::ApiError;
use crate::api::http_routes::AppState;
use crate::api::response::ApiResponse;

#[derive(Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub agent_id: Option<crate::domain::types::AgentId>,
}

fn default_limit() -> i64 {
    100
}

// Handler: Audit trail del dueño, opcionalmente filtrado por agente
// GET /audit?limit=&agent_id=
pub async fn list_audit(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Query(query): Query<AuditQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let owner = principal.require_owner()?;
    let entries = match query.agent_id {
        Some(agent_id) => {
            super::owned_agent(&state, AuthPrincipal::Owner(owner), agent_id).await?;
            state
                .audit_trail_use_case
                .list_for_agent(agent_id, query.limit)
                .await?
        }
        None => state.audit_trail_use_case.list(owner.id, query.limit).await?,
    };
    Ok(Json(ApiResponse::success(serde_json::json!(entries))))
}

// Handler: Export en JSON Lines
// GET /audit/export
pub async fn export_audit(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
) -> Result<String, ApiError> {
    let owner = principal.require_owner()?;
    Ok(state.audit_trail_use_case.export(owner.id).await?)
}

// Handler: Conteos por decisión
// GET /audit/summary
pub async fn audit_summary(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let owner = principal.require_owner()?;
    let summary = state.audit_trail_use_case.summary(owner.id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!(summary))))
}
