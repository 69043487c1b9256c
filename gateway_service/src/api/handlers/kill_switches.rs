use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::auth::AuthPrincipal;
use crate::api::error::ApiError;
use crate::api::http_routes::AppState;
use crate::api::response::ApiResponse;
use crate::domain::error::KillSwitchError;
use crate::domain::killswitch::KillSwitchKind;
use crate::domain::types::{KillSwitchId, WalletId};

#[derive(Deserialize)]
pub struct CreateKillSwitchRequest {
    pub kind: KillSwitchKind,
    pub threshold: Decimal,
    pub window_hours: i64,
}

// Handler: Crear un kill switch (dueño)
// POST /wallets/{id}/kill-switches
pub async fn create_kill_switch(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<WalletId>,
    Json(payload): Json<CreateKillSwitchRequest>,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), ApiError> {
    let owner = principal.require_owner()?;
    super::wallet_in_scope(&state, AuthPrincipal::Owner(owner), id).await?;

    let switch = state
        .manage_kill_switches_use_case
        .create(id, payload.kind, payload.threshold, payload.window_hours)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(serde_json::json!(switch))),
    ))
}

// Handler: Listar kill switches activos de una billetera
// GET /wallets/{id}/kill-switches
pub async fn list_kill_switches(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<WalletId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    super::wallet_in_scope(&state, principal, id).await?;
    let switches = state.manage_kill_switches_use_case.list(id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!(switches))))
}

// Handler: Reset de operador — despega el pestillo y reactiva la billetera.
// POST /kill-switches/{id}/reset
pub async fn reset_kill_switch(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<KillSwitchId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    kill_switch_in_owner_scope(&state, principal, id).await?;
    state.manage_kill_switches_use_case.reset(id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({ "reset": true }))))
}

// Handler: Borrar un kill switch (dueño)
// DELETE /kill-switches/{id}
pub async fn delete_kill_switch(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<KillSwitchId>,
) -> Result<StatusCode, ApiError> {
    kill_switch_in_owner_scope(&state, principal, id).await?;
    state.manage_kill_switches_use_case.delete(id).await?;
    Ok(StatusCode::OK)
}

// Handler: Parada de emergencia (dueño) — sin evaluación de gatillos.
// POST /wallets/{id}/emergency-stop
pub async fn emergency_stop(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<WalletId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let owner = principal.require_owner()?;
    super::wallet_in_scope(&state, AuthPrincipal::Owner(owner), id).await?;
    state.manage_kill_switches_use_case.emergency_stop(id).await?;
    Ok(Json(ApiResponse::success(
        serde_json::json!({ "stopped": true }),
    )))
}

async fn kill_switch_in_owner_scope(
    state: &Arc<AppState>,
    principal: AuthPrincipal,
    id: KillSwitchId,
) -> Result<(), ApiError> {
    let owner = principal.require_owner()?;
    let switch = state
        .manage_kill_switches_use_case
        .find(id)
        .await?
        .ok_or(ApiError::KillSwitch(KillSwitchError::NotFound(id)))?;
    super::wallet_in_scope(state, AuthPrincipal::Owner(owner), switch.wallet_id).await?;
    Ok(())
}
