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
use crate::domain::error::RuleError;
use crate::domain::rules::RuleParams;
use crate::domain::types::{RuleId, WalletId};

#[derive(Deserialize)]
pub struct CreateRuleRequest {
    // Los params llegan etiquetados por "kind"; serde valida el esquema
    // por clase y la capa de dominio valida los rangos.
    #[serde(flatten)]
    pub params: RuleParams,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Deserialize)]
pub struct UpdateRuleRequest {
    #[serde(default)]
    pub params: Option<RuleParams>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub priority: Option<i32>,
}

// Handler: Crear una regla de gasto (dueño)
// POST /wallets/{id}/rules
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<WalletId>,
    Json(payload): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), ApiError> {
    let owner = principal.require_owner()?;
    super::wallet_in_scope(&state, AuthPrincipal::Owner(owner), id).await?;

    let rule = state
        .manage_rules_use_case
        .create(id, payload.params, payload.priority)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(serde_json::json!(rule))),
    ))
}

// Handler: Listar reglas de una billetera
// GET /wallets/{id}/rules
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<WalletId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    super::wallet_in_scope(&state, principal, id).await?;
    let rules = state.manage_rules_use_case.list(id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!(rules))))
}

// Handler: Actualizar una regla (dueño)
// PUT /rules/{id}
pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<RuleId>,
    Json(payload): Json<UpdateRuleRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    rule_in_owner_scope(&state, principal, id).await?;
    let rule = state
        .manage_rules_use_case
        .update(id, payload.params, payload.active, payload.priority)
        .await?;
    Ok(Json(ApiResponse::success(serde_json::json!(rule))))
}

// Handler: Borrar una regla (dueño)
// DELETE /rules/{id}
pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<RuleId>,
) -> Result<StatusCode, ApiError> {
    rule_in_owner_scope(&state, principal, id).await?;
    state.manage_rules_use_case.delete(id).await?;
    Ok(StatusCode::OK)
}

/// El dueño de la billetera de la regla es el único que puede mutarla.
async fn rule_in_owner_scope(
    state: &Arc<AppState>,
    principal: AuthPrincipal,
    rule_id: RuleId,
) -> Result<(), ApiError> {
    let owner = principal.require_owner()?;
    let rules = state.manage_rules_use_case.find(rule_id).await?;
    let Some(rule) = rules else {
        return Err(ApiError::Rule(RuleError::NotFound(rule_id)));
    };
    super::wallet_in_scope(state, AuthPrincipal::Owner(owner), rule.wallet_id).await?;
    Ok(())
}
