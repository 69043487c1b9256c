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
use crate::domain::types::{AgentId, WalletId};

#[derive(Deserialize)]
pub struct CreateWalletRequest {
    pub agent_id: AgentId,
    pub currency: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct DepositRequest {
    pub amount: Decimal,
}

// Handler: Crear una billetera (el dueño del agente, o el propio agente)
// POST /wallets
pub async fn create_wallet(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Json(payload): Json<CreateWalletRequest>,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), ApiError> {
    super::agent_in_scope(&state, principal, payload.agent_id).await?;
    let wallet = state
        .manage_wallets_use_case
        .create(payload.agent_id, payload.currency)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(serde_json::json!(wallet))),
    ))
}

// Handler: Detalle de una billetera
// GET /wallets/{id}
pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<WalletId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let (wallet, _) = super::wallet_in_scope(&state, principal, id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!(wallet))))
}

// Handler: Solo el saldo
// GET /wallets/{id}/balance
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<WalletId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let (wallet, _) = super::wallet_in_scope(&state, principal, id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "wallet_id": wallet.id,
        "balance": wallet.balance,
        "currency": wallet.currency,
    }))))
}

// Handler: Depósito — sube el balance sin pasar por reglas.
// POST /wallets/{id}/deposit
#[utoipa::path(
    post,
    path = "/wallets/{id}/deposit",
    request_body = DepositRequest,
    responses((status = 200, description = "Deposit recorded", body = ApiResponse<serde_json::Value>))
)]
pub async fn deposit(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<WalletId>,
    Json(payload): Json<DepositRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    super::wallet_in_scope(&state, principal, id).await?;
    let deposit = state.deposit_use_case.execute(id, payload.amount).await?;
    Ok(Json(ApiResponse::success(serde_json::json!(deposit))))
}

// Handler: Congelar manualmente (dueño)
// POST /wallets/{id}/freeze
pub async fn freeze_wallet(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<WalletId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let owner = principal.require_owner()?;
    super::wallet_in_scope(&state, crate::api::auth::AuthPrincipal::Owner(owner), id).await?;
    let wallet = state.manage_wallets_use_case.set_frozen(id, true).await?;
    Ok(Json(ApiResponse::success(serde_json::json!(wallet))))
}

// Handler: Descongelar manualmente (dueño)
// POST /wallets/{id}/unfreeze
pub async fn unfreeze_wallet(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<WalletId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let owner = principal.require_owner()?;
    super::wallet_in_scope(&state, crate::api::auth::AuthPrincipal::Owner(owner), id).await?;
    let wallet = state.manage_wallets_use_case.set_frozen(id, false).await?;
    Ok(Json(ApiResponse::success(serde_json::json!(wallet))))
}
