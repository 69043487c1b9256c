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
use crate::domain::entities::{SpendCandidate, TransactionStatus};
use crate::domain::types::{TransactionId, WalletId};

#[derive(Deserialize)]
pub struct RejectTransactionRequest {
    pub reason: String,
}

// Handler: Admisión de un gasto — el camino único por todas las compuertas.
// POST /wallets/{id}/transactions
//
// Clases de resultado: Completed 200, AwaitingApproval 202,
// Rejected/KillSwitched 400 (con la transacción persistida en el cuerpo).
#[utoipa::path(
    post,
    path = "/wallets/{id}/transactions",
    responses(
        (status = 200, description = "Completed", body = ApiResponse<serde_json::Value>),
        (status = 202, description = "Awaiting owner approval"),
        (status = 400, description = "Rejected by policy")
    )
)]
pub async fn submit_transaction(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<WalletId>,
    Json(candidate): Json<SpendCandidate>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    super::wallet_in_scope(&state, principal, id).await?;
    let transaction = state
        .submit_transaction_use_case
        .execute(id, candidate)
        .await?;

    let (code, status) = match transaction.status {
        TransactionStatus::Completed => (StatusCode::OK, "success"),
        TransactionStatus::AwaitingApproval => (StatusCode::ACCEPTED, "awaiting_approval"),
        _ => (StatusCode::BAD_REQUEST, "rejected"),
    };

    Ok((
        code,
        Json(serde_json::json!({
            "status": status,
            "data": transaction,
        })),
    ))
}

// Handler: Historial de una billetera
// GET /wallets/{id}/transactions
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<WalletId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    super::wallet_in_scope(&state, principal, id).await?;
    let transactions = state
        .approve_transaction_use_case
        .list_for_wallet(id)
        .await?;
    Ok(Json(ApiResponse::success(serde_json::json!(transactions))))
}

// Handler: Transacciones a la espera de aprobación del dueño
// GET /transactions/pending
#[utoipa::path(
    get,
    path = "/transactions/pending",
    responses((status = 200, description = "Pending transactions", body = ApiResponse<serde_json::Value>))
)]
pub async fn list_pending(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let owner = principal.require_owner()?;
    let pending = state
        .approve_transaction_use_case
        .list_pending(owner.id)
        .await?;
    Ok(Json(ApiResponse::success(serde_json::json!(pending))))
}

// Handler: Aprobar una transacción retenida (dueño)
// POST /transactions/{id}/approve
pub async fn approve_transaction(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<TransactionId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let owner = principal.require_owner()?;
    let transaction = state
        .approve_transaction_use_case
        .approve(id, owner.id)
        .await?;
    Ok(Json(ApiResponse::success(serde_json::json!(transaction))))
}

// Handler: Rechazar una transacción retenida (dueño)
// POST /transactions/{id}/reject
pub async fn reject_transaction(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<TransactionId>,
    Json(payload): Json<RejectTransactionRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let owner = principal.require_owner()?;
    let transaction = state
        .approve_transaction_use_case
        .reject(id, owner.id, payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(serde_json::json!(transaction))))
}
