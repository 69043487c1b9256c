use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::auth::AuthPrincipal;
use crate::api::error::ApiError;
use crate::api::http_routes::AppState;
use crate::api::response::ApiResponse;
use crate::domain::crossagent::{CrossAgentPolicy, SettlementMode};
use crate::domain::entities::AgentGroup;
use crate::domain::error::CrossAgentError;
use crate::domain::types::{AgentId, CrossAgentTxId, GroupId, PolicyId};

#[derive(Deserialize)]
pub struct PolicyRequest {
    pub source_agent_id: AgentId,
    #[serde(default)]
    pub target_agent_id: Option<AgentId>,
    #[serde(default)]
    pub target_agent_group: Option<GroupId>,
    pub allowed_payment_types: Vec<String>,
    pub max_per_transaction: Decimal,
    pub max_daily_to_target: Decimal,
    pub max_daily_all_agents: Decimal,
    #[serde(default)]
    pub require_human_approval_above: Option<Decimal>,
    #[serde(default)]
    pub require_mutual_policy: bool,
    pub settlement_mode: SettlementMode,
    #[serde(default)]
    pub min_counterparty_trust_score: Decimal,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub agent_ids: Vec<AgentId>,
}

#[derive(Deserialize)]
pub struct AuthorizeRequest {
    pub source_agent_id: AgentId,
    pub target_agent_id: AgentId,
    pub amount: Decimal,
    pub payment_type: String,
}

// Handler: Crear una política cross-agent (dueño)
// POST /cross-agent/policies
pub async fn create_policy(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Json(payload): Json<PolicyRequest>,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), ApiError> {
    let owner = principal.require_owner()?;
    super::owned_agent(
        &state,
        AuthPrincipal::Owner(owner.clone()),
        payload.source_agent_id,
    )
    .await?;

    let policy = CrossAgentPolicy {
        id: PolicyId::new(),
        owner_id: owner.id,
        source_agent_id: payload.source_agent_id,
        target_agent_id: payload.target_agent_id,
        target_agent_group: payload.target_agent_group,
        allowed_payment_types: payload.allowed_payment_types,
        max_per_transaction: payload.max_per_transaction,
        max_daily_to_target: payload.max_daily_to_target,
        max_daily_all_agents: payload.max_daily_all_agents,
        require_human_approval_above: payload.require_human_approval_above,
        require_mutual_policy: payload.require_mutual_policy,
        settlement_mode: payload.settlement_mode,
        min_counterparty_trust_score: payload.min_counterparty_trust_score,
        enabled: payload.enabled,
        created_at: Utc::now(),
    };
    let saved = state.cross_agent_use_case.create_policy(policy).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(serde_json::json!(saved))),
    ))
}

// Handler: Listar políticas del dueño
// GET /cross-agent/policies
pub async fn list_policies(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let owner = principal.require_owner()?;
    let policies = state.cross_agent_use_case.list_policies(owner.id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!(policies))))
}

// Handler: Actualizar una política (dueño)
// PUT /cross-agent/policies/{id}
pub async fn update_policy(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<PolicyId>,
    Json(payload): Json<PolicyRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let owner = policy_in_owner_scope(&state, principal, id).await?;
    super::owned_agent(
        &state,
        AuthPrincipal::Owner(owner.clone()),
        payload.source_agent_id,
    )
    .await?;

    let policy = CrossAgentPolicy {
        id,
        owner_id: owner.id,
        source_agent_id: payload.source_agent_id,
        target_agent_id: payload.target_agent_id,
        target_agent_group: payload.target_agent_group,
        allowed_payment_types: payload.allowed_payment_types,
        max_per_transaction: payload.max_per_transaction,
        max_daily_to_target: payload.max_daily_to_target,
        max_daily_all_agents: payload.max_daily_all_agents,
        require_human_approval_above: payload.require_human_approval_above,
        require_mutual_policy: payload.require_mutual_policy,
        settlement_mode: payload.settlement_mode,
        min_counterparty_trust_score: payload.min_counterparty_trust_score,
        enabled: payload.enabled,
        created_at: Utc::now(),
    };
    let updated = state.cross_agent_use_case.update_policy(policy).await?;
    Ok(Json(ApiResponse::success(serde_json::json!(updated))))
}

// Handler: Borrar una política (dueño)
// DELETE /cross-agent/policies/{id}
pub async fn delete_policy(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<PolicyId>,
) -> Result<StatusCode, ApiError> {
    policy_in_owner_scope(&state, principal, id).await?;
    state.cross_agent_use_case.delete_policy(id).await?;
    Ok(StatusCode::OK)
}

/// Solo el dueño de una política puede mutarla; para cualquier otro dueño
/// la política no existe.
async fn policy_in_owner_scope(
    state: &Arc<AppState>,
    principal: AuthPrincipal,
    id: PolicyId,
) -> Result<crate::domain::entities::Owner, ApiError> {
    let owner = principal.require_owner()?;
    let policy = state
        .cross_agent_use_case
        .find_policy(id)
        .await?
        .ok_or(ApiError::CrossAgent(CrossAgentError::PolicyNotFound(id)))?;
    if policy.owner_id != owner.id {
        return Err(ApiError::CrossAgent(CrossAgentError::PolicyNotFound(id)));
    }
    Ok(owner)
}

// Handler: Crear un grupo de agentes (dueño)
// POST /cross-agent/groups
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), ApiError> {
    let owner = principal.require_owner()?;
    let group = AgentGroup {
        id: GroupId::new(),
        owner_id: owner.id,
        name: payload.name,
        agent_ids: payload.agent_ids,
    };
    let saved = state.cross_agent_use_case.create_group(group).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(serde_json::json!(saved))),
    ))
}

// Handler: Autorizar un pago agent-a-agent.
// POST /cross-agent/authorize
//
// Un principal agente solo puede originar pagos propios; el dueño puede
// originar en nombre de cualquiera de sus agentes.
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Json(payload): Json<AuthorizeRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    match principal {
        AuthPrincipal::Agent(ref agent) if agent.id != payload.source_agent_id => {
            return Err(ApiError::Forbidden(
                "Agents may only authorize their own outgoing payments".to_string(),
            ));
        }
        AuthPrincipal::Owner(owner) => {
            super::owned_agent(
                &state,
                AuthPrincipal::Owner(owner),
                payload.source_agent_id,
            )
            .await?;
        }
        _ => {}
    }

    let tx = state
        .cross_agent_use_case
        .authorize(
            payload.source_agent_id,
            payload.target_agent_id,
            payload.amount,
            payload.payment_type,
        )
        .await?;

    let (code, status) = if tx.authorized {
        (StatusCode::OK, "success")
    } else if tx.requires_human {
        (StatusCode::ACCEPTED, "escalated")
    } else {
        (StatusCode::BAD_REQUEST, "rejected")
    };

    Ok((
        code,
        Json(serde_json::json!({ "status": status, "data": tx })),
    ))
}

// Handler: Aprobar una transacción cross-agent escalada (dueño)
// POST /cross-agent/transactions/{id}/approve
pub async fn approve_transaction(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<CrossAgentTxId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let owner = principal.require_owner()?;
    let approved = state.cross_agent_use_case.approve(id, owner.id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!(approved))))
}
