pub mod agents;
pub mod audit;
pub mod cross_agent;
pub mod dead_man;
pub mod kill_switches;
pub mod lineage;
pub mod rules;
pub mod transactions;
pub mod wallets;

use std::sync::Arc;

use crate::api::auth::AuthPrincipal;
use crate::api::error::ApiError;
use crate::api::http_routes::AppState;
use crate::domain::entities::{Agent, Wallet};
use crate::domain::error::{AgentError, WalletError};
use crate::domain::types::{AgentId, WalletId};

/// Resuelve una billetera verificando el alcance del principal: el dueño
/// del agente, o el propio agente dueño de la billetera.
pub async fn wallet_in_scope(
    state: &Arc<AppState>,
    principal: AuthPrincipal,
    wallet_id: WalletId,
) -> Result<(Wallet, Agent), ApiError> {
    let wallet = state.manage_wallets_use_case.get(wallet_id).await?;
    let agent = state
        .agent_repo
        .find_by_id(wallet.agent_id)
        .await?
        .ok_or(WalletError::AgentNotFound(wallet.agent_id))?;

    match principal {
        AuthPrincipal::Owner(owner) if owner.id == agent.owner_id => Ok((wallet, agent)),
        AuthPrincipal::Agent(caller) if caller.id == agent.id => Ok((wallet, agent)),
        AuthPrincipal::Owner(_) => Err(ApiError::Forbidden(
            "Wallet belongs to another owner".to_string(),
        )),
        AuthPrincipal::Agent(_) => Err(ApiError::Forbidden(
            "Agents may only operate on their own wallets".to_string(),
        )),
    }
}

/// Resuelve un agente permitiendo al dueño que lo posee o al propio
/// agente. Un dueño ajeno nunca pasa: el agente se busca y se compara su
/// `owner_id` contra el principal.
pub async fn agent_in_scope(
    state: &Arc<AppState>,
    principal: AuthPrincipal,
    agent_id: AgentId,
) -> Result<Agent, ApiError> {
    match principal {
        AuthPrincipal::Agent(agent) if agent.id == agent_id => Ok(agent),
        AuthPrincipal::Agent(_) => Err(ApiError::Forbidden(
            "Agents may only operate on their own resources".to_string(),
        )),
        owner @ AuthPrincipal::Owner(_) => owned_agent(state, owner, agent_id).await,
    }
}

/// Resuelve un agente exigiendo que el dueño autenticado lo posea.
pub async fn owned_agent(
    state: &Arc<AppState>,
    principal: AuthPrincipal,
    agent_id: AgentId,
) -> Result<Agent, ApiError> {
    let owner = principal.require_owner()?;
    let agent = state
        .agent_repo
        .find_by_id(agent_id)
        .await?
        .ok_or(AgentError::NotFound(agent_id))?;
    if agent.owner_id != owner.id {
        return Err(ApiError::Forbidden(
            "Agent belongs to another owner".to_string(),
        ));
    }
    Ok(agent)
}
