use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::http_routes::AppState;
use crate::domain::entities::{Agent, AgentStatus, Owner};

/// Principal autenticado: dueño (alcance completo) o agente (limitado a
/// sus propios recursos). La credencial es un bearer token opaco que se
/// resuelve contra el store.
pub enum AuthPrincipal {
    Owner(Owner),
    Agent(Agent),
}

impl AuthPrincipal {
    /// Exige un principal de clase dueño.
    pub fn require_owner(self) -> Result<Owner, ApiError> {
        match self {
            AuthPrincipal::Owner(owner) => Ok(owner),
            AuthPrincipal::Agent(_) => Err(ApiError::Forbidden(
                "This operation requires an owner credential".to_string(),
            )),
        }
    }

    /// Exige un principal de clase agente (p. ej. heartbeat).
    pub fn require_agent(self) -> Result<Agent, ApiError> {
        match self {
            AuthPrincipal::Agent(agent) => Ok(agent),
            AuthPrincipal::Owner(_) => Err(ApiError::Forbidden(
                "This operation requires an agent credential".to_string(),
            )),
        }
    }
}

impl FromRequestParts<Arc<AppState>> for AuthPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        // Primero dueños, después agentes: las credenciales son opacas y
        // disjuntas por construcción.
        if let Some(owner) = state.owner_repo.find_by_api_key(token).await? {
            return Ok(AuthPrincipal::Owner(owner));
        }

        if let Some(agent) = state.agent_repo.find_by_api_key(token).await? {
            // Credencial válida pero principal inactivo: 403, no 401.
            if agent.status != AgentStatus::Active {
                return Err(ApiError::Forbidden(format!(
                    "Agent {} is {:?}",
                    agent.id, agent.status
                )));
            }
            return Ok(AuthPrincipal::Agent(agent));
        }

        Err(ApiError::Unauthorized)
    }
}
