use std::sync::Arc;

use crate::domain::audit::{AuditDecision, AuditLog};
use crate::domain::entities::{Agent, AgentStatus};
use crate::domain::error::AgentError;
use crate::domain::repository::{AgentRepository, AuditLogRepository};
use crate::domain::types::{AgentId, OwnerId};

/// Ciclo de vida de agentes: alta (la api key se devuelve una sola vez),
/// pausa y reactivación manual por el dueño.
pub struct ManageAgentsUseCase {
    agent_repo: Arc<dyn AgentRepository>,
    audit_repo: Arc<dyn AuditLogRepository>,
}

impl ManageAgentsUseCase {
    pub fn new(agent_repo: Arc<dyn AgentRepository>, audit_repo: Arc<dyn AuditLogRepository>) -> Self {
        Self {
            agent_repo,
            audit_repo,
        }
    }

    #[tracing::instrument(name = "ManageAgentsUseCase::create", skip(self))]
    pub async fn create(&self, owner: OwnerId, name: String) -> Result<Agent, AgentError> {
        let agent = Agent::new(owner, name)?;
        let saved = self.agent_repo.create(agent).await?;
        self.audit(&saved, "agent.create", AuditDecision::Allowed).await;
        Ok(saved)
    }

    pub async fn get(&self, owner: OwnerId, id: AgentId) -> Result<Agent, AgentError> {
        let agent = self
            .agent_repo
            .find_by_id(id)
            .await?
            .ok_or(AgentError::NotFound(id))?;
        if agent.owner_id != owner {
            return Err(AgentError::NotFound(id));
        }
        Ok(agent)
    }

    pub async fn list(&self, owner: OwnerId) -> Result<Vec<Agent>, AgentError> {
        self.agent_repo.list_by_owner(owner).await
    }

    /// Transición manual de estado (pause / activate). Los estados
    /// terminales no se tocan desde acá.
    #[tracing::instrument(name = "ManageAgentsUseCase::set_status", skip(self))]
    pub async fn set_status(
        &self,
        owner: OwnerId,
        id: AgentId,
        status: AgentStatus,
    ) -> Result<Agent, AgentError> {
        let mut agent = self.get(owner, id).await?;
        agent.can_transition_to(status)?;
        self.agent_repo.update_status(id, status).await?;
        agent.status = status;
        self.audit(&agent, "agent.set_status", AuditDecision::System).await;
        Ok(agent)
    }

    async fn audit(&self, agent: &Agent, action: &str, decision: AuditDecision) {
        let entry = AuditLog::new(
            Some(agent.id),
            action,
            "agent",
            agent.id.to_string(),
            decision,
            serde_json::json!({ "status": agent.status, "owner_id": agent.owner_id }),
        );
        if let Err(e) = self.audit_repo.append(entry).await {
            tracing::error!("Failed to audit {} for {}: {}", action, agent.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::{MockAgentRepository, MockAuditLogRepository};

    #[tokio::test]
    async fn test_create_returns_fresh_api_key() {
        let mut agents = MockAgentRepository::new();
        let mut audit = MockAuditLogRepository::new();
        agents.expect_create().returning(|agent| Ok(agent));
        audit.expect_append().returning(|entry| Ok(entry));

        let use_case = ManageAgentsUseCase::new(Arc::new(agents), Arc::new(audit));
        let agent = use_case
            .create(OwnerId::new(), "researcher".to_string())
            .await
            .unwrap();

        assert!(agent.api_key.starts_with("aw_agent_"));
        assert_eq!(agent.status, AgentStatus::Active);
    }

    #[tokio::test]
    async fn test_set_status_rejects_terminal_agents() {
        let owner = OwnerId::new();
        let mut agents = MockAgentRepository::new();
        agents.expect_find_by_id().returning(move |id| {
            let mut agent = Agent::new(owner, "worker".to_string()).unwrap();
            agent.id = id;
            agent.status = AgentStatus::Killed;
            Ok(Some(agent))
        });

        let use_case =
            ManageAgentsUseCase::new(Arc::new(agents), Arc::new(MockAuditLogRepository::new()));
        let result = use_case
            .set_status(owner, AgentId::new(), AgentStatus::Active)
            .await;

        assert!(matches!(result, Err(AgentError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_foreign_agent_reads_as_not_found() {
        let mut agents = MockAgentRepository::new();
        agents.expect_find_by_id().returning(|id| {
            let mut agent = Agent::new(OwnerId::new(), "worker".to_string()).unwrap();
            agent.id = id;
            Ok(Some(agent))
        });

        let use_case =
            ManageAgentsUseCase::new(Arc::new(agents), Arc::new(MockAuditLogRepository::new()));
        let result = use_case.get(OwnerId::new(), AgentId::new()).await;

        assert!(matches!(result, Err(AgentError::NotFound(_))));
    }
}
