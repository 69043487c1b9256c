use std::sync::Arc;

use crate::domain::audit::{AuditDecision, AuditLog};
use crate::domain::entities::AgentStatus;
use crate::domain::error::LineageError;
use crate::domain::lineage::{AgentLineage, SpawnEvent, SpawnOverrides};
use crate::domain::repository::{AgentRepository, AuditLogRepository, LineageRepository};
use crate::domain::types::{AgentId, EventId};

/// Spawn governor: admite la creación de agentes hijos y garantiza que la
/// política heredada sea estrictamente <= a la del padre.
pub struct SpawnAgentUseCase {
    agent_repo: Arc<dyn AgentRepository>,
    lineage_repo: Arc<dyn LineageRepository>,
    audit_repo: Arc<dyn AuditLogRepository>,
}

impl SpawnAgentUseCase {
    pub fn new(
        agent_repo: Arc<dyn AgentRepository>,
        lineage_repo: Arc<dyn LineageRepository>,
        audit_repo: Arc<dyn AuditLogRepository>,
    ) -> Self {
        Self {
            agent_repo,
            lineage_repo,
            audit_repo,
        }
    }

    #[tracing::instrument(name = "SpawnAgentUseCase::spawn", skip(self, overrides))]
    pub async fn spawn(
        &self,
        parent_id: AgentId,
        child_id: AgentId,
        overrides: SpawnOverrides,
    ) -> Result<AgentLineage, LineageError> {
        // 1. El padre debe existir y estar Active.
        let parent_agent = self
            .agent_repo
            .find_by_id(parent_id)
            .await
            .map_err(|e| LineageError::RepositoryError(e.to_string()))?
            .ok_or(LineageError::AgentNotFound(parent_id))?;
        if parent_agent.status != AgentStatus::Active {
            return Err(LineageError::SpawnRejected(format!(
                "parent {} is {:?}, not Active",
                parent_id, parent_agent.status
            )));
        }

        // 2. Linaje del padre; un agente original arranca como raíz.
        let parent_lineage = match self.lineage_repo.find(parent_id).await? {
            Some(lineage) => lineage,
            None => {
                self.lineage_repo
                    .create(AgentLineage::root(parent_id))
                    .await?
            }
        };

        // 3-4. Controles de admisión y duplicado.
        parent_lineage.admit_spawn()?;
        if self.lineage_repo.find(child_id).await?.is_some() {
            return Err(LineageError::DuplicateLineage(child_id));
        }

        // 5. Derivación monótona de la política del hijo.
        let child_policy = parent_lineage.spawn_policy.derive_child(&overrides);
        let child_lineage = parent_lineage.child(child_id, child_policy.clone());

        // 6. Inserción atómica: linaje hijo + children_ids del padre +
        //    SpawnEvent, en una sola transacción de BD.
        let event = SpawnEvent {
            id: EventId::new(),
            parent_id,
            child_id,
            depth: child_lineage.depth,
            inherited_policy: child_policy,
            authorized: true,
            created_at: chrono::Utc::now(),
        };
        let saved = self.lineage_repo.spawn(child_lineage, event).await?;

        let entry = AuditLog::new(
            Some(parent_id),
            "lineage.spawn",
            "agent_lineage",
            child_id.to_string(),
            AuditDecision::Allowed,
            serde_json::json!({
                "parent_id": parent_id,
                "depth": saved.depth,
                "root_id": saved.root_id,
            }),
        );
        if let Err(e) = self.audit_repo.append(entry).await {
            tracing::error!("Failed to audit spawn of {}: {}", child_id, e);
        }
        Ok(saved)
    }

    pub async fn get_lineage(&self, agent_id: AgentId) -> Result<AgentLineage, LineageError> {
        self.lineage_repo
            .find(agent_id)
            .await?
            .ok_or(LineageError::NotFound(agent_id))
    }

    /// Termina un linaje: el agente y (si cascade) todos sus descendientes
    /// quedan Terminated en linaje y en estado de agente. Irreversible.
    #[tracing::instrument(name = "SpawnAgentUseCase::terminate_lineage", skip(self))]
    pub async fn terminate_lineage(
        &self,
        agent_id: AgentId,
        cascade: bool,
    ) -> Result<Vec<AgentId>, LineageError> {
        self.lineage_repo
            .find(agent_id)
            .await?
            .ok_or(LineageError::NotFound(agent_id))?;

        let mut targets = vec![agent_id];
        if cascade {
            for lineage in self.lineage_repo.descendants(agent_id).await? {
                targets.push(lineage.agent_id);
            }
        }

        for target in &targets {
            self.lineage_repo
                .update_status(*target, AgentStatus::Terminated)
                .await?;
            self.agent_repo
                .update_status(*target, AgentStatus::Terminated)
                .await
                .map_err(|e| LineageError::RepositoryError(e.to_string()))?;
        }

        let entry = AuditLog::new(
            Some(agent_id),
            "lineage.terminate",
            "agent_lineage",
            agent_id.to_string(),
            AuditDecision::System,
            serde_json::json!({ "terminated": targets }),
        );
        if let Err(e) = self.audit_repo.append(entry).await {
            tracing::error!("Failed to audit lineage termination of {}: {}", agent_id, e);
        }
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Agent;
    use crate::domain::repository::{
        MockAgentRepository, MockAuditLogRepository, MockLineageRepository,
    };
    use crate::domain::types::OwnerId;
    use rust_decimal_macros::dec;

    fn agent_repo(status: AgentStatus) -> MockAgentRepository {
        let mut agents = MockAgentRepository::new();
        agents.expect_find_by_id().returning(move |id| {
            let mut agent = Agent::new(OwnerId::new(), "parent".to_string()).unwrap();
            agent.id = id;
            agent.status = status;
            Ok(Some(agent))
        });
        agents
    }

    #[tokio::test]
    async fn test_spawn_creates_root_lineage_on_first_use() {
        let parent_id = AgentId::new();
        let child_id = AgentId::new();

        let mut lineages = MockLineageRepository::new();
        let mut audit = MockAuditLogRepository::new();
        lineages.expect_find().returning(|_| Ok(None));
        lineages
            .expect_create()
            .withf(move |l| l.agent_id == parent_id && l.depth == 0 && l.root_id == parent_id)
            .times(1)
            .returning(|l| Ok(l));
        lineages
            .expect_spawn()
            .withf(move |child, event| {
                child.depth == 1
                    && child.root_id == parent_id
                    && event.authorized
                    && event.child_id == child.agent_id
            })
            .times(1)
            .returning(|child, _| Ok(child));
        audit.expect_append().returning(|entry| Ok(entry));

        let use_case = SpawnAgentUseCase::new(
            Arc::new(agent_repo(AgentStatus::Active)),
            Arc::new(lineages),
            Arc::new(audit),
        );
        let lineage = use_case
            .spawn(parent_id, child_id, SpawnOverrides::default())
            .await
            .unwrap();

        assert_eq!(lineage.parent_id, Some(parent_id));
    }

    #[tokio::test]
    async fn test_spawn_rejects_inactive_parent() {
        let use_case = SpawnAgentUseCase::new(
            Arc::new(agent_repo(AgentStatus::Paused)),
            Arc::new(MockLineageRepository::new()),
            Arc::new(MockAuditLogRepository::new()),
        );
        let result = use_case
            .spawn(AgentId::new(), AgentId::new(), SpawnOverrides::default())
            .await;

        assert!(matches!(result, Err(LineageError::SpawnRejected(_))));
    }

    #[tokio::test]
    async fn test_duplicate_child_is_rejected_and_lineage_unchanged() {
        let parent_id = AgentId::new();
        let child_id = AgentId::new();

        let mut lineages = MockLineageRepository::new();
        lineages.expect_find().returning(move |id| {
            if id == parent_id {
                Ok(Some(AgentLineage::root(parent_id)))
            } else {
                // The child already has a lineage row.
                Ok(Some(AgentLineage::root(id)))
            }
        });
        lineages.expect_spawn().times(0);

        let use_case = SpawnAgentUseCase::new(
            Arc::new(agent_repo(AgentStatus::Active)),
            Arc::new(lineages),
            Arc::new(MockAuditLogRepository::new()),
        );
        let result = use_case
            .spawn(parent_id, child_id, SpawnOverrides::default())
            .await;

        assert!(matches!(result, Err(LineageError::DuplicateLineage(_))));
    }

    #[tokio::test]
    async fn test_spawn_applies_monotone_policy() {
        let parent_id = AgentId::new();
        let child_id = AgentId::new();

        let mut lineages = MockLineageRepository::new();
        let mut audit = MockAuditLogRepository::new();
        lineages.expect_find().returning(move |id| {
            if id == parent_id {
                let mut root = AgentLineage::root(parent_id);
                root.spawn_policy.daily_spend_limit = Some(dec!(1000));
                Ok(Some(root))
            } else {
                Ok(None)
            }
        });
        lineages
            .expect_spawn()
            .withf(|child, event| {
                child.spawn_policy.daily_spend_limit == Some(dec!(500.0))
                    && event.inherited_policy.daily_spend_limit == Some(dec!(500.0))
            })
            .times(1)
            .returning(|child, _| Ok(child));
        audit.expect_append().returning(|entry| Ok(entry));

        let use_case = SpawnAgentUseCase::new(
            Arc::new(agent_repo(AgentStatus::Active)),
            Arc::new(lineages),
            Arc::new(audit),
        );
        use_case
            .spawn(
                parent_id,
                child_id,
                SpawnOverrides {
                    max_spend_ratio: Some(dec!(0.5)),
                    daily_spend_limit: Some(dec!(800)),
                    ..SpawnOverrides::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_terminate_lineage_cascades_depth_first() {
        let parent_id = AgentId::new();
        let child_id = AgentId::new();

        let mut lineages = MockLineageRepository::new();
        let mut agents = MockAgentRepository::new();
        let mut audit = MockAuditLogRepository::new();
        lineages
            .expect_find()
            .returning(move |_| Ok(Some(AgentLineage::root(parent_id))));
        lineages.expect_descendants().returning(move |_| {
            Ok(vec![AgentLineage::root(parent_id).child(child_id, Default::default())])
        });
        lineages
            .expect_update_status()
            .times(2)
            .returning(|_, _| Ok(()));
        agents
            .expect_update_status()
            .times(2)
            .returning(|_, _| Ok(()));
        audit.expect_append().returning(|entry| Ok(entry));

        let use_case =
            SpawnAgentUseCase::new(Arc::new(agents), Arc::new(lineages), Arc::new(audit));
        let terminated = use_case.terminate_lineage(parent_id, true).await.unwrap();

        assert_eq!(terminated, vec![parent_id, child_id]);
    }
}
