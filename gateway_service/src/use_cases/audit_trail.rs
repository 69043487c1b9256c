use std::sync::Arc;

use crate::domain::audit::{AuditLog, AuditSummary};
use crate::domain::error::AuditError;
use crate::domain::repository::AuditLogRepository;
use crate::domain::types::{AgentId, OwnerId};

const DEFAULT_EXPORT_LIMIT: i64 = 10_000;

/// Lecturas del audit trail para el dueño: listado, export y resumen.
pub struct AuditTrailUseCase {
    audit_repo: Arc<dyn AuditLogRepository>,
}

impl AuditTrailUseCase {
    pub fn new(audit_repo: Arc<dyn AuditLogRepository>) -> Self {
        Self { audit_repo }
    }

    pub async fn list(&self, owner: OwnerId, limit: i64) -> Result<Vec<AuditLog>, AuditError> {
        self.audit_repo.list_for_owner(owner, limit).await
    }

    pub async fn list_for_agent(
        &self,
        agent_id: AgentId,
        limit: i64,
    ) -> Result<Vec<AuditLog>, AuditError> {
        self.audit_repo.list_for_agent(agent_id, limit).await
    }

    /// Export en JSON Lines: una entrada por línea, apta para ingesta.
    pub async fn export(&self, owner: OwnerId) -> Result<String, AuditError> {
        let entries = self
            .audit_repo
            .list_for_owner(owner, DEFAULT_EXPORT_LIMIT)
            .await?;
        let mut out = String::new();
        for entry in entries {
            let line = serde_json::to_string(&entry)
                .map_err(|e| AuditError::RepositoryError(e.to_string()))?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }

    pub async fn summary(&self, owner: OwnerId) -> Result<AuditSummary, AuditError> {
        self.audit_repo.summary_for_owner(owner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::AuditDecision;
    use crate::domain::repository::MockAuditLogRepository;

    #[tokio::test]
    async fn test_export_emits_one_json_line_per_entry() {
        let mut audit = MockAuditLogRepository::new();
        audit.expect_list_for_owner().returning(|_, _| {
            Ok(vec![
                AuditLog::new(
                    None,
                    "transaction.submit",
                    "transaction",
                    "t-1".to_string(),
                    AuditDecision::Allowed,
                    serde_json::Value::Null,
                ),
                AuditLog::new(
                    None,
                    "transaction.submit",
                    "transaction",
                    "t-2".to_string(),
                    AuditDecision::Blocked,
                    serde_json::Value::Null,
                ),
            ])
        });

        let use_case = AuditTrailUseCase::new(Arc::new(audit));
        let export = use_case.export(OwnerId::new()).await.unwrap();

        let lines: Vec<&str> = export.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["resource"], "transaction");
        }
    }
}
