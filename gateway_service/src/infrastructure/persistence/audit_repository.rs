use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::audit::{AuditLog, AuditSummary};
use crate::domain::error::AuditError;
use crate::domain::repository::AuditLogRepository;
use crate::domain::types::{AgentId, OwnerId};
use crate::infrastructure::persistence::models::AuditLogModel;

/// Repositorio append-only de auditoría. No existe UPDATE: las entradas
/// nunca se modifican.
pub struct PostgresAuditLogRepository {
    pool: PgPool,
}

impl PostgresAuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogRepository for PostgresAuditLogRepository {
    async fn append(&self, entry: AuditLog) -> Result<AuditLog, AuditError> {
        let saved = sqlx::query_as::<_, AuditLogModel>(
            r#"
            INSERT INTO audit_logs (
                id, agent_id, action, resource, resource_id, decision, reasoning, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(entry.id)
        .bind(entry.agent_id)
        .bind(&entry.action)
        .bind(&entry.resource)
        .bind(&entry.resource_id)
        .bind(entry.decision)
        .bind(sqlx::types::Json(&entry.reasoning))
        .bind(entry.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AuditError::RepositoryError(e.to_string()))?;

        Ok(saved.into())
    }

    async fn list_for_agent(
        &self,
        agent_id: AgentId,
        limit: i64,
    ) -> Result<Vec<AuditLog>, AuditError> {
        let models = sqlx::query_as::<_, AuditLogModel>(
            r#"
            SELECT * FROM audit_logs
            WHERE agent_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(agent_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuditError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }

    async fn list_for_owner(
        &self,
        owner_id: OwnerId,
        limit: i64,
    ) -> Result<Vec<AuditLog>, AuditError> {
        let models = sqlx::query_as::<_, AuditLogModel>(
            r#"
            SELECT al.* FROM audit_logs al
            LEFT JOIN agents a ON a.id = al.agent_id
            WHERE a.owner_id = $1 OR al.agent_id IS NULL
            ORDER BY al.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuditError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }

    async fn summary_for_owner(&self, owner_id: OwnerId) -> Result<AuditSummary, AuditError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE al.decision = 'ALLOWED') AS allowed,
                COUNT(*) FILTER (WHERE al.decision = 'BLOCKED') AS blocked,
                COUNT(*) FILTER (WHERE al.decision = 'ESCALATED') AS escalated,
                COUNT(*) FILTER (WHERE al.decision = 'SYSTEM') AS system
            FROM audit_logs al
            LEFT JOIN agents a ON a.id = al.agent_id
            WHERE a.owner_id = $1 OR al.agent_id IS NULL
            "#,
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AuditError::RepositoryError(e.to_string()))?;

        Ok(AuditSummary {
            total: row.try_get("total").unwrap_or(0),
            allowed: row.try_get("allowed").unwrap_or(0),
            blocked: row.try_get("blocked").unwrap_or(0),
            escalated: row.try_get("escalated").unwrap_or(0),
            system: row.try_get("system").unwrap_or(0),
        })
    }
}
