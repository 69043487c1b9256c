use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::crossagent::{CrossAgentPolicy, CrossAgentTransaction};
use crate::domain::entities::AgentGroup;
use crate::domain::error::CrossAgentError;
use crate::domain::repository::CrossAgentRepository;
use crate::domain::types::{AgentId, CrossAgentTxId, GroupId, OwnerId, PolicyId};
use crate::infrastructure::persistence::models::{
    AgentGroupModel, CrossAgentPolicyModel, CrossAgentTransactionModel,
};

/// Repositorio de políticas y transacciones cross-agent sobre PostgreSQL.
pub struct PostgresCrossAgentRepository {
    pool: PgPool,
}

impl PostgresCrossAgentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CrossAgentRepository for PostgresCrossAgentRepository {
    async fn create_policy(
        &self,
        policy: CrossAgentPolicy,
    ) -> Result<CrossAgentPolicy, CrossAgentError> {
        let saved = sqlx::query_as::<_, CrossAgentPolicyModel>(
            r#"
            INSERT INTO cross_agent_policies (
                id, owner_id, source_agent_id, target_agent_id, target_agent_group,
                allowed_payment_types, max_per_transaction, max_daily_to_target,
                max_daily_all_agents, require_human_approval_above, require_mutual_policy,
                settlement_mode, min_counterparty_trust_score, enabled, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(policy.id)
        .bind(policy.owner_id)
        .bind(policy.source_agent_id)
        .bind(policy.target_agent_id)
        .bind(policy.target_agent_group)
        .bind(&policy.allowed_payment_types)
        .bind(policy.max_per_transaction)
        .bind(policy.max_daily_to_target)
        .bind(policy.max_daily_all_agents)
        .bind(policy.require_human_approval_above)
        .bind(policy.require_mutual_policy)
        .bind(policy.settlement_mode)
        .bind(policy.min_counterparty_trust_score)
        .bind(policy.enabled)
        .bind(policy.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))?;

        Ok(saved.into())
    }

    async fn update_policy(
        &self,
        policy: CrossAgentPolicy,
    ) -> Result<CrossAgentPolicy, CrossAgentError> {
        let updated = sqlx::query_as::<_, CrossAgentPolicyModel>(
            r#"
            UPDATE cross_agent_policies
            SET target_agent_id = $1, target_agent_group = $2, allowed_payment_types = $3,
                max_per_transaction = $4, max_daily_to_target = $5, max_daily_all_agents = $6,
                require_human_approval_above = $7, require_mutual_policy = $8,
                settlement_mode = $9, min_counterparty_trust_score = $10, enabled = $11
            WHERE id = $12
            RETURNING *
            "#,
        )
        .bind(policy.target_agent_id)
        .bind(policy.target_agent_group)
        .bind(&policy.allowed_payment_types)
        .bind(policy.max_per_transaction)
        .bind(policy.max_daily_to_target)
        .bind(policy.max_daily_all_agents)
        .bind(policy.require_human_approval_above)
        .bind(policy.require_mutual_policy)
        .bind(policy.settlement_mode)
        .bind(policy.min_counterparty_trust_score)
        .bind(policy.enabled)
        .bind(policy.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))?;

        match updated {
            Some(m) => Ok(m.into()),
            None => Err(CrossAgentError::PolicyNotFound(policy.id)),
        }
    }

    async fn delete_policy(&self, id: PolicyId) -> Result<(), CrossAgentError> {
        let result = sqlx::query(r#"DELETE FROM cross_agent_policies WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(CrossAgentError::PolicyNotFound(id));
        }
        Ok(())
    }

    async fn find_policy(&self, id: PolicyId) -> Result<Option<CrossAgentPolicy>, CrossAgentError> {
        let model = sqlx::query_as::<_, CrossAgentPolicyModel>(
            r#"SELECT * FROM cross_agent_policies WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))?;

        Ok(model.map(|m| m.into()))
    }

    async fn list_policies_for_source(
        &self,
        source: AgentId,
    ) -> Result<Vec<CrossAgentPolicy>, CrossAgentError> {
        let models = sqlx::query_as::<_, CrossAgentPolicyModel>(
            r#"SELECT * FROM cross_agent_policies WHERE source_agent_id = $1"#,
        )
        .bind(source)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }

    async fn list_policies_for_owner(
        &self,
        owner_id: OwnerId,
    ) -> Result<Vec<CrossAgentPolicy>, CrossAgentError> {
        let models = sqlx::query_as::<_, CrossAgentPolicyModel>(
            r#"SELECT * FROM cross_agent_policies WHERE owner_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }

    async fn create_group(&self, group: AgentGroup) -> Result<AgentGroup, CrossAgentError> {
        let agent_ids: Vec<Uuid> = group.agent_ids.iter().map(|id| id.0).collect();

        let saved = sqlx::query_as::<_, AgentGroupModel>(
            r#"
            INSERT INTO agent_groups (id, owner_id, name, agent_ids)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(group.id)
        .bind(group.owner_id)
        .bind(&group.name)
        .bind(&agent_ids)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))?;

        Ok(saved.into())
    }

    async fn groups_containing(&self, agent_id: AgentId) -> Result<Vec<GroupId>, CrossAgentError> {
        let rows = sqlx::query(r#"SELECT id FROM agent_groups WHERE $1 = ANY(agent_ids)"#)
            .bind(agent_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                row.try_get::<GroupId, _>("id")
                    .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))
            })
            .collect()
    }

    async fn save_tx(
        &self,
        tx: CrossAgentTransaction,
    ) -> Result<CrossAgentTransaction, CrossAgentError> {
        let saved = sqlx::query_as::<_, CrossAgentTransactionModel>(
            r#"
            INSERT INTO cross_agent_transactions (
                id, source_agent_id, target_agent_id, amount, payment_type, authorized,
                authorization_method, settlement_status, requires_human, policy_id, reason, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(tx.id)
        .bind(tx.source_agent_id)
        .bind(tx.target_agent_id)
        .bind(tx.amount)
        .bind(&tx.payment_type)
        .bind(tx.authorized)
        .bind(tx.authorization_method)
        .bind(tx.settlement_status)
        .bind(tx.requires_human)
        .bind(tx.policy_id)
        .bind(&tx.reason)
        .bind(tx.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))?;

        Ok(saved.into())
    }

    async fn update_tx(
        &self,
        tx: CrossAgentTransaction,
    ) -> Result<CrossAgentTransaction, CrossAgentError> {
        let updated = sqlx::query_as::<_, CrossAgentTransactionModel>(
            r#"
            UPDATE cross_agent_transactions
            SET authorized = $1, authorization_method = $2, settlement_status = $3,
                requires_human = $4
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(tx.authorized)
        .bind(tx.authorization_method)
        .bind(tx.settlement_status)
        .bind(tx.requires_human)
        .bind(tx.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))?;

        match updated {
            Some(m) => Ok(m.into()),
            None => Err(CrossAgentError::NotFound(tx.id)),
        }
    }

    async fn find_tx(
        &self,
        id: CrossAgentTxId,
    ) -> Result<Option<CrossAgentTransaction>, CrossAgentError> {
        let model = sqlx::query_as::<_, CrossAgentTransactionModel>(
            r#"SELECT * FROM cross_agent_transactions WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))?;

        Ok(model.map(|m| m.into()))
    }

    async fn sum_authorized_since(
        &self,
        source: AgentId,
        target: Option<AgentId>,
        since: DateTime<Utc>,
    ) -> Result<Decimal, CrossAgentError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0) AS total
            FROM cross_agent_transactions
            WHERE source_agent_id = $1
              AND authorized = TRUE
              AND created_at >= $2
              AND ($3::uuid IS NULL OR target_agent_id = $3)
            "#,
        )
        .bind(source)
        .bind(since)
        .bind(target)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))?;

        row.try_get::<Decimal, _>("total")
            .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))
    }

    async fn settlement_counts(&self, target: AgentId) -> Result<(i64, i64), CrossAgentError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE settlement_status = 'SETTLED') AS settled,
                COUNT(*) AS total
            FROM cross_agent_transactions
            WHERE target_agent_id = $1
            "#,
        )
        .bind(target)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))?;

        let settled = row
            .try_get::<i64, _>("settled")
            .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))?;
        let total = row
            .try_get::<i64, _>("total")
            .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))?;
        Ok((settled, total))
    }
}
