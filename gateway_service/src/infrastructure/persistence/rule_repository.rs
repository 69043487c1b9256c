use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::error::RuleError;
use crate::domain::repository::SpendRuleRepository;
use crate::domain::rules::SpendRule;
use crate::domain::types::{AgentId, RuleId, WalletId};
use crate::infrastructure::persistence::models::SpendRuleModel;

/// Repositorio de reglas de gasto sobre PostgreSQL. Los parámetros viven
/// en JSONB; la columna `kind` derivada permite filtrar por clase.
pub struct PostgresSpendRuleRepository {
    pool: PgPool,
}

impl PostgresSpendRuleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SpendRuleRepository for PostgresSpendRuleRepository {
    async fn create(&self, rule: SpendRule) -> Result<SpendRule, RuleError> {
        let model = SpendRuleModel::from(&rule);

        let saved = sqlx::query_as::<_, SpendRuleModel>(
            r#"
            INSERT INTO spend_rules (id, wallet_id, kind, params, active, priority, throttled, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(model.id)
        .bind(model.wallet_id)
        .bind(model.kind)
        .bind(&model.params)
        .bind(model.active)
        .bind(model.priority)
        .bind(model.throttled)
        .bind(model.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RuleError::RepositoryError(e.to_string()))?;

        Ok(saved.into())
    }

    async fn update(&self, rule: SpendRule) -> Result<SpendRule, RuleError> {
        let model = SpendRuleModel::from(&rule);

        let updated = sqlx::query_as::<_, SpendRuleModel>(
            r#"
            UPDATE spend_rules
            SET kind = $1, params = $2, active = $3, priority = $4, throttled = $5
            WHERE id = $6
            RETURNING *
            "#,
        )
        .bind(model.kind)
        .bind(&model.params)
        .bind(model.active)
        .bind(model.priority)
        .bind(model.throttled)
        .bind(model.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RuleError::RepositoryError(e.to_string()))?;

        match updated {
            Some(m) => Ok(m.into()),
            None => Err(RuleError::NotFound(rule.id)),
        }
    }

    async fn delete(&self, id: RuleId) -> Result<(), RuleError> {
        let result = sqlx::query(r#"DELETE FROM spend_rules WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| RuleError::RepositoryError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RuleError::NotFound(id));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: RuleId) -> Result<Option<SpendRule>, RuleError> {
        let model = sqlx::query_as::<_, SpendRuleModel>(r#"SELECT * FROM spend_rules WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RuleError::RepositoryError(e.to_string()))?;

        Ok(model.map(|m| m.into()))
    }

    async fn list_for_wallet(&self, wallet_id: WalletId) -> Result<Vec<SpendRule>, RuleError> {
        let models = sqlx::query_as::<_, SpendRuleModel>(
            r#"SELECT * FROM spend_rules WHERE wallet_id = $1 ORDER BY priority DESC"#,
        )
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RuleError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }

    async fn list_active_for_wallet(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<SpendRule>, RuleError> {
        let models = sqlx::query_as::<_, SpendRuleModel>(
            r#"
            SELECT * FROM spend_rules
            WHERE wallet_id = $1 AND active = TRUE
            ORDER BY priority DESC
            "#,
        )
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RuleError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }

    async fn list_active_daily_for_agent(
        &self,
        agent_id: AgentId,
    ) -> Result<Vec<SpendRule>, RuleError> {
        let models = sqlx::query_as::<_, SpendRuleModel>(
            r#"
            SELECT r.* FROM spend_rules r
            JOIN wallets w ON w.id = r.wallet_id
            WHERE w.agent_id = $1 AND r.active = TRUE AND r.kind = 'DAILY_LIMIT'
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RuleError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }
}
