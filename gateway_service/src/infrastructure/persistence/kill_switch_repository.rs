use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::domain::audit::AuditLog;
use crate::domain::error::KillSwitchError;
use crate::domain::killswitch::KillSwitch;
use crate::domain::repository::KillSwitchRepository;
use crate::domain::types::{KillSwitchId, WalletId};
use crate::infrastructure::persistence::models::KillSwitchModel;

/// Repositorio de kill switches sobre PostgreSQL.
///
/// El enganche y el reset son transaccionales: el pestillo del switch, el
/// estado de la billetera y la entrada de auditoría se confirman juntos o
/// no se confirman.
pub struct PostgresKillSwitchRepository {
    pool: PgPool,
}

impl PostgresKillSwitchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KillSwitchRepository for PostgresKillSwitchRepository {
    async fn create(&self, switch: KillSwitch) -> Result<KillSwitch, KillSwitchError> {
        let saved = sqlx::query_as::<_, KillSwitchModel>(
            r#"
            INSERT INTO kill_switches (
                id, wallet_id, kind, threshold, window_hours, active, triggered,
                triggered_at, reset_at, current_value, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(switch.id)
        .bind(switch.wallet_id)
        .bind(switch.kind)
        .bind(switch.threshold)
        .bind(switch.window_hours)
        .bind(switch.active)
        .bind(switch.triggered)
        .bind(switch.triggered_at)
        .bind(switch.reset_at)
        .bind(switch.current_value)
        .bind(switch.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))?;

        Ok(saved.into())
    }

    async fn delete(&self, id: KillSwitchId) -> Result<(), KillSwitchError> {
        let result = sqlx::query(r#"DELETE FROM kill_switches WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(KillSwitchError::NotFound(id));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: KillSwitchId) -> Result<Option<KillSwitch>, KillSwitchError> {
        let model =
            sqlx::query_as::<_, KillSwitchModel>(r#"SELECT * FROM kill_switches WHERE id = $1"#)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))?;

        Ok(model.map(|m| m.into()))
    }

    async fn list_active_for_wallet(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<KillSwitch>, KillSwitchError> {
        let models = sqlx::query_as::<_, KillSwitchModel>(
            r#"
            SELECT * FROM kill_switches
            WHERE wallet_id = $1 AND active = TRUE
            ORDER BY created_at ASC
            "#,
        )
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }

    async fn latch(
        &self,
        id: KillSwitchId,
        wallet_id: WalletId,
        observed: Decimal,
        audit: AuditLog,
    ) -> Result<(), KillSwitchError> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE kill_switches
            SET triggered = TRUE, triggered_at = NOW(), current_value = $1, reset_at = NULL
            WHERE id = $2
            "#,
        )
        .bind(observed)
        .bind(id)
        .execute(&mut *db_tx)
        .await
        .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))?;

        sqlx::query(r#"UPDATE wallets SET status = 'KILL_SWITCHED' WHERE id = $1"#)
            .bind(wallet_id)
            .execute(&mut *db_tx)
            .await
            .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))?;

        insert_audit(&mut db_tx, &audit).await?;

        db_tx
            .commit()
            .await
            .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))
    }

    async fn reset(
        &self,
        id: KillSwitchId,
        wallet_id: WalletId,
        audit: AuditLog,
    ) -> Result<(), KillSwitchError> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE kill_switches
            SET triggered = FALSE, triggered_at = NULL, current_value = NULL, reset_at = NOW()
            WHERE id = $1 AND triggered = TRUE
            "#,
        )
        .bind(id)
        .execute(&mut *db_tx)
        .await
        .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))?;

        if result.rows_affected() == 0 {
            db_tx
                .rollback()
                .await
                .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))?;
            return Err(KillSwitchError::NotTriggered(id));
        }

        sqlx::query(r#"UPDATE wallets SET status = 'ACTIVE' WHERE id = $1"#)
            .bind(wallet_id)
            .execute(&mut *db_tx)
            .await
            .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))?;

        insert_audit(&mut db_tx, &audit).await?;

        db_tx
            .commit()
            .await
            .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))
    }
}

async fn insert_audit(
    db_tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    audit: &AuditLog,
) -> Result<(), KillSwitchError> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, agent_id, action, resource, resource_id, decision, reasoning, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(audit.id)
    .bind(audit.agent_id)
    .bind(&audit.action)
    .bind(&audit.resource)
    .bind(&audit.resource_id)
    .bind(audit.decision)
    .bind(sqlx::types::Json(&audit.reasoning))
    .bind(audit.created_at)
    .execute(&mut **db_tx)
    .await
    .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))?;
    Ok(())
}
