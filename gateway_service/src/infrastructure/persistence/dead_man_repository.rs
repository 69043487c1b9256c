use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::deadman::{DeadManConfig, DeadManEvent};
use crate::domain::error::DeadManError;
use crate::domain::repository::DeadManRepository;
use crate::domain::types::AgentId;
use crate::infrastructure::persistence::models::{DeadManConfigModel, DeadManEventModel};

/// Repositorio de configuraciones y eventos del dead-man switch.
///
/// El event log es la fuente de verdad para reconstruir el conjunto de
/// congelados tras un reinicio de la instancia.
pub struct PostgresDeadManRepository {
    pool: PgPool,
}

impl PostgresDeadManRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadManRepository for PostgresDeadManRepository {
    async fn upsert_config(&self, config: DeadManConfig) -> Result<DeadManConfig, DeadManError> {
        let saved = sqlx::query_as::<_, DeadManConfigModel>(
            r#"
            INSERT INTO dead_man_configs (
                agent_id, heartbeat_interval_seconds, missed_heartbeat_threshold,
                anomaly_window_minutes, anomaly_spend_multiplier, anomaly_tx_count_multiplier,
                max_tx_per_minute, max_unique_vendors_per_hour, on_anomaly,
                on_missed_heartbeat, on_manual_trigger, cascade_to_children,
                recovery_requires_human, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (agent_id) DO UPDATE SET
                heartbeat_interval_seconds = EXCLUDED.heartbeat_interval_seconds,
                missed_heartbeat_threshold = EXCLUDED.missed_heartbeat_threshold,
                anomaly_window_minutes = EXCLUDED.anomaly_window_minutes,
                anomaly_spend_multiplier = EXCLUDED.anomaly_spend_multiplier,
                anomaly_tx_count_multiplier = EXCLUDED.anomaly_tx_count_multiplier,
                max_tx_per_minute = EXCLUDED.max_tx_per_minute,
                max_unique_vendors_per_hour = EXCLUDED.max_unique_vendors_per_hour,
                on_anomaly = EXCLUDED.on_anomaly,
                on_missed_heartbeat = EXCLUDED.on_missed_heartbeat,
                on_manual_trigger = EXCLUDED.on_manual_trigger,
                cascade_to_children = EXCLUDED.cascade_to_children,
                recovery_requires_human = EXCLUDED.recovery_requires_human
            RETURNING *
            "#,
        )
        .bind(config.agent_id)
        .bind(config.heartbeat_interval_seconds)
        .bind(config.missed_heartbeat_threshold)
        .bind(config.anomaly_window_minutes)
        .bind(config.anomaly_spend_multiplier)
        .bind(config.anomaly_tx_count_multiplier)
        .bind(config.max_tx_per_minute)
        .bind(config.max_unique_vendors_per_hour)
        .bind(config.on_anomaly)
        .bind(config.on_missed_heartbeat)
        .bind(config.on_manual_trigger)
        .bind(config.cascade_to_children)
        .bind(config.recovery_requires_human)
        .bind(config.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DeadManError::RepositoryError(e.to_string()))?;

        Ok(saved.into())
    }

    async fn find_config(&self, agent_id: AgentId) -> Result<Option<DeadManConfig>, DeadManError> {
        let model = sqlx::query_as::<_, DeadManConfigModel>(
            r#"SELECT * FROM dead_man_configs WHERE agent_id = $1"#,
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DeadManError::RepositoryError(e.to_string()))?;

        Ok(model.map(|m| m.into()))
    }

    async fn list_configs(&self) -> Result<Vec<DeadManConfig>, DeadManError> {
        let models =
            sqlx::query_as::<_, DeadManConfigModel>(r#"SELECT * FROM dead_man_configs"#)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| DeadManError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }

    async fn record_event(&self, event: DeadManEvent) -> Result<DeadManEvent, DeadManError> {
        let cascaded: Vec<Uuid> = event.cascaded_to.iter().map(|id| id.0).collect();

        let saved = sqlx::query_as::<_, DeadManEventModel>(
            r#"
            INSERT INTO dead_man_events (
                id, agent_id, trigger_type, action_taken, details, cascaded_to, resolved, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(event.id)
        .bind(event.agent_id)
        .bind(event.trigger_type)
        .bind(event.action_taken)
        .bind(sqlx::types::Json(&event.details))
        .bind(&cascaded)
        .bind(event.resolved)
        .bind(event.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DeadManError::RepositoryError(e.to_string()))?;

        Ok(saved.into())
    }

    async fn unresolved_events(&self) -> Result<Vec<DeadManEvent>, DeadManError> {
        let models = sqlx::query_as::<_, DeadManEventModel>(
            r#"
            SELECT * FROM dead_man_events
            WHERE resolved = FALSE AND action_taken IN ('FREEZE', 'TERMINATE')
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DeadManError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }

    async fn resolve_events(&self, agent_id: AgentId) -> Result<u64, DeadManError> {
        let result = sqlx::query(
            r#"UPDATE dead_man_events SET resolved = TRUE WHERE agent_id = $1 AND resolved = FALSE"#,
        )
        .bind(agent_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DeadManError::RepositoryError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
