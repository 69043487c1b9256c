use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::AgentStatus;
use crate::domain::error::LineageError;
use crate::domain::lineage::{AgentLineage, SpawnEvent};
use crate::domain::repository::LineageRepository;
use crate::domain::types::AgentId;
use crate::infrastructure::persistence::models::AgentLineageModel;

/// Repositorio del árbol de linaje sobre PostgreSQL. `children_ids` es un
/// uuid[]; los descendientes se resuelven con una CTE recursiva.
pub struct PostgresLineageRepository {
    pool: PgPool,
}

impl PostgresLineageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LineageRepository for PostgresLineageRepository {
    async fn find(&self, agent_id: AgentId) -> Result<Option<AgentLineage>, LineageError> {
        let model = sqlx::query_as::<_, AgentLineageModel>(
            r#"SELECT * FROM agent_lineages WHERE agent_id = $1"#,
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LineageError::RepositoryError(e.to_string()))?;

        Ok(model.map(|m| m.into()))
    }

    async fn create(&self, lineage: AgentLineage) -> Result<AgentLineage, LineageError> {
        let children: Vec<Uuid> = lineage.children_ids.iter().map(|id| id.0).collect();

        let saved = sqlx::query_as::<_, AgentLineageModel>(
            r#"
            INSERT INTO agent_lineages (
                agent_id, parent_id, root_id, depth, children_ids, status, spawn_policy, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(lineage.agent_id)
        .bind(lineage.parent_id)
        .bind(lineage.root_id)
        .bind(lineage.depth)
        .bind(&children)
        .bind(lineage.status)
        .bind(sqlx::types::Json(&lineage.spawn_policy))
        .bind(lineage.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LineageError::RepositoryError(e.to_string()))?;

        Ok(saved.into())
    }

    /// Spawn atómico: inserta el linaje del hijo (la PK rechaza
    /// duplicados), agrega el hijo al padre y registra el evento, todo en
    /// una transacción de BD.
    async fn spawn(
        &self,
        child: AgentLineage,
        event: SpawnEvent,
    ) -> Result<AgentLineage, LineageError> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LineageError::RepositoryError(e.to_string()))?;

        let children: Vec<Uuid> = child.children_ids.iter().map(|id| id.0).collect();
        let inserted = sqlx::query_as::<_, AgentLineageModel>(
            r#"
            INSERT INTO agent_lineages (
                agent_id, parent_id, root_id, depth, children_ids, status, spawn_policy, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (agent_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(child.agent_id)
        .bind(child.parent_id)
        .bind(child.root_id)
        .bind(child.depth)
        .bind(&children)
        .bind(child.status)
        .bind(sqlx::types::Json(&child.spawn_policy))
        .bind(child.created_at)
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(|e| LineageError::RepositoryError(e.to_string()))?;

        let Some(inserted) = inserted else {
            db_tx
                .rollback()
                .await
                .map_err(|e| LineageError::RepositoryError(e.to_string()))?;
            return Err(LineageError::DuplicateLineage(child.agent_id));
        };

        sqlx::query(
            r#"
            UPDATE agent_lineages
            SET children_ids = array_append(children_ids, $1)
            WHERE agent_id = $2
            "#,
        )
        .bind(child.agent_id.0)
        .bind(child.parent_id)
        .execute(&mut *db_tx)
        .await
        .map_err(|e| LineageError::RepositoryError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO spawn_events (
                id, parent_id, child_id, depth, inherited_policy, authorized, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id)
        .bind(event.parent_id)
        .bind(event.child_id)
        .bind(event.depth)
        .bind(sqlx::types::Json(&event.inherited_policy))
        .bind(event.authorized)
        .bind(event.created_at)
        .execute(&mut *db_tx)
        .await
        .map_err(|e| LineageError::RepositoryError(e.to_string()))?;

        db_tx
            .commit()
            .await
            .map_err(|e| LineageError::RepositoryError(e.to_string()))?;

        Ok(inserted.into())
    }

    async fn update_status(
        &self,
        agent_id: AgentId,
        status: AgentStatus,
    ) -> Result<(), LineageError> {
        let result = sqlx::query(r#"UPDATE agent_lineages SET status = $1 WHERE agent_id = $2"#)
            .bind(status)
            .bind(agent_id)
            .execute(&self.pool)
            .await
            .map_err(|e| LineageError::RepositoryError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(LineageError::NotFound(agent_id));
        }
        Ok(())
    }

    async fn descendants(&self, agent_id: AgentId) -> Result<Vec<AgentLineage>, LineageError> {
        let models = sqlx::query_as::<_, AgentLineageModel>(
            r#"
            WITH RECURSIVE tree AS (
                SELECT * FROM agent_lineages WHERE parent_id = $1
                UNION ALL
                SELECT l.* FROM agent_lineages l
                JOIN tree t ON l.parent_id = t.agent_id
            )
            SELECT * FROM tree ORDER BY depth ASC
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LineageError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }
}
