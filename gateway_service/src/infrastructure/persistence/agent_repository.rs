use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::entities::{Agent, AgentStatus, Owner};
use crate::domain::error::AgentError;
use crate::domain::repository::{AgentRepository, OwnerRepository};
use crate::domain::types::{AgentId, OwnerId};
use crate::infrastructure::persistence::models::{AgentModel, OwnerModel};

/// Repositorio de dueños sobre PostgreSQL.
pub struct PostgresOwnerRepository {
    pool: PgPool,
}

impl PostgresOwnerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OwnerRepository for PostgresOwnerRepository {
    async fn create(&self, owner: Owner) -> Result<Owner, AgentError> {
        let saved = sqlx::query_as::<_, OwnerModel>(
            r#"
            INSERT INTO owners (id, api_key, contact, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(owner.id)
        .bind(&owner.api_key)
        .bind(&owner.contact)
        .bind(owner.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AgentError::RepositoryError(e.to_string()))?;

        Ok(saved.into())
    }

    async fn find_by_id(&self, id: OwnerId) -> Result<Option<Owner>, AgentError> {
        let model = sqlx::query_as::<_, OwnerModel>(r#"SELECT * FROM owners WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AgentError::RepositoryError(e.to_string()))?;

        Ok(model.map(|m| m.into()))
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<Owner>, AgentError> {
        let model = sqlx::query_as::<_, OwnerModel>(r#"SELECT * FROM owners WHERE api_key = $1"#)
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AgentError::RepositoryError(e.to_string()))?;

        Ok(model.map(|m| m.into()))
    }

    /// Reemplazo atómico de la credencial: un solo UPDATE.
    async fn rotate_api_key(&self, id: OwnerId, api_key: String) -> Result<(), AgentError> {
        let result = sqlx::query(r#"UPDATE owners SET api_key = $1 WHERE id = $2"#)
            .bind(api_key)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AgentError::RepositoryError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AgentError::OwnerNotFound(id));
        }
        Ok(())
    }
}

/// Repositorio de agentes sobre PostgreSQL.
pub struct PostgresAgentRepository {
    pool: PgPool,
}

impl PostgresAgentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentRepository for PostgresAgentRepository {
    async fn create(&self, agent: Agent) -> Result<Agent, AgentError> {
        let saved = sqlx::query_as::<_, AgentModel>(
            r#"
            INSERT INTO agents (id, owner_id, api_key, name, status, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(agent.id)
        .bind(agent.owner_id)
        .bind(&agent.api_key)
        .bind(&agent.name)
        .bind(agent.status)
        .bind(sqlx::types::Json(&agent.metadata))
        .bind(agent.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AgentError::RepositoryError(e.to_string()))?;

        Ok(saved.into())
    }

    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, AgentError> {
        let model = sqlx::query_as::<_, AgentModel>(r#"SELECT * FROM agents WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AgentError::RepositoryError(e.to_string()))?;

        Ok(model.map(|m| m.into()))
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<Agent>, AgentError> {
        let model = sqlx::query_as::<_, AgentModel>(r#"SELECT * FROM agents WHERE api_key = $1"#)
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AgentError::RepositoryError(e.to_string()))?;

        Ok(model.map(|m| m.into()))
    }

    async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Agent>, AgentError> {
        let models = sqlx::query_as::<_, AgentModel>(
            r#"SELECT * FROM agents WHERE owner_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AgentError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }

    async fn update_status(&self, id: AgentId, status: AgentStatus) -> Result<(), AgentError> {
        let result = sqlx::query(r#"UPDATE agents SET status = $1 WHERE id = $2"#)
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AgentError::RepositoryError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AgentError::NotFound(id));
        }
        Ok(())
    }
}
