use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::domain::entities::{Wallet, WalletStatus};
use crate::domain::error::WalletError;
use crate::domain::repository::WalletRepository;
use crate::domain::types::{AgentId, WalletId};
use crate::infrastructure::persistence::models::WalletModel;

/// Repositorio de Billeteras basado en PostgreSQL.
pub struct PostgresWalletRepository {
    pool: PgPool,
}

impl PostgresWalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WalletRepository for PostgresWalletRepository {
    async fn create(&self, wallet: Wallet) -> Result<Wallet, WalletError> {
        let saved = sqlx::query_as::<_, WalletModel>(
            r#"
            INSERT INTO wallets (id, agent_id, balance, currency, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(wallet.id)
        .bind(wallet.agent_id)
        .bind(wallet.balance)
        .bind(&wallet.currency)
        .bind(wallet.status)
        .bind(wallet.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| WalletError::RepositoryError(e.to_string()))?;

        Ok(saved.into())
    }

    async fn find_by_id(&self, id: WalletId) -> Result<Option<Wallet>, WalletError> {
        let model = sqlx::query_as::<_, WalletModel>(r#"SELECT * FROM wallets WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| WalletError::RepositoryError(e.to_string()))?;

        Ok(model.map(|m| m.into()))
    }

    async fn list_by_agent(&self, agent_id: AgentId) -> Result<Vec<Wallet>, WalletError> {
        let models = sqlx::query_as::<_, WalletModel>(
            r#"SELECT * FROM wallets WHERE agent_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WalletError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }

    async fn update_status(&self, id: WalletId, status: WalletStatus) -> Result<(), WalletError> {
        let result = sqlx::query(r#"UPDATE wallets SET status = $1 WHERE id = $2"#)
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| WalletError::RepositoryError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(WalletError::NotFound(id));
        }
        Ok(())
    }

    /// Acreditación atómica (depósitos): un solo UPDATE incremental.
    async fn credit_balance(&self, id: WalletId, amount: Decimal) -> Result<(), WalletError> {
        let result = sqlx::query(r#"UPDATE wallets SET balance = balance + $1 WHERE id = $2"#)
            .bind(amount)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| WalletError::RepositoryError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(WalletError::NotFound(id));
        }
        Ok(())
    }
}
