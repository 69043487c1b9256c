use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use crate::domain::entities::{Transaction, DEPOSIT_CATEGORY};
use crate::domain::error::{TransactionError, WalletError};
use crate::domain::repository::TransactionRepository;
use crate::domain::types::{AgentId, OwnerId, TransactionId, WalletId};
use crate::infrastructure::persistence::models::TransactionModel;

/// Repositorio de transacciones implementado para PostgreSQL.
///
/// Las consultas de agregación excluyen siempre la categoría "deposit":
/// los depósitos no cuentan contra reglas de gasto ni ventanas.
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn save(&self, transaction: Transaction) -> Result<Transaction, TransactionError> {
        let model = TransactionModel::from(&transaction);

        let saved = sqlx::query_as::<_, TransactionModel>(
            r#"
            INSERT INTO transactions (
                id, wallet_id, amount, recipient_id, recipient_type, category,
                description, status, metadata, rule_check_results, created_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(model.id)
        .bind(model.wallet_id)
        .bind(model.amount)
        .bind(&model.recipient_id)
        .bind(model.recipient_type)
        .bind(&model.category)
        .bind(&model.description)
        .bind(model.status)
        .bind(&model.metadata)
        .bind(&model.rule_check_results)
        .bind(model.created_at)
        .bind(model.completed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;

        Ok(saved.into())
    }

    async fn update(&self, transaction: Transaction) -> Result<Transaction, TransactionError> {
        let model = TransactionModel::from(&transaction);

        let updated = sqlx::query_as::<_, TransactionModel>(
            r#"
            UPDATE transactions
            SET status = $1, metadata = $2, rule_check_results = $3, completed_at = $4
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(model.status)
        .bind(&model.metadata)
        .bind(&model.rule_check_results)
        .bind(model.completed_at)
        .bind(model.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;

        match updated {
            Some(m) => Ok(m.into()),
            None => Err(TransactionError::NotFound(transaction.id)),
        }
    }

    async fn find_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, TransactionError> {
        let model =
            sqlx::query_as::<_, TransactionModel>(r#"SELECT * FROM transactions WHERE id = $1"#)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;

        Ok(model.map(|m| m.into()))
    }

    async fn list_by_wallet(
        &self,
        wallet_id: WalletId,
        limit: i64,
    ) -> Result<Vec<Transaction>, TransactionError> {
        let models = sqlx::query_as::<_, TransactionModel>(
            r#"
            SELECT * FROM transactions
            WHERE wallet_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(wallet_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }

    async fn list_awaiting_approval(
        &self,
        owner_id: OwnerId,
    ) -> Result<Vec<Transaction>, TransactionError> {
        let models = sqlx::query_as::<_, TransactionModel>(
            r#"
            SELECT t.* FROM transactions t
            JOIN wallets w ON w.id = t.wallet_id
            JOIN agents a ON a.id = w.agent_id
            WHERE a.owner_id = $1 AND t.status = 'AWAITING_APPROVAL'
            ORDER BY t.created_at ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }

    async fn sum_completed_spend_since(
        &self,
        wallet_id: WalletId,
        since: DateTime<Utc>,
    ) -> Result<Decimal, TransactionError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0) AS total
            FROM transactions
            WHERE wallet_id = $1
              AND status = 'COMPLETED'
              AND (category IS NULL OR category <> $2)
              AND created_at >= $3
            "#,
        )
        .bind(wallet_id)
        .bind(DEPOSIT_CATEGORY)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;

        row.try_get::<Decimal, _>("total")
            .map_err(|e| TransactionError::RepositoryError(e.to_string()))
    }

    async fn completed_in_window(
        &self,
        wallet_id: WalletId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, TransactionError> {
        let models = sqlx::query_as::<_, TransactionModel>(
            r#"
            SELECT * FROM transactions
            WHERE wallet_id = $1 AND status = 'COMPLETED' AND created_at >= $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(wallet_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }

    async fn completed_amounts_for_agent_since(
        &self,
        agent_id: AgentId,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, Decimal)>, TransactionError> {
        let rows = sqlx::query(
            r#"
            SELECT t.created_at, t.amount
            FROM transactions t
            JOIN wallets w ON w.id = t.wallet_id
            WHERE w.agent_id = $1
              AND t.status = 'COMPLETED'
              AND (t.category IS NULL OR t.category <> $2)
              AND t.created_at >= $3
            ORDER BY t.created_at ASC
            "#,
        )
        .bind(agent_id)
        .bind(DEPOSIT_CATEGORY)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let at = row
                    .try_get::<DateTime<Utc>, _>("created_at")
                    .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;
                let amount = row
                    .try_get::<Decimal, _>("amount")
                    .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;
                Ok((at, amount))
            })
            .collect()
    }

    async fn recipient_ids_for_agent_since(
        &self,
        agent_id: AgentId,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, TransactionError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT t.recipient_id
            FROM transactions t
            JOIN wallets w ON w.id = t.wallet_id
            WHERE w.agent_id = $1 AND t.recipient_id IS NOT NULL AND t.created_at >= $2
            "#,
        )
        .bind(agent_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                row.try_get::<String, _>("recipient_id")
                    .map_err(|e| TransactionError::RepositoryError(e.to_string()))
            })
            .collect()
    }

    /// Débito + Completed en una sola transacción de BD. El UPDATE del
    /// balance exige billetera Active y fondos suficientes en el mismo
    /// statement; cero filas afectadas significa que la precondición se
    /// perdió entre la admisión y la ejecución.
    async fn complete_with_debit(
        &self,
        id: TransactionId,
        wallet_id: WalletId,
        amount: Decimal,
    ) -> Result<Transaction, TransactionError> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;

        let debit = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = balance - $1
            WHERE id = $2 AND status = 'ACTIVE' AND balance >= $1
            "#,
        )
        .bind(amount)
        .bind(wallet_id)
        .execute(&mut *db_tx)
        .await
        .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;

        if debit.rows_affected() == 0 {
            db_tx
                .rollback()
                .await
                .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;
            return Err(TransactionError::Wallet(WalletError::InsufficientFunds(
                wallet_id,
            )));
        }

        let completed = sqlx::query_as::<_, TransactionModel>(
            r#"
            UPDATE transactions
            SET status = 'COMPLETED', completed_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;

        let Some(completed) = completed else {
            db_tx
                .rollback()
                .await
                .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;
            return Err(TransactionError::NotFound(id));
        };

        db_tx
            .commit()
            .await
            .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;

        Ok(completed.into())
    }

    async fn find_pending_older_than(
        &self,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, TransactionError> {
        let models = sqlx::query_as::<_, TransactionModel>(
            r#"
            SELECT * FROM transactions
            WHERE status = 'PENDING' AND created_at < $1
            ORDER BY created_at ASC
            LIMIT 50
            "#,
        )
        .bind(timestamp)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;

        Ok(models.into_iter().map(|m| m.into()).collect())
    }
}
