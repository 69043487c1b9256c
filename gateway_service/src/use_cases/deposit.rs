use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::audit::{AuditDecision, AuditLog};
use crate::domain::entities::{Transaction, WalletStatus};
use crate::domain::error::{TransactionError, WalletError};
use crate::domain::repository::{AuditLogRepository, TransactionRepository, WalletRepository};
use crate::domain::types::WalletId;

/// Depósitos: suben el balance sin pasar por el motor de reglas y quedan
/// registrados como una transacción Completed de categoría "deposit".
///
/// El depósito no es idempotente por id: llamadas repetidas acreditan
/// repetidamente (comportamiento documentado).
pub struct DepositUseCase {
    wallet_repo: Arc<dyn WalletRepository>,
    transaction_repo: Arc<dyn TransactionRepository>,
    audit_repo: Arc<dyn AuditLogRepository>,
}

impl DepositUseCase {
    pub fn new(
        wallet_repo: Arc<dyn WalletRepository>,
        transaction_repo: Arc<dyn TransactionRepository>,
        audit_repo: Arc<dyn AuditLogRepository>,
    ) -> Self {
        Self {
            wallet_repo,
            transaction_repo,
            audit_repo,
        }
    }

    #[tracing::instrument(name = "DepositUseCase::execute", skip(self))]
    pub async fn execute(
        &self,
        wallet_id: WalletId,
        amount: Decimal,
    ) -> Result<Transaction, TransactionError> {
        let wallet = self
            .wallet_repo
            .find_by_id(wallet_id)
            .await?
            .ok_or(WalletError::NotFound(wallet_id))?;
        if wallet.status == WalletStatus::Closed {
            return Err(TransactionError::Wallet(WalletError::NotActive(
                wallet_id,
                wallet.status,
            )));
        }

        let deposit = Transaction::deposit(wallet_id, amount)?;
        self.wallet_repo.credit_balance(wallet_id, amount).await?;
        let saved = self.transaction_repo.save(deposit).await?;

        let entry = AuditLog::new(
            Some(wallet.agent_id),
            "wallet.deposit",
            "transaction",
            saved.id.to_string(),
            AuditDecision::Allowed,
            serde_json::json!({ "wallet_id": wallet_id, "amount": amount }),
        );
        if let Err(e) = self.audit_repo.append(entry).await {
            tracing::error!("Failed to audit deposit {}: {}", saved.id, e);
        }

        Ok(saved)
    }
}
