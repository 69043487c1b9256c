use std::sync::Arc;

use crate::domain::audit::{AuditDecision, AuditLog};
use crate::domain::entities::{Transaction, TransactionStatus};
use crate::domain::error::{TransactionError, WalletError};
use crate::domain::repository::{AuditLogRepository, TransactionRepository, WalletRepository};
use crate::domain::types::{OwnerId, TransactionId};
use crate::use_cases::submit_transaction::WalletLocks;

/// Resolución manual de transacciones retenidas en AwaitingApproval.
///
/// La aprobación re-verifica el balance al momento de ejecutar: entre la
/// admisión y la firma del dueño pudo haber pasado cualquier cosa.
pub struct ApproveTransactionUseCase {
    transaction_repo: Arc<dyn TransactionRepository>,
    wallet_repo: Arc<dyn WalletRepository>,
    audit_repo: Arc<dyn AuditLogRepository>,
    locks: Arc<WalletLocks>,
}

impl ApproveTransactionUseCase {
    pub fn new(
        transaction_repo: Arc<dyn TransactionRepository>,
        wallet_repo: Arc<dyn WalletRepository>,
        audit_repo: Arc<dyn AuditLogRepository>,
        locks: Arc<WalletLocks>,
    ) -> Self {
        Self {
            transaction_repo,
            wallet_repo,
            audit_repo,
            locks,
        }
    }

    #[tracing::instrument(name = "ApproveTransactionUseCase::approve", skip(self))]
    pub async fn approve(
        &self,
        id: TransactionId,
        operator: OwnerId,
    ) -> Result<Transaction, TransactionError> {
        let transaction = self
            .transaction_repo
            .find_by_id(id)
            .await?
            .ok_or(TransactionError::NotFound(id))?;

        // Una segunda aprobación (o la de una rechazada) es un conflicto de
        // estado, nunca un segundo débito.
        if transaction.status != TransactionStatus::AwaitingApproval {
            return Err(TransactionError::NotAwaitingApproval(id));
        }

        let _guard = self.locks.acquire(transaction.wallet_id).await;

        let wallet = self
            .wallet_repo
            .find_by_id(transaction.wallet_id)
            .await?
            .ok_or(WalletError::NotFound(transaction.wallet_id))?;
        wallet.ensure_debitable(transaction.amount)?;

        let completed = self
            .transaction_repo
            .complete_with_debit(id, transaction.wallet_id, transaction.amount)
            .await?;

        self.audit(&completed, operator, AuditDecision::Allowed, "transaction.approve")
            .await;
        Ok(completed)
    }

    #[tracing::instrument(name = "ApproveTransactionUseCase::reject", skip(self))]
    pub async fn reject(
        &self,
        id: TransactionId,
        operator: OwnerId,
        reason: String,
    ) -> Result<Transaction, TransactionError> {
        let mut transaction = self
            .transaction_repo
            .find_by_id(id)
            .await?
            .ok_or(TransactionError::NotFound(id))?;

        if transaction.status != TransactionStatus::AwaitingApproval {
            return Err(TransactionError::NotAwaitingApproval(id));
        }

        transaction.status = TransactionStatus::Rejected;
        if let serde_json::Value::Object(ref mut map) = transaction.metadata {
            map.insert(
                "rejection_reason".to_string(),
                serde_json::Value::String(reason.clone()),
            );
        } else {
            transaction.metadata = serde_json::json!({ "rejection_reason": reason });
        }

        let rejected = self.transaction_repo.update(transaction).await?;
        self.audit(&rejected, operator, AuditDecision::Blocked, "transaction.reject")
            .await;
        Ok(rejected)
    }

    pub async fn list_pending(&self, owner: OwnerId) -> Result<Vec<Transaction>, TransactionError> {
        self.transaction_repo.list_awaiting_approval(owner).await
    }

    pub async fn list_for_wallet(
        &self,
        wallet_id: crate::domain::types::WalletId,
    ) -> Result<Vec<Transaction>, TransactionError> {
        self.transaction_repo.list_by_wallet(wallet_id, 100).await
    }

    async fn audit(
        &self,
        transaction: &Transaction,
        operator: OwnerId,
        decision: AuditDecision,
        action: &str,
    ) {
        let entry = AuditLog::new(
            None,
            action,
            "transaction",
            transaction.id.to_string(),
            decision,
            serde_json::json!({
                "operator": operator,
                "status": transaction.status,
                "amount": transaction.amount,
            }),
        );
        if let Err(e) = self.audit_repo.append(entry).await {
            tracing::error!("Failed to audit {} of {}: {}", action, transaction.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{RecipientType, SpendCandidate, Wallet};
    use crate::domain::repository::{
        MockAuditLogRepository, MockTransactionRepository, MockWalletRepository,
    };
    use crate::domain::types::AgentId;
    use rust_decimal_macros::dec;

    fn awaiting_tx() -> Transaction {
        let mut tx = Transaction::new(
            crate::domain::types::WalletId::new(),
            SpendCandidate {
                amount: dec!(80),
                recipient_id: None,
                recipient_type: RecipientType::External,
                category: Some("advertising".to_string()),
                description: None,
                metadata: None,
            },
        )
        .unwrap();
        tx.status = TransactionStatus::AwaitingApproval;
        tx
    }

    fn build(
        transactions: MockTransactionRepository,
        wallets: MockWalletRepository,
        audit: MockAuditLogRepository,
    ) -> ApproveTransactionUseCase {
        ApproveTransactionUseCase::new(
            Arc::new(transactions),
            Arc::new(wallets),
            Arc::new(audit),
            Arc::new(WalletLocks::new()),
        )
    }

    #[tokio::test]
    async fn test_approve_debits_after_balance_recheck() {
        // Arrange
        let tx = awaiting_tx();
        let tx_id = tx.id;

        let mut transactions = MockTransactionRepository::new();
        let mut wallets = MockWalletRepository::new();
        let mut audit = MockAuditLogRepository::new();

        let found = tx.clone();
        transactions
            .expect_find_by_id()
            .returning(move |_| Ok(Some(found.clone())));
        wallets.expect_find_by_id().returning(move |id| {
            let mut wallet = Wallet::new(AgentId::new(), "USD".to_string()).unwrap();
            wallet.id = id;
            wallet.balance = dec!(1000);
            Ok(Some(wallet))
        });
        transactions
            .expect_complete_with_debit()
            .times(1)
            .returning(move |id, _, _| {
                let mut completed = awaiting_tx();
                completed.id = id;
                completed.status = TransactionStatus::Completed;
                completed.completed_at = Some(chrono::Utc::now());
                Ok(completed)
            });
        audit.expect_append().returning(|entry| Ok(entry));

        let use_case = build(transactions, wallets, audit);

        // Act
        let result = use_case.approve(tx_id, OwnerId::new()).await.unwrap();

        // Assert
        assert_eq!(result.status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn test_second_approve_is_a_state_conflict() {
        let mut tx = awaiting_tx();
        tx.status = TransactionStatus::Completed;
        let tx_id = tx.id;

        let mut transactions = MockTransactionRepository::new();
        transactions
            .expect_find_by_id()
            .returning(move |_| Ok(Some(tx.clone())));
        // No debit on a conflict.
        transactions.expect_complete_with_debit().times(0);

        let use_case = build(
            transactions,
            MockWalletRepository::new(),
            MockAuditLogRepository::new(),
        );
        let result = use_case.approve(tx_id, OwnerId::new()).await;

        assert!(matches!(
            result,
            Err(TransactionError::NotAwaitingApproval(_))
        ));
    }

    #[tokio::test]
    async fn test_approve_fails_if_balance_dropped() {
        let tx = awaiting_tx();
        let tx_id = tx.id;

        let mut transactions = MockTransactionRepository::new();
        let mut wallets = MockWalletRepository::new();
        transactions
            .expect_find_by_id()
            .returning(move |_| Ok(Some(tx.clone())));
        wallets.expect_find_by_id().returning(move |id| {
            let mut wallet = Wallet::new(AgentId::new(), "USD".to_string()).unwrap();
            wallet.id = id;
            wallet.balance = dec!(10); // dropped below the $80 hold
            Ok(Some(wallet))
        });
        transactions.expect_complete_with_debit().times(0);

        let use_case = build(transactions, wallets, MockAuditLogRepository::new());
        let result = use_case.approve(tx_id, OwnerId::new()).await;

        assert!(matches!(
            result,
            Err(TransactionError::Wallet(WalletError::InsufficientFunds(_)))
        ));
    }

    #[tokio::test]
    async fn test_reject_records_reason_in_metadata() {
        let tx = awaiting_tx();
        let tx_id = tx.id;

        let mut transactions = MockTransactionRepository::new();
        let mut audit = MockAuditLogRepository::new();
        transactions
            .expect_find_by_id()
            .returning(move |_| Ok(Some(tx.clone())));
        transactions
            .expect_update()
            .withf(|tx| {
                tx.status == TransactionStatus::Rejected
                    && tx.metadata["rejection_reason"] == "budget cut"
            })
            .times(1)
            .returning(|tx| Ok(tx));
        audit.expect_append().returning(|entry| Ok(entry));

        let use_case = build(transactions, MockWalletRepository::new(), audit);
        let result = use_case
            .reject(tx_id, OwnerId::new(), "budget cut".to_string())
            .await
            .unwrap();

        assert_eq!(result.status, TransactionStatus::Rejected);
    }
}
