use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::audit::{AuditDecision, AuditLog};
use crate::domain::entities::TransactionStatus;
use crate::domain::repository::{AuditLogRepository, TransactionRepository};

/// Job de conciliación para transacciones que quedaron en PENDING.
///
/// Puede pasar si la instancia murió entre persistir la intención y
/// ejecutar el débito. Una admisión sana resuelve su estado en la misma
/// llamada, así que todo PENDING viejo es un huérfano: se marca FAILED y
/// se audita para que el dueño lo vea.
pub struct ReconcilePendingJob {
    transaction_repo: Arc<dyn TransactionRepository>,
    audit_repo: Arc<dyn AuditLogRepository>,
}

impl ReconcilePendingJob {
    pub fn new(
        transaction_repo: Arc<dyn TransactionRepository>,
        audit_repo: Arc<dyn AuditLogRepository>,
    ) -> Self {
        Self {
            transaction_repo,
            audit_repo,
        }
    }

    pub async fn run(&self) {
        // Umbral: pendientes de hace más de 1 minuto. Tiempo de sobra para
        // que una admisión normal termine.
        let cutoff = Utc::now() - Duration::minutes(1);

        let stuck = match self.transaction_repo.find_pending_older_than(cutoff).await {
            Ok(transactions) => transactions,
            Err(e) => {
                error!("Failed to fetch stuck pending transactions: {:?}", e);
                return;
            }
        };

        if stuck.is_empty() {
            return;
        }
        info!("Found {} stuck transactions. Reconciling...", stuck.len());

        for mut tx in stuck {
            tx.status = TransactionStatus::Failed;
            match self.transaction_repo.update(tx.clone()).await {
                Ok(_) => {
                    info!("Transaction {} reclassified as FAILED", tx.id);
                    let entry = AuditLog::new(
                        None,
                        "transaction.reconcile",
                        "transaction",
                        tx.id.to_string(),
                        AuditDecision::System,
                        serde_json::json!({ "from": "PENDING", "to": "FAILED" }),
                    );
                    if let Err(e) = self.audit_repo.append(entry).await {
                        error!("Failed to audit reconciliation of {}: {:?}", tx.id, e);
                    }
                }
                Err(e) => {
                    error!("Failed to reconcile transaction {}: {:?}", tx.id, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{RecipientType, SpendCandidate, Transaction};
    use crate::domain::repository::{MockAuditLogRepository, MockTransactionRepository};
    use crate::domain::types::WalletId;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_stuck_pending_becomes_failed() {
        let mut transactions = MockTransactionRepository::new();
        let mut audit = MockAuditLogRepository::new();

        transactions.expect_find_pending_older_than().returning(|_| {
            let tx = Transaction::new(
                WalletId::new(),
                SpendCandidate {
                    amount: dec!(25),
                    recipient_id: None,
                    recipient_type: RecipientType::External,
                    category: None,
                    description: None,
                    metadata: None,
                },
            )
            .unwrap();
            Ok(vec![tx])
        });
        transactions
            .expect_update()
            .withf(|tx| tx.status == TransactionStatus::Failed)
            .times(1)
            .returning(|tx| Ok(tx));
        audit.expect_append().times(1).returning(|entry| Ok(entry));

        let job = ReconcilePendingJob::new(Arc::new(transactions), Arc::new(audit));
        job.run().await;
    }
}
