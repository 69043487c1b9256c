use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tracing::warn;

use crate::domain::audit::{AuditDecision, AuditLog};
use crate::domain::entities::{
    RecipientType, SpendCandidate, Transaction, TransactionStatus, Wallet,
};
use crate::domain::error::{TransactionError, WalletError};
use crate::domain::gateways::PaymentRail;
use crate::domain::killswitch::KillSwitchKind;
use crate::domain::repository::{
    AuditLogRepository, KillSwitchRepository, SpendRuleRepository, TransactionRepository,
    WalletRepository,
};
use crate::domain::rules::{evaluate_rules, RuleContext, RuleVerdict};
use crate::domain::types::WalletId;
use crate::domain::windows;
use crate::use_cases::dead_man_monitor::DeadManGate;

/// Registro de exclusión mutua por billetera. La admisión completa (leer
/// balance / evaluar reglas / debitar / escribir estado) se serializa bajo
/// el mutex de su billetera; sin esto, dos admisiones concurrentes pueden
/// ver ambas balance >= amount y debitar dos veces.
#[derive(Default)]
pub struct WalletLocks {
    inner: StdMutex<HashMap<WalletId, Arc<tokio::sync::Mutex<()>>>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, wallet_id: WalletId) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("wallet lock registry poisoned");
            map.entry(wallet_id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Caso de uso central: el punto de entrada único para todo intento de
/// gasto. Compone las compuertas en orden fijo — precondiciones, dead-man
/// switch, kill switch, motor de reglas — y cierra con débito y auditoría.
pub struct SubmitTransactionUseCase {
    wallet_repo: Arc<dyn WalletRepository>,
    transaction_repo: Arc<dyn TransactionRepository>,
    rule_repo: Arc<dyn SpendRuleRepository>,
    kill_switch_repo: Arc<dyn KillSwitchRepository>,
    audit_repo: Arc<dyn AuditLogRepository>,
    dead_man: Arc<dyn DeadManGate>,
    payment_rail: Arc<dyn PaymentRail>,
    locks: Arc<WalletLocks>,
}

impl SubmitTransactionUseCase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        wallet_repo: Arc<dyn WalletRepository>,
        transaction_repo: Arc<dyn TransactionRepository>,
        rule_repo: Arc<dyn SpendRuleRepository>,
        kill_switch_repo: Arc<dyn KillSwitchRepository>,
        audit_repo: Arc<dyn AuditLogRepository>,
        dead_man: Arc<dyn DeadManGate>,
        payment_rail: Arc<dyn PaymentRail>,
        locks: Arc<WalletLocks>,
    ) -> Self {
        Self {
            wallet_repo,
            transaction_repo,
            rule_repo,
            kill_switch_repo,
            audit_repo,
            dead_man,
            payment_rail,
            locks,
        }
    }

    /// Admite un candidato de gasto. Todo resultado persistido (Completed,
    /// AwaitingApproval, Rejected, KillSwitched) vuelve como `Ok`; los
    /// errores se reservan para fallos sin fila persistida (entidad
    /// inexistente, monto inválido, error interno).
    #[tracing::instrument(name = "SubmitTransactionUseCase::execute", skip(self, candidate))]
    pub async fn execute(
        &self,
        wallet_id: WalletId,
        candidate: SpendCandidate,
    ) -> Result<Transaction, TransactionError> {
        // La exclusión por billetera cubre el camino completo de admisión.
        let _guard = self.locks.acquire(wallet_id).await;

        // 1. Precondiciones (Validación previa a cualquier persistencia)
        // La forma del candidato se valida antes de escribir nada; una
        // billetera inexistente o un monto no positivo no dejan fila.
        let wallet = self
            .wallet_repo
            .find_by_id(wallet_id)
            .await?
            .ok_or(WalletError::NotFound(wallet_id))?;
        let mut transaction = Transaction::new(wallet_id, candidate)?;

        // Estado de billetera y fondos: fallos clasificados que sí dejan
        // una fila Rejected/KillSwitched para el audit trail.
        if let Err(precondition) = wallet.ensure_debitable(transaction.amount) {
            let status = match &precondition {
                WalletError::KillSwitched(_) => TransactionStatus::KillSwitched,
                _ => TransactionStatus::Rejected,
            };
            transaction.status = status;
            transaction.rule_check_results =
                Some(serde_json::json!([{ "reason": precondition.to_string() }]));
            let saved = self.transaction_repo.save(transaction).await?;
            self.audit_admission(&saved, AuditDecision::Blocked, &saved.rule_check_results)
                .await;
            return Ok(saved);
        }

        // 2. Dead-man switch: vida, velocidad y anomalías del agente dueño.
        if let Err(dead_man) = self
            .dead_man
            .evaluate(
                wallet.agent_id,
                transaction.amount,
                transaction.recipient_id.clone(),
            )
            .await
        {
            transaction.status = TransactionStatus::Rejected;
            transaction.rule_check_results =
                Some(serde_json::json!([{ "reason": dead_man.to_string() }]));
            let saved = self.transaction_repo.save(transaction).await?;
            self.audit_admission(&saved, AuditDecision::Blocked, &saved.rule_check_results)
                .await;
            return Ok(saved);
        }

        // 3. Kill switches: primero el pestillo, después los gatillos.
        if let Some(observed) = self.check_kill_switches(&wallet).await? {
            transaction.status = TransactionStatus::KillSwitched;
            transaction.rule_check_results = Some(serde_json::json!([observed]));
            let saved = self.transaction_repo.save(transaction).await?;
            self.audit_admission(&saved, AuditDecision::Blocked, &saved.rule_check_results)
                .await;
            return Ok(saved);
        }

        // 4. Motor de reglas: toda regla activa produce un resultado.
        let verdict = self.evaluate_rules_for(&wallet, &transaction).await?;
        transaction.rule_check_results = Some(verdict.results_json());

        // 5. Selección de estado final.
        if !verdict.approved {
            transaction.status = TransactionStatus::Rejected;
            let saved = self.transaction_repo.save(transaction).await?;
            self.audit_admission(&saved, AuditDecision::Blocked, &saved.rule_check_results)
                .await;
            return Ok(saved);
        }

        if verdict.requires_approval {
            transaction.status = TransactionStatus::AwaitingApproval;
            let saved = self.transaction_repo.save(transaction).await?;
            self.audit_admission(&saved, AuditDecision::Escalated, &saved.rule_check_results)
                .await;
            return Ok(saved);
        }

        // Aprobada: persistir, debitar y completar atómicamente.
        transaction.status = TransactionStatus::Approved;
        let approved = self.transaction_repo.save(transaction).await?;
        let completed = match self
            .transaction_repo
            .complete_with_debit(approved.id, wallet_id, approved.amount)
            .await
        {
            Ok(completed) => completed,
            Err(e) => {
                // El débito no entró: la fila queda Failed y el error
                // original sube al llamador.
                let mut failed = approved.clone();
                failed.status = TransactionStatus::Failed;
                let _ = self.transaction_repo.update(failed).await;
                return Err(e);
            }
        };
        self.audit_admission(&completed, AuditDecision::Allowed, &completed.rule_check_results)
            .await;

        // La liquidación externa es best-effort y posterior al cierre del
        // libro: un rail caído no revierte la admisión.
        if completed.recipient_type == RecipientType::External {
            if let Some(address) = completed.recipient_id.as_deref() {
                if let Err(e) = self
                    .payment_rail
                    .send(
                        wallet.agent_id,
                        address,
                        completed.amount,
                        &wallet.currency,
                        completed.category.as_deref().unwrap_or("spend"),
                        &completed.metadata,
                    )
                    .await
                {
                    warn!("Payment rail delegation failed for {}: {}", completed.id, e);
                }
            }
        }

        Ok(completed)
    }

    /// Devuelve el detalle del kill switch que bloquea, si alguno. Engancha
    /// atómicamente (switch + billetera + auditoría) al primer disparo.
    async fn check_kill_switches(
        &self,
        wallet: &Wallet,
    ) -> Result<Option<serde_json::Value>, TransactionError> {
        let switches = self
            .kill_switch_repo
            .list_active_for_wallet(wallet.id)
            .await
            .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;

        for switch in &switches {
            if switch.is_latched() {
                return Ok(Some(serde_json::json!({
                    "kill_switch_id": switch.id,
                    "kind": switch.kind,
                    "reason": "kill switch latched; owner reset required",
                })));
            }
        }

        let now = Utc::now();
        for switch in switches {
            let since = match switch.kind {
                KillSwitchKind::DailyLossLimit => windows::start_of_day(now),
                _ => now - Duration::hours(switch.window_hours),
            };
            let history = self
                .transaction_repo
                .completed_in_window(wallet.id, since)
                .await?;

            if let Some(observed) = switch.check(wallet.balance, &history) {
                let audit = AuditLog::new(
                    Some(wallet.agent_id),
                    "kill_switch.trigger",
                    "kill_switch",
                    switch.id.to_string(),
                    AuditDecision::System,
                    serde_json::json!({
                        "kind": switch.kind,
                        "threshold": switch.threshold,
                        "observed": observed,
                    }),
                );
                self.kill_switch_repo
                    .latch(switch.id, wallet.id, observed, audit)
                    .await
                    .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;

                return Ok(Some(serde_json::json!({
                    "kill_switch_id": switch.id,
                    "kind": switch.kind,
                    "threshold": switch.threshold,
                    "observed": observed,
                    "reason": "kill switch fired",
                })));
            }
        }

        Ok(None)
    }

    async fn evaluate_rules_for(
        &self,
        wallet: &Wallet,
        transaction: &Transaction,
    ) -> Result<RuleVerdict, TransactionError> {
        let now = Utc::now();
        let rules = self
            .rule_repo
            .list_active_for_wallet(wallet.id)
            .await
            .map_err(|e| TransactionError::RepositoryError(e.to_string()))?;

        let spent_today = self
            .transaction_repo
            .sum_completed_spend_since(wallet.id, windows::start_of_day(now))
            .await?;
        let spent_this_week = self
            .transaction_repo
            .sum_completed_spend_since(wallet.id, windows::start_of_week(now))
            .await?;
        let spent_this_month = self
            .transaction_repo
            .sum_completed_spend_since(wallet.id, windows::start_of_month(now))
            .await?;

        let ctx = RuleContext {
            amount: transaction.amount,
            category: transaction.category.clone(),
            recipient: transaction.recipient_id.clone(),
            signal_strength: transaction
                .metadata
                .get("signalStrength")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            spent_today,
            spent_this_week,
            spent_this_month,
            now,
        };

        Ok(evaluate_rules(&rules, &ctx))
    }

    /// Una entrada de auditoría por resultado de admisión, con el veredicto
    /// completo como razonamiento. El audit log es best-effort aquí: un
    /// fallo se loguea pero la transacción ya quedó persistida.
    async fn audit_admission(
        &self,
        transaction: &Transaction,
        decision: AuditDecision,
        reasoning: &Option<serde_json::Value>,
    ) {
        let entry = AuditLog::new(
            None,
            "transaction.submit",
            "transaction",
            transaction.id.to_string(),
            decision,
            serde_json::json!({
                "status": transaction.status,
                "amount": transaction.amount,
                "wallet_id": transaction.wallet_id,
                "results": reasoning,
            }),
        );
        if let Err(e) = self.audit_repo.append(entry).await {
            tracing::error!("Failed to audit admission of {}: {}", transaction.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::WalletStatus;
    use crate::domain::gateways::MockPaymentRail;
    use crate::domain::killswitch::KillSwitch;
    use crate::domain::repository::{
        MockAuditLogRepository, MockKillSwitchRepository, MockSpendRuleRepository,
        MockTransactionRepository, MockWalletRepository,
    };
    use crate::domain::rules::{RuleParams, SpendRule};
    use crate::domain::types::AgentId;
    use crate::use_cases::dead_man_monitor::MockDeadManGate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct Mocks {
        wallets: MockWalletRepository,
        transactions: MockTransactionRepository,
        rules: MockSpendRuleRepository,
        kill_switches: MockKillSwitchRepository,
        audit: MockAuditLogRepository,
        dead_man: MockDeadManGate,
        rail: MockPaymentRail,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                wallets: MockWalletRepository::new(),
                transactions: MockTransactionRepository::new(),
                rules: MockSpendRuleRepository::new(),
                kill_switches: MockKillSwitchRepository::new(),
                audit: MockAuditLogRepository::new(),
                dead_man: MockDeadManGate::new(),
                rail: MockPaymentRail::new(),
            }
        }

        fn build(self) -> SubmitTransactionUseCase {
            SubmitTransactionUseCase::new(
                Arc::new(self.wallets),
                Arc::new(self.transactions),
                Arc::new(self.rules),
                Arc::new(self.kill_switches),
                Arc::new(self.audit),
                Arc::new(self.dead_man),
                Arc::new(self.rail),
                Arc::new(WalletLocks::new()),
            )
        }
    }

    fn wallet_with_balance(balance: Decimal) -> Wallet {
        let mut wallet = Wallet::new(AgentId::new(), "USD".to_string()).unwrap();
        wallet.balance = balance;
        wallet
    }

    fn candidate(amount: Decimal) -> SpendCandidate {
        SpendCandidate {
            amount,
            recipient_id: Some("vendor-1".to_string()),
            recipient_type: RecipientType::External,
            category: Some("advertising".to_string()),
            description: None,
            metadata: None,
        }
    }

    fn expect_happy_gates(mocks: &mut Mocks, wallet: &Wallet) {
        let wallet = wallet.clone();
        mocks
            .wallets
            .expect_find_by_id()
            .returning(move |_| Ok(Some(wallet.clone())));
        mocks.dead_man.expect_evaluate().returning(|_, _, _| Ok(()));
        mocks
            .kill_switches
            .expect_list_active_for_wallet()
            .returning(|_| Ok(vec![]));
        mocks
            .transactions
            .expect_sum_completed_spend_since()
            .returning(|_, _| Ok(Decimal::ZERO));
        mocks.audit.expect_append().returning(|entry| Ok(entry));
    }

    #[tokio::test]
    async fn test_clean_spend_debits_and_completes() {
        // Arrange
        let wallet = wallet_with_balance(dec!(1000));
        let wallet_id = wallet.id;
        let mut mocks = Mocks::new();
        expect_happy_gates(&mut mocks, &wallet);
        mocks
            .rules
            .expect_list_active_for_wallet()
            .returning(|_| Ok(vec![]));
        mocks
            .transactions
            .expect_save()
            .withf(|tx| tx.status == TransactionStatus::Approved)
            .times(1)
            .returning(|tx| Ok(tx));
        mocks
            .transactions
            .expect_complete_with_debit()
            .withf(move |_, w, amount| *w == wallet_id && *amount == dec!(80))
            .times(1)
            .returning(|id, wallet_id, amount| {
                let mut tx = Transaction::new(wallet_id, candidate(amount)).unwrap();
                tx.id = id;
                tx.status = TransactionStatus::Completed;
                tx.completed_at = Some(Utc::now());
                Ok(tx)
            });
        mocks.rail.expect_send().times(1).returning(|_, _, _, _, _, _| {
            Ok(crate::domain::gateways::RailReceipt {
                success: true,
                blocked_by: None,
                reason: None,
            })
        });

        let use_case = mocks.build();

        // Act
        let result = use_case.execute(wallet_id, candidate(dec!(80))).await.unwrap();

        // Assert
        assert_eq!(result.status, TransactionStatus::Completed);
        assert!(result.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_rule_rejection_persists_without_debit() {
        // Arrange: PerTransactionLimit{200} vs amount 250.
        let wallet = wallet_with_balance(dec!(1000));
        let wallet_id = wallet.id;
        let mut mocks = Mocks::new();
        expect_happy_gates(&mut mocks, &wallet);
        mocks.rules.expect_list_active_for_wallet().returning(move |_| {
            Ok(vec![SpendRule::new(
                wallet_id,
                RuleParams::PerTransactionLimit { limit: dec!(200) },
                10,
            )
            .unwrap()])
        });
        mocks
            .transactions
            .expect_save()
            .withf(|tx| tx.status == TransactionStatus::Rejected && tx.rule_check_results.is_some())
            .times(1)
            .returning(|tx| Ok(tx));
        // No debit may happen on a rejection.
        mocks.transactions.expect_complete_with_debit().times(0);

        let use_case = mocks.build();

        // Act
        let result = use_case.execute(wallet_id, candidate(dec!(250))).await.unwrap();

        // Assert
        assert_eq!(result.status, TransactionStatus::Rejected);
    }

    #[tokio::test]
    async fn test_approval_threshold_parks_transaction() {
        let wallet = wallet_with_balance(dec!(1000));
        let wallet_id = wallet.id;
        let mut mocks = Mocks::new();
        expect_happy_gates(&mut mocks, &wallet);
        mocks.rules.expect_list_active_for_wallet().returning(move |_| {
            Ok(vec![
                SpendRule::new(wallet_id, RuleParams::ApprovalThreshold { threshold: dec!(75) }, 5)
                    .unwrap(),
                SpendRule::new(wallet_id, RuleParams::PerTransactionLimit { limit: dec!(200) }, 10)
                    .unwrap(),
            ])
        });
        mocks
            .transactions
            .expect_save()
            .withf(|tx| tx.status == TransactionStatus::AwaitingApproval)
            .times(1)
            .returning(|tx| Ok(tx));
        mocks.transactions.expect_complete_with_debit().times(0);

        let use_case = mocks.build();
        let result = use_case.execute(wallet_id, candidate(dec!(80))).await.unwrap();

        assert_eq!(result.status, TransactionStatus::AwaitingApproval);
    }

    #[tokio::test]
    async fn test_insufficient_funds_rejects_with_persisted_row() {
        let wallet = wallet_with_balance(dec!(50));
        let wallet_id = wallet.id;
        let mut mocks = Mocks::new();
        let wallet_clone = wallet.clone();
        mocks
            .wallets
            .expect_find_by_id()
            .returning(move |_| Ok(Some(wallet_clone.clone())));
        mocks
            .transactions
            .expect_save()
            .withf(|tx| tx.status == TransactionStatus::Rejected)
            .times(1)
            .returning(|tx| Ok(tx));
        mocks.audit.expect_append().returning(|entry| Ok(entry));

        let use_case = mocks.build();
        let result = use_case.execute(wallet_id, candidate(dec!(80))).await.unwrap();

        assert_eq!(result.status, TransactionStatus::Rejected);
    }

    #[tokio::test]
    async fn test_killswitched_wallet_short_circuits() {
        let mut wallet = wallet_with_balance(dec!(1000));
        wallet.status = WalletStatus::KillSwitched;
        let wallet_id = wallet.id;

        let mut mocks = Mocks::new();
        let wallet_clone = wallet.clone();
        mocks
            .wallets
            .expect_find_by_id()
            .returning(move |_| Ok(Some(wallet_clone.clone())));
        mocks
            .transactions
            .expect_save()
            .withf(|tx| tx.status == TransactionStatus::KillSwitched)
            .times(1)
            .returning(|tx| Ok(tx));
        mocks.audit.expect_append().returning(|entry| Ok(entry));
        // Neither the dead-man gate nor the rules engine may run.
        mocks.dead_man.expect_evaluate().times(0);
        mocks.rules.expect_list_active_for_wallet().times(0);

        let use_case = mocks.build();
        let result = use_case.execute(wallet_id, candidate(dec!(5))).await.unwrap();

        assert_eq!(result.status, TransactionStatus::KillSwitched);
    }

    #[tokio::test]
    async fn test_dead_man_block_rejects_before_kill_switches() {
        let wallet = wallet_with_balance(dec!(1000));
        let wallet_id = wallet.id;
        let mut mocks = Mocks::new();
        let wallet_clone = wallet.clone();
        mocks
            .wallets
            .expect_find_by_id()
            .returning(move |_| Ok(Some(wallet_clone.clone())));
        mocks.dead_man.expect_evaluate().returning(|agent, _, _| {
            Err(crate::domain::error::DeadManError::Frozen(agent))
        });
        mocks.kill_switches.expect_list_active_for_wallet().times(0);
        mocks
            .transactions
            .expect_save()
            .withf(|tx| tx.status == TransactionStatus::Rejected)
            .times(1)
            .returning(|tx| Ok(tx));
        mocks.audit.expect_append().returning(|entry| Ok(entry));

        let use_case = mocks.build();
        let result = use_case.execute(wallet_id, candidate(dec!(5))).await.unwrap();

        assert_eq!(result.status, TransactionStatus::Rejected);
    }

    #[tokio::test]
    async fn test_drawdown_trigger_latches_and_killswitches() {
        // Scenario: balance $1000, one $500 completed spend in the window
        // reconstructs a $1500 peak, so the drawdown of 0.33 crosses the
        // 0.20 threshold.
        let wallet = wallet_with_balance(dec!(1000));
        let wallet_id = wallet.id;

        let mut mocks = Mocks::new();
        let wallet_clone = wallet.clone();
        mocks
            .wallets
            .expect_find_by_id()
            .returning(move |_| Ok(Some(wallet_clone.clone())));
        mocks.dead_man.expect_evaluate().returning(|_, _, _| Ok(()));

        let switch = KillSwitch::new(
            wallet_id,
            KillSwitchKind::DrawdownPercent,
            dec!(0.20),
            24,
        )
        .unwrap();
        let switch_id = switch.id;
        mocks
            .kill_switches
            .expect_list_active_for_wallet()
            .returning(move |_| Ok(vec![switch.clone()]));
        mocks.transactions.expect_completed_in_window().returning(move |_, _| {
            let mut spent = Transaction::new(wallet_id, candidate(dec!(500))).unwrap();
            spent.status = TransactionStatus::Completed;
            spent.completed_at = Some(Utc::now());
            Ok(vec![spent])
        });
        mocks
            .kill_switches
            .expect_latch()
            .withf(move |id, w, _, _| *id == switch_id && *w == wallet_id)
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        mocks
            .transactions
            .expect_save()
            .withf(|tx| tx.status == TransactionStatus::KillSwitched)
            .times(1)
            .returning(|tx| Ok(tx));
        mocks.audit.expect_append().returning(|entry| Ok(entry));
        mocks.rules.expect_list_active_for_wallet().times(0);

        let use_case = mocks.build();
        let result = use_case.execute(wallet_id, candidate(dec!(10))).await.unwrap();

        assert_eq!(result.status, TransactionStatus::KillSwitched);
    }

    #[tokio::test]
    async fn test_failed_debit_marks_transaction_failed() {
        let wallet = wallet_with_balance(dec!(1000));
        let wallet_id = wallet.id;
        let mut mocks = Mocks::new();
        expect_happy_gates(&mut mocks, &wallet);
        mocks
            .rules
            .expect_list_active_for_wallet()
            .returning(|_| Ok(vec![]));
        mocks
            .transactions
            .expect_save()
            .returning(|tx| Ok(tx));
        mocks
            .transactions
            .expect_complete_with_debit()
            .returning(|_, wallet_id, _| Err(TransactionError::Wallet(WalletError::InsufficientFunds(wallet_id))));
        mocks
            .transactions
            .expect_update()
            .withf(|tx| tx.status == TransactionStatus::Failed)
            .times(1)
            .returning(|tx| Ok(tx));

        let use_case = mocks.build();
        let result = use_case.execute(wallet_id, candidate(dec!(80))).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_wallet_is_an_error_without_persistence() {
        let mut mocks = Mocks::new();
        mocks.wallets.expect_find_by_id().returning(|_| Ok(None));
        mocks.transactions.expect_save().times(0);

        let use_case = mocks.build();
        let result = use_case.execute(WalletId::new(), candidate(dec!(10))).await;

        assert!(matches!(
            result,
            Err(TransactionError::Wallet(WalletError::NotFound(_)))
        ));
    }
}
