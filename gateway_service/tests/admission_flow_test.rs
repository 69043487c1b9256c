use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gateway_service::domain::audit::{AuditDecision, AuditLog, AuditSummary};
use gateway_service::domain::entities::{
    RecipientType, SpendCandidate, Transaction, TransactionStatus, Wallet, WalletStatus,
    DEPOSIT_CATEGORY,
};
use gateway_service::domain::error::{
    AuditError, DeadManError, KillSwitchError, RuleError, TransactionError, WalletError,
};
use gateway_service::domain::killswitch::{KillSwitch, KillSwitchKind};
use gateway_service::domain::repository::{
    AuditLogRepository, KillSwitchRepository, SpendRuleRepository, TransactionRepository,
    WalletRepository,
};
use gateway_service::domain::rules::{RuleParams, SpendRule};
use gateway_service::domain::types::{
    AgentId, KillSwitchId, OwnerId, RuleId, TransactionId, WalletId,
};
use gateway_service::infrastructure::gateways::fake_payment_rail::FakePaymentRail;
use gateway_service::use_cases::approve_transaction::ApproveTransactionUseCase;
use gateway_service::use_cases::dead_man_monitor::DeadManGate;
use gateway_service::use_cases::deposit::DepositUseCase;
use gateway_service::use_cases::submit_transaction::{SubmitTransactionUseCase, WalletLocks};

// Store en memoria para los escenarios de admisión: mismo contrato que los
// repositorios Postgres, con la atomicidad del débito garantizada por el
// mutex del store.

#[derive(Default)]
struct StoreInner {
    wallets: HashMap<WalletId, Wallet>,
    transactions: HashMap<TransactionId, Transaction>,
    rules: HashMap<RuleId, SpendRule>,
    switches: HashMap<KillSwitchId, KillSwitch>,
    audits: Vec<AuditLog>,
}

#[derive(Clone, Default)]
struct InMemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl InMemoryStore {
    fn new() -> Self {
        Self::default()
    }

    fn insert_wallet(&self, wallet: Wallet) {
        self.inner.lock().unwrap().wallets.insert(wallet.id, wallet);
    }

    fn insert_rule(&self, rule: SpendRule) {
        self.inner.lock().unwrap().rules.insert(rule.id, rule);
    }

    fn insert_switch(&self, switch: KillSwitch) {
        self.inner.lock().unwrap().switches.insert(switch.id, switch);
    }

    fn seed_completed_spend(&self, wallet_id: WalletId, amount: Decimal) {
        let mut tx = Transaction::new(
            wallet_id,
            SpendCandidate {
                amount,
                recipient_id: Some("seed-vendor".to_string()),
                recipient_type: RecipientType::External,
                category: Some("advertising".to_string()),
                description: None,
                metadata: None,
            },
        )
        .unwrap();
        tx.status = TransactionStatus::Completed;
        tx.completed_at = Some(Utc::now());
        self.inner.lock().unwrap().transactions.insert(tx.id, tx);
    }

    fn wallet(&self, id: WalletId) -> Wallet {
        self.inner.lock().unwrap().wallets.get(&id).unwrap().clone()
    }

    fn audits_with_decision(&self, decision: AuditDecision) -> usize {
        self.inner
            .lock()
            .unwrap()
            .audits
            .iter()
            .filter(|entry| entry.decision == decision)
            .count()
    }
}

#[async_trait]
impl WalletRepository for InMemoryStore {
    async fn create(&self, wallet: Wallet) -> Result<Wallet, WalletError> {
        self.insert_wallet(wallet.clone());
        Ok(wallet)
    }

    async fn find_by_id(&self, id: WalletId) -> Result<Option<Wallet>, WalletError> {
        Ok(self.inner.lock().unwrap().wallets.get(&id).cloned())
    }

    async fn list_by_agent(&self, agent_id: AgentId) -> Result<Vec<Wallet>, WalletError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .wallets
            .values()
            .filter(|w| w.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn update_status(&self, id: WalletId, status: WalletStatus) -> Result<(), WalletError> {
        let mut inner = self.inner.lock().unwrap();
        let wallet = inner.wallets.get_mut(&id).ok_or(WalletError::NotFound(id))?;
        wallet.status = status;
        Ok(())
    }

    async fn credit_balance(&self, id: WalletId, amount: Decimal) -> Result<(), WalletError> {
        let mut inner = self.inner.lock().unwrap();
        let wallet = inner.wallets.get_mut(&id).ok_or(WalletError::NotFound(id))?;
        wallet.balance += amount;
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for InMemoryStore {
    async fn save(&self, transaction: Transaction) -> Result<Transaction, TransactionError> {
        self.inner
            .lock()
            .unwrap()
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn update(&self, transaction: Transaction) -> Result<Transaction, TransactionError> {
        self.inner
            .lock()
            .unwrap()
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn find_by_id(
        &self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, TransactionError> {
        Ok(self.inner.lock().unwrap().transactions.get(&id).cloned())
    }

    async fn list_by_wallet(
        &self,
        wallet_id: WalletId,
        _limit: i64,
    ) -> Result<Vec<Transaction>, TransactionError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .transactions
            .values()
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect())
    }

    async fn list_awaiting_approval(
        &self,
        _owner_id: OwnerId,
    ) -> Result<Vec<Transaction>, TransactionError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .transactions
            .values()
            .filter(|t| t.status == TransactionStatus::AwaitingApproval)
            .cloned()
            .collect())
    }

    async fn sum_completed_spend_since(
        &self,
        wallet_id: WalletId,
        since: DateTime<Utc>,
    ) -> Result<Decimal, TransactionError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .transactions
            .values()
            .filter(|t| {
                t.wallet_id == wallet_id
                    && t.status == TransactionStatus::Completed
                    && t.category.as_deref() != Some(DEPOSIT_CATEGORY)
                    && t.created_at >= since
            })
            .map(|t| t.amount)
            .sum())
    }

    async fn completed_in_window(
        &self,
        wallet_id: WalletId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, TransactionError> {
        let mut txs: Vec<Transaction> = self
            .inner
            .lock()
            .unwrap()
            .transactions
            .values()
            .filter(|t| {
                t.wallet_id == wallet_id
                    && t.status == TransactionStatus::Completed
                    && t.created_at >= since
            })
            .cloned()
            .collect();
        txs.sort_by_key(|t| t.created_at);
        Ok(txs)
    }

    async fn completed_amounts_for_agent_since(
        &self,
        _agent_id: AgentId,
        _since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, Decimal)>, TransactionError> {
        Ok(vec![])
    }

    async fn recipient_ids_for_agent_since(
        &self,
        _agent_id: AgentId,
        _since: DateTime<Utc>,
    ) -> Result<Vec<String>, TransactionError> {
        Ok(vec![])
    }

    async fn complete_with_debit(
        &self,
        id: TransactionId,
        wallet_id: WalletId,
        amount: Decimal,
    ) -> Result<Transaction, TransactionError> {
        let mut inner = self.inner.lock().unwrap();

        let wallet = inner
            .wallets
            .get_mut(&wallet_id)
            .ok_or(TransactionError::Wallet(WalletError::NotFound(wallet_id)))?;
        if wallet.status != WalletStatus::Active || wallet.balance < amount {
            return Err(TransactionError::Wallet(WalletError::InsufficientFunds(
                wallet_id,
            )));
        }
        wallet.balance -= amount;

        let tx = inner
            .transactions
            .get_mut(&id)
            .ok_or(TransactionError::NotFound(id))?;
        tx.status = TransactionStatus::Completed;
        tx.completed_at = Some(Utc::now());
        Ok(tx.clone())
    }

    async fn find_pending_older_than(
        &self,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, TransactionError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .transactions
            .values()
            .filter(|t| t.status == TransactionStatus::Pending && t.created_at < timestamp)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SpendRuleRepository for InMemoryStore {
    async fn create(&self, rule: SpendRule) -> Result<SpendRule, RuleError> {
        self.insert_rule(rule.clone());
        Ok(rule)
    }

    async fn update(&self, rule: SpendRule) -> Result<SpendRule, RuleError> {
        self.insert_rule(rule.clone());
        Ok(rule)
    }

    async fn delete(&self, id: RuleId) -> Result<(), RuleError> {
        self.inner.lock().unwrap().rules.remove(&id);
        Ok(())
    }

    async fn find_by_id(&self, id: RuleId) -> Result<Option<SpendRule>, RuleError> {
        Ok(self.inner.lock().unwrap().rules.get(&id).cloned())
    }

    async fn list_for_wallet(&self, wallet_id: WalletId) -> Result<Vec<SpendRule>, RuleError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rules
            .values()
            .filter(|r| r.wallet_id == wallet_id)
            .cloned()
            .collect())
    }

    async fn list_active_for_wallet(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<SpendRule>, RuleError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rules
            .values()
            .filter(|r| r.wallet_id == wallet_id && r.active)
            .cloned()
            .collect())
    }

    async fn list_active_daily_for_agent(
        &self,
        _agent_id: AgentId,
    ) -> Result<Vec<SpendRule>, RuleError> {
        Ok(vec![])
    }
}

#[async_trait]
impl KillSwitchRepository for InMemoryStore {
    async fn create(&self, switch: KillSwitch) -> Result<KillSwitch, KillSwitchError> {
        self.insert_switch(switch.clone());
        Ok(switch)
    }

    async fn delete(&self, id: KillSwitchId) -> Result<(), KillSwitchError> {
        self.inner.lock().unwrap().switches.remove(&id);
        Ok(())
    }

    async fn find_by_id(&self, id: KillSwitchId) -> Result<Option<KillSwitch>, KillSwitchError> {
        Ok(self.inner.lock().unwrap().switches.get(&id).cloned())
    }

    async fn list_active_for_wallet(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<KillSwitch>, KillSwitchError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .switches
            .values()
            .filter(|s| s.wallet_id == wallet_id && s.active)
            .cloned()
            .collect())
    }

    async fn latch(
        &self,
        id: KillSwitchId,
        wallet_id: WalletId,
        observed: Decimal,
        audit: AuditLog,
    ) -> Result<(), KillSwitchError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(switch) = inner.switches.get_mut(&id) {
            switch.triggered = true;
            switch.triggered_at = Some(Utc::now());
            switch.current_value = Some(observed);
            switch.reset_at = None;
        }
        if let Some(wallet) = inner.wallets.get_mut(&wallet_id) {
            wallet.status = WalletStatus::KillSwitched;
        }
        inner.audits.push(audit);
        Ok(())
    }

    async fn reset(
        &self,
        id: KillSwitchId,
        wallet_id: WalletId,
        audit: AuditLog,
    ) -> Result<(), KillSwitchError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(switch) = inner.switches.get_mut(&id) {
            switch.triggered = false;
            switch.triggered_at = None;
            switch.current_value = None;
            switch.reset_at = Some(Utc::now());
        }
        if let Some(wallet) = inner.wallets.get_mut(&wallet_id) {
            wallet.status = WalletStatus::Active;
        }
        inner.audits.push(audit);
        Ok(())
    }
}

#[async_trait]
impl AuditLogRepository for InMemoryStore {
    async fn append(&self, entry: AuditLog) -> Result<AuditLog, AuditError> {
        self.inner.lock().unwrap().audits.push(entry.clone());
        Ok(entry)
    }

    async fn list_for_agent(
        &self,
        _agent_id: AgentId,
        _limit: i64,
    ) -> Result<Vec<AuditLog>, AuditError> {
        Ok(self.inner.lock().unwrap().audits.clone())
    }

    async fn list_for_owner(
        &self,
        _owner_id: OwnerId,
        _limit: i64,
    ) -> Result<Vec<AuditLog>, AuditError> {
        Ok(self.inner.lock().unwrap().audits.clone())
    }

    async fn summary_for_owner(&self, _owner_id: OwnerId) -> Result<AuditSummary, AuditError> {
        Ok(AuditSummary::default())
    }
}

/// Compuerta dead-man siempre abierta: estos escenarios ejercitan reglas y
/// kill switches, no el monitor.
struct OpenGate;

#[async_trait]
impl DeadManGate for OpenGate {
    async fn evaluate(
        &self,
        _agent_id: AgentId,
        _amount: Decimal,
        _vendor: Option<String>,
    ) -> Result<(), DeadManError> {
        Ok(())
    }
}

struct Harness {
    store: InMemoryStore,
    submit: SubmitTransactionUseCase,
    approve: ApproveTransactionUseCase,
    deposit: DepositUseCase,
    wallet_id: WalletId,
}

fn harness(initial_balance: Decimal) -> Harness {
    let store = InMemoryStore::new();
    let mut wallet = Wallet::new(AgentId::new(), "USD".to_string()).unwrap();
    wallet.balance = initial_balance;
    let wallet_id = wallet.id;
    store.insert_wallet(wallet);

    let locks = Arc::new(WalletLocks::new());
    let submit = SubmitTransactionUseCase::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(OpenGate),
        Arc::new(FakePaymentRail::new()),
        locks.clone(),
    );
    let approve = ApproveTransactionUseCase::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        locks,
    );
    let deposit = DepositUseCase::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
    );

    Harness {
        store,
        submit,
        approve,
        deposit,
        wallet_id,
    }
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

#[tokio::test]
async fn test_approval_threshold_flow() {
    // Owner sets ApprovalThreshold{75} and PerTransactionLimit{200} on a
    // $1000 wallet.
    let h = harness(dec!(1000));
    h.store.insert_rule(
        SpendRule::new(h.wallet_id, RuleParams::ApprovalThreshold { threshold: dec!(75) }, 5)
            .unwrap(),
    );
    h.store.insert_rule(
        SpendRule::new(h.wallet_id, RuleParams::PerTransactionLimit { limit: dec!(200) }, 10)
            .unwrap(),
    );

    // $80 is parked awaiting approval; the balance is untouched.
    let tx = h.submit.execute(h.wallet_id, candidate(dec!(80))).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::AwaitingApproval);
    assert_eq!(h.store.wallet(h.wallet_id).balance, dec!(1000));

    // The owner approves; only then does the debit land.
    let approved = h.approve.approve(tx.id, OwnerId::new()).await.unwrap();
    assert_eq!(approved.status, TransactionStatus::Completed);
    assert_eq!(h.store.wallet(h.wallet_id).balance, dec!(920));

    // A second approval attempt is a state conflict, not a second debit.
    let second = h.approve.approve(tx.id, OwnerId::new()).await;
    assert!(matches!(
        second,
        Err(TransactionError::NotAwaitingApproval(_))
    ));
    assert_eq!(h.store.wallet(h.wallet_id).balance, dec!(920));

    // The next $80 parks again.
    let tx = h.submit.execute(h.wallet_id, candidate(dec!(80))).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::AwaitingApproval);
}

#[tokio::test]
async fn test_hard_rejection_leaves_balance_untouched() {
    let h = harness(dec!(1000));
    h.store.insert_rule(
        SpendRule::new(h.wallet_id, RuleParams::PerTransactionLimit { limit: dec!(200) }, 10)
            .unwrap(),
    );

    let tx = h.submit.execute(h.wallet_id, candidate(dec!(250))).await.unwrap();

    assert_eq!(tx.status, TransactionStatus::Rejected);
    assert_eq!(h.store.wallet(h.wallet_id).balance, dec!(1000));
    assert_eq!(h.store.audits_with_decision(AuditDecision::Blocked), 1);

    // The persisted verdict names the failed rule.
    let results = tx.rule_check_results.unwrap();
    assert!(results.to_string().contains("PER_TRANSACTION_LIMIT"));
}

#[tokio::test]
async fn test_daily_cap_aggregates_completed_spend() {
    let h = harness(dec!(1000));
    h.store
        .insert_rule(SpendRule::new(h.wallet_id, RuleParams::DailyLimit { limit: dec!(500) }, 0).unwrap());

    // Three $200 spends already completed today.
    for _ in 0..3 {
        h.store.seed_completed_spend(h.wallet_id, dec!(200));
    }

    // Projected $750 > $500: rejected.
    let tx = h.submit.execute(h.wallet_id, candidate(dec!(150))).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Rejected);

    // With $600 already spent the cap is exhausted: any further spend
    // projects over $500 and stays rejected.
    let tx = h.submit.execute(h.wallet_id, candidate(dec!(50))).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Rejected);

    // Rejections never touch the balance.
    assert_eq!(h.store.wallet(h.wallet_id).balance, dec!(1000));
}

#[tokio::test]
async fn test_kill_switch_latches_and_blocks_until_reset() {
    let h = harness(dec!(1000));
    let switch = KillSwitch::new(
        h.wallet_id,
        KillSwitchKind::DrawdownPercent,
        dec!(0.20),
        24,
    )
    .unwrap();
    let switch_id = switch.id;
    h.store.insert_switch(switch);

    // A $500 completed spend reconstructs a $1500 peak: drawdown 0.33.
    h.store.seed_completed_spend(h.wallet_id, dec!(500));

    let tx = h.submit.execute(h.wallet_id, candidate(dec!(10))).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::KillSwitched);
    assert_eq!(h.store.wallet(h.wallet_id).status, WalletStatus::KillSwitched);

    // Any subsequent admission is short-circuited while latched.
    let tx = h.submit.execute(h.wallet_id, candidate(dec!(1))).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::KillSwitched);
    assert_eq!(h.store.wallet(h.wallet_id).balance, dec!(1000));

    // Operator reset restores the wallet.
    let audit = AuditLog::new(
        None,
        "kill_switch.reset",
        "kill_switch",
        switch_id.to_string(),
        AuditDecision::System,
        serde_json::Value::Null,
    );
    KillSwitchRepository::reset(&h.store, switch_id, h.wallet_id, audit)
        .await
        .unwrap();
    assert_eq!(h.store.wallet(h.wallet_id).status, WalletStatus::Active);
}

#[tokio::test]
async fn test_deposit_then_balance_round_trip() {
    let h = harness(dec!(100));

    let deposit = h.deposit.execute(h.wallet_id, dec!(40)).await.unwrap();
    assert_eq!(deposit.status, TransactionStatus::Completed);
    assert_eq!(h.store.wallet(h.wallet_id).balance, dec!(140));

    // Deposits are not idempotent by id: a repeat credits again.
    h.deposit.execute(h.wallet_id, dec!(40)).await.unwrap();
    assert_eq!(h.store.wallet(h.wallet_id).balance, dec!(180));
}

#[tokio::test]
async fn test_concurrent_admissions_never_overdraw() {
    // 10 concurrent $30 admissions against a $100 balance: at most 3 can
    // complete, and the balance must never go negative.
    let h = harness(dec!(100));
    let submit = Arc::new(h.submit);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let submit = submit.clone();
        let wallet_id = h.wallet_id;
        handles.push(tokio::spawn(async move {
            submit.execute(wallet_id, candidate(dec!(30))).await
        }));
    }

    let mut completed = 0;
    for handle in handles {
        if let Ok(Ok(tx)) = handle.await {
            if tx.status == TransactionStatus::Completed {
                completed += 1;
            }
        }
    }

    assert!(completed <= 3, "completed {} times with $100 / $30", completed);
    let final_balance = h.store.wallet(h.wallet_id).balance;
    assert!(final_balance >= Decimal::ZERO);
    assert_eq!(final_balance, dec!(100) - dec!(30) * Decimal::from(completed));
}

#[tokio::test]
async fn test_balance_conservation_invariant() {
    // balance = initial deposits − Σ completed non-deposit spends.
    let h = harness(dec!(0));
    h.deposit.execute(h.wallet_id, dec!(500)).await.unwrap();
    h.deposit.execute(h.wallet_id, dec!(250)).await.unwrap();

    let a = h.submit.execute(h.wallet_id, candidate(dec!(120))).await.unwrap();
    assert_eq!(a.status, TransactionStatus::Completed);
    let b = h.submit.execute(h.wallet_id, candidate(dec!(80))).await.unwrap();
    assert_eq!(b.status, TransactionStatus::Completed);

    assert_eq!(h.store.wallet(h.wallet_id).balance, dec!(550));
}
