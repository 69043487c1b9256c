use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::audit::{AuditLog, AuditSummary};
use crate::domain::crossagent::{CrossAgentPolicy, CrossAgentTransaction};
use crate::domain::deadman::{DeadManConfig, DeadManEvent};
use crate::domain::entities::{
    Agent, AgentGroup, AgentStatus, Owner, Transaction, Wallet, WalletStatus,
};
use crate::domain::error::{
    AgentError, AuditError, CrossAgentError, DeadManError, KillSwitchError, LineageError,
    RuleError, TransactionError, WalletError,
};
use crate::domain::killswitch::KillSwitch;
use crate::domain::lineage::{AgentLineage, SpawnEvent};
use crate::domain::rules::SpendRule;
use crate::domain::types::{
    AgentId, CrossAgentTxId, GroupId, KillSwitchId, OwnerId, PolicyId, RuleId, TransactionId,
    WalletId,
};

// Interfaces (Ports) de persistencia. Todo componente habla con la base de
// datos únicamente a través de estos traits; las implementaciones Postgres
// viven en infrastructure::persistence.

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OwnerRepository: Send + Sync {
    async fn create(&self, owner: Owner) -> Result<Owner, AgentError>;
    async fn find_by_id(&self, id: OwnerId) -> Result<Option<Owner>, AgentError>;
    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<Owner>, AgentError>;
    /// La rotación reemplaza la credencial de forma atómica.
    async fn rotate_api_key(&self, id: OwnerId, api_key: String) -> Result<(), AgentError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn create(&self, agent: Agent) -> Result<Agent, AgentError>;
    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, AgentError>;
    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<Agent>, AgentError>;
    async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Agent>, AgentError>;
    async fn update_status(&self, id: AgentId, status: AgentStatus) -> Result<(), AgentError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn create(&self, wallet: Wallet) -> Result<Wallet, WalletError>;
    async fn find_by_id(&self, id: WalletId) -> Result<Option<Wallet>, WalletError>;
    async fn list_by_agent(&self, agent_id: AgentId) -> Result<Vec<Wallet>, WalletError>;
    async fn update_status(&self, id: WalletId, status: WalletStatus) -> Result<(), WalletError>;
    /// Incremento atómico de balance (depósitos).
    async fn credit_balance(&self, id: WalletId, amount: Decimal) -> Result<(), WalletError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn save(&self, transaction: Transaction) -> Result<Transaction, TransactionError>;
    async fn update(&self, transaction: Transaction) -> Result<Transaction, TransactionError>;
    async fn find_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, TransactionError>;
    async fn list_by_wallet(
        &self,
        wallet_id: WalletId,
        limit: i64,
    ) -> Result<Vec<Transaction>, TransactionError>;
    /// Transacciones AwaitingApproval de todas las billeteras del dueño.
    async fn list_awaiting_approval(
        &self,
        owner_id: OwnerId,
    ) -> Result<Vec<Transaction>, TransactionError>;
    /// Σ amount de transacciones Completed no-depósito con created_at >= since.
    async fn sum_completed_spend_since(
        &self,
        wallet_id: WalletId,
        since: DateTime<Utc>,
    ) -> Result<Decimal, TransactionError>;
    /// Historial Completed de la billetera desde `since`, ascendente por
    /// fecha (lo consumen los kill switches).
    async fn completed_in_window(
        &self,
        wallet_id: WalletId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, TransactionError>;
    /// Pares (created_at, amount) de gasto Completed no-depósito de todas
    /// las billeteras del agente (ventanas de anomalía del dead-man).
    async fn completed_amounts_for_agent_since(
        &self,
        agent_id: AgentId,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, Decimal)>, TransactionError>;
    /// Destinatarios únicos (DISTINCT) del agente desde `since`.
    async fn recipient_ids_for_agent_since(
        &self,
        agent_id: AgentId,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, TransactionError>;
    /// Débito + transición a Completed en una sola transacción de BD.
    /// Falla con InsufficientFunds si el balance quedó corto al ejecutar.
    async fn complete_with_debit(
        &self,
        id: TransactionId,
        wallet_id: WalletId,
        amount: Decimal,
    ) -> Result<Transaction, TransactionError>;
    async fn find_pending_older_than(
        &self,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, TransactionError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpendRuleRepository: Send + Sync {
    async fn create(&self, rule: SpendRule) -> Result<SpendRule, RuleError>;
    async fn update(&self, rule: SpendRule) -> Result<SpendRule, RuleError>;
    async fn delete(&self, id: RuleId) -> Result<(), RuleError>;
    async fn find_by_id(&self, id: RuleId) -> Result<Option<SpendRule>, RuleError>;
    async fn list_for_wallet(&self, wallet_id: WalletId) -> Result<Vec<SpendRule>, RuleError>;
    async fn list_active_for_wallet(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<SpendRule>, RuleError>;
    /// Reglas DailyLimit activas de todas las billeteras del agente (las
    /// estrangula el dead-man switch).
    async fn list_active_daily_for_agent(
        &self,
        agent_id: AgentId,
    ) -> Result<Vec<SpendRule>, RuleError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KillSwitchRepository: Send + Sync {
    async fn create(&self, switch: KillSwitch) -> Result<KillSwitch, KillSwitchError>;
    async fn delete(&self, id: KillSwitchId) -> Result<(), KillSwitchError>;
    async fn find_by_id(&self, id: KillSwitchId) -> Result<Option<KillSwitch>, KillSwitchError>;
    async fn list_active_for_wallet(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<KillSwitch>, KillSwitchError>;
    /// Engancha el switch: triggered + estado de billetera + entrada de
    /// auditoría, todo en una transacción de BD.
    async fn latch(
        &self,
        id: KillSwitchId,
        wallet_id: WalletId,
        observed: Decimal,
        audit: AuditLog,
    ) -> Result<(), KillSwitchError>;
    /// Reset de operador: limpia el pestillo, restaura la billetera a
    /// Active y audita, atómicamente.
    async fn reset(
        &self,
        id: KillSwitchId,
        wallet_id: WalletId,
        audit: AuditLog,
    ) -> Result<(), KillSwitchError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LineageRepository: Send + Sync {
    async fn find(&self, agent_id: AgentId) -> Result<Option<AgentLineage>, LineageError>;
    async fn create(&self, lineage: AgentLineage) -> Result<AgentLineage, LineageError>;
    /// Inserta el linaje del hijo, lo agrega a children_ids del padre y
    /// registra el SpawnEvent en una sola transacción de BD. Un hijo con
    /// linaje previo produce DuplicateLineage.
    async fn spawn(
        &self,
        child: AgentLineage,
        event: SpawnEvent,
    ) -> Result<AgentLineage, LineageError>;
    async fn update_status(
        &self,
        agent_id: AgentId,
        status: AgentStatus,
    ) -> Result<(), LineageError>;
    /// Todos los descendientes (sin incluir al agente), por niveles.
    async fn descendants(&self, agent_id: AgentId) -> Result<Vec<AgentLineage>, LineageError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrossAgentRepository: Send + Sync {
    async fn create_policy(
        &self,
        policy: CrossAgentPolicy,
    ) -> Result<CrossAgentPolicy, CrossAgentError>;
    async fn update_policy(
        &self,
        policy: CrossAgentPolicy,
    ) -> Result<CrossAgentPolicy, CrossAgentError>;
    async fn delete_policy(&self, id: PolicyId) -> Result<(), CrossAgentError>;
    async fn find_policy(&self, id: PolicyId) -> Result<Option<CrossAgentPolicy>, CrossAgentError>;
    async fn list_policies_for_source(
        &self,
        source: AgentId,
    ) -> Result<Vec<CrossAgentPolicy>, CrossAgentError>;
    async fn list_policies_for_owner(
        &self,
        owner_id: OwnerId,
    ) -> Result<Vec<CrossAgentPolicy>, CrossAgentError>;
    async fn create_group(&self, group: AgentGroup) -> Result<AgentGroup, CrossAgentError>;
    async fn groups_containing(&self, agent_id: AgentId) -> Result<Vec<GroupId>, CrossAgentError>;
    async fn save_tx(
        &self,
        tx: CrossAgentTransaction,
    ) -> Result<CrossAgentTransaction, CrossAgentError>;
    async fn update_tx(
        &self,
        tx: CrossAgentTransaction,
    ) -> Result<CrossAgentTransaction, CrossAgentError>;
    async fn find_tx(
        &self,
        id: CrossAgentTxId,
    ) -> Result<Option<CrossAgentTransaction>, CrossAgentError>;
    /// Σ amount autorizado en las últimas 24 h; `target` None suma hacia
    /// todos los destinos del fuente.
    async fn sum_authorized_since(
        &self,
        source: AgentId,
        target: Option<AgentId>,
        since: DateTime<Utc>,
    ) -> Result<Decimal, CrossAgentError>;
    /// (liquidadas, totales) con este agente como destinatario, para el
    /// puntaje de confianza de contraparte.
    async fn settlement_counts(&self, target: AgentId) -> Result<(i64, i64), CrossAgentError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeadManRepository: Send + Sync {
    async fn upsert_config(&self, config: DeadManConfig) -> Result<DeadManConfig, DeadManError>;
    async fn find_config(&self, agent_id: AgentId) -> Result<Option<DeadManConfig>, DeadManError>;
    async fn list_configs(&self) -> Result<Vec<DeadManConfig>, DeadManError>;
    async fn record_event(&self, event: DeadManEvent) -> Result<DeadManEvent, DeadManError>;
    /// Eventos freeze/terminate sin resolver (rehidratación al arranque).
    async fn unresolved_events(&self) -> Result<Vec<DeadManEvent>, DeadManError>;
    async fn resolve_events(&self, agent_id: AgentId) -> Result<u64, DeadManError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn append(&self, entry: AuditLog) -> Result<AuditLog, AuditError>;
    async fn list_for_agent(
        &self,
        agent_id: AgentId,
        limit: i64,
    ) -> Result<Vec<AuditLog>, AuditError>;
    async fn list_for_owner(
        &self,
        owner_id: OwnerId,
        limit: i64,
    ) -> Result<Vec<AuditLog>, AuditError>;
    async fn summary_for_owner(&self, owner_id: OwnerId) -> Result<AuditSummary, AuditError>;
}
