use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::audit::{AuditDecision, AuditLog};
use crate::domain::crossagent::{
    AuthorizationMethod, CrossAgentPolicy, CrossAgentTransaction, SettlementMode, SettlementStatus,
};
use crate::domain::deadman::{DeadManAction, DeadManConfig, DeadManEvent, DeadManTrigger};
use crate::domain::entities::{
    Agent, AgentGroup, AgentStatus, Owner, RecipientType, Transaction, TransactionStatus, Wallet,
    WalletStatus,
};
use crate::domain::killswitch::{KillSwitch, KillSwitchKind};
use crate::domain::lineage::{AgentLineage, SpawnPolicy};
use crate::domain::rules::{RuleKind, RuleParams, SpendRule};
use crate::domain::types::{
    AgentId, CrossAgentTxId, EventId, GroupId, KillSwitchId, OwnerId, PolicyId, RuleId,
    TransactionId, WalletId,
};

// Modelos de persistencia (Infrastructure Layer). El esquema relacional
// implícito es la única capa persistente; los subdocumentos JSON (params,
// metadata, reasoning, policies) son opacos para la base de datos.

#[derive(Debug, FromRow)]
pub struct OwnerModel {
    pub id: OwnerId,
    pub api_key: String,
    pub contact: String,
    pub created_at: DateTime<Utc>,
}

impl From<OwnerModel> for Owner {
    fn from(m: OwnerModel) -> Self {
        Self {
            id: m.id,
            api_key: m.api_key,
            contact: m.contact,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct AgentModel {
    pub id: AgentId,
    pub owner_id: OwnerId,
    pub api_key: String,
    pub name: String,
    pub status: AgentStatus,
    pub metadata: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<AgentModel> for Agent {
    fn from(m: AgentModel) -> Self {
        Self {
            id: m.id,
            owner_id: m.owner_id,
            api_key: m.api_key,
            name: m.name,
            status: m.status,
            metadata: m.metadata.0,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct WalletModel {
    pub id: WalletId,
    pub agent_id: AgentId,
    pub balance: Decimal,
    pub currency: String,
    pub status: WalletStatus,
    pub created_at: DateTime<Utc>,
}

impl From<WalletModel> for Wallet {
    fn from(m: WalletModel) -> Self {
        Self {
            id: m.id,
            agent_id: m.agent_id,
            balance: m.balance,
            currency: m.currency,
            status: m.status,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct TransactionModel {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub amount: Decimal,
    pub recipient_id: Option<String>,
    pub recipient_type: RecipientType,
    pub category: Option<String>,
    pub description: Option<String>,
    pub status: TransactionStatus,
    pub metadata: Json<serde_json::Value>,
    pub rule_check_results: Option<Json<serde_json::Value>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Transaction> for TransactionModel {
    fn from(t: &Transaction) -> Self {
        Self {
            id: t.id,
            wallet_id: t.wallet_id,
            amount: t.amount,
            recipient_id: t.recipient_id.clone(),
            recipient_type: t.recipient_type,
            category: t.category.clone(),
            description: t.description.clone(),
            status: t.status,
            metadata: Json(t.metadata.clone()),
            rule_check_results: t.rule_check_results.clone().map(Json),
            created_at: t.created_at,
            completed_at: t.completed_at,
        }
    }
}

impl From<TransactionModel> for Transaction {
    fn from(m: TransactionModel) -> Self {
        Self {
            id: m.id,
            wallet_id: m.wallet_id,
            amount: m.amount,
            recipient_id: m.recipient_id,
            recipient_type: m.recipient_type,
            category: m.category,
            description: m.description,
            status: m.status,
            metadata: m.metadata.0,
            rule_check_results: m.rule_check_results.map(|j| j.0),
            created_at: m.created_at,
            completed_at: m.completed_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct SpendRuleModel {
    pub id: RuleId,
    pub wallet_id: WalletId,
    pub kind: RuleKind,
    pub params: Json<RuleParams>,
    pub active: bool,
    pub priority: i32,
    pub throttled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&SpendRule> for SpendRuleModel {
    fn from(r: &SpendRule) -> Self {
        Self {
            id: r.id,
            wallet_id: r.wallet_id,
            // La columna kind se deriva de los params para poder filtrar
            // por clase sin abrir el JSONB.
            kind: r.kind(),
            params: Json(r.params.clone()),
            active: r.active,
            priority: r.priority,
            throttled: r.throttled,
            created_at: r.created_at,
        }
    }
}

impl From<SpendRuleModel> for SpendRule {
    fn from(m: SpendRuleModel) -> Self {
        Self {
            id: m.id,
            wallet_id: m.wallet_id,
            params: m.params.0,
            active: m.active,
            priority: m.priority,
            throttled: m.throttled,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct KillSwitchModel {
    pub id: KillSwitchId,
    pub wallet_id: WalletId,
    pub kind: KillSwitchKind,
    pub threshold: Decimal,
    pub window_hours: i64,
    pub active: bool,
    pub triggered: bool,
    pub triggered_at: Option<DateTime<Utc>>,
    pub reset_at: Option<DateTime<Utc>>,
    pub current_value: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl From<KillSwitchModel> for KillSwitch {
    fn from(m: KillSwitchModel) -> Self {
        Self {
            id: m.id,
            wallet_id: m.wallet_id,
            kind: m.kind,
            threshold: m.threshold,
            window_hours: m.window_hours,
            active: m.active,
            triggered: m.triggered,
            triggered_at: m.triggered_at,
            reset_at: m.reset_at,
            current_value: m.current_value,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct AgentLineageModel {
    pub agent_id: AgentId,
    pub parent_id: Option<AgentId>,
    pub root_id: AgentId,
    pub depth: i32,
    pub children_ids: Vec<Uuid>,
    pub status: AgentStatus,
    pub spawn_policy: Json<SpawnPolicy>,
    pub created_at: DateTime<Utc>,
}

impl From<AgentLineageModel> for AgentLineage {
    fn from(m: AgentLineageModel) -> Self {
        Self {
            agent_id: m.agent_id,
            parent_id: m.parent_id,
            root_id: m.root_id,
            depth: m.depth,
            children_ids: m.children_ids.into_iter().map(AgentId).collect(),
            status: m.status,
            spawn_policy: m.spawn_policy.0,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct CrossAgentPolicyModel {
    pub id: PolicyId,
    pub owner_id: OwnerId,
    pub source_agent_id: AgentId,
    pub target_agent_id: Option<AgentId>,
    pub target_agent_group: Option<GroupId>,
    pub allowed_payment_types: Vec<String>,
    pub max_per_transaction: Decimal,
    pub max_daily_to_target: Decimal,
    pub max_daily_all_agents: Decimal,
    pub require_human_approval_above: Option<Decimal>,
    pub require_mutual_policy: bool,
    pub settlement_mode: SettlementMode,
    pub min_counterparty_trust_score: Decimal,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<CrossAgentPolicyModel> for CrossAgentPolicy {
    fn from(m: CrossAgentPolicyModel) -> Self {
        Self {
            id: m.id,
            owner_id: m.owner_id,
            source_agent_id: m.source_agent_id,
            target_agent_id: m.target_agent_id,
            target_agent_group: m.target_agent_group,
            allowed_payment_types: m.allowed_payment_types,
            max_per_transaction: m.max_per_transaction,
            max_daily_to_target: m.max_daily_to_target,
            max_daily_all_agents: m.max_daily_all_agents,
            require_human_approval_above: m.require_human_approval_above,
            require_mutual_policy: m.require_mutual_policy,
            settlement_mode: m.settlement_mode,
            min_counterparty_trust_score: m.min_counterparty_trust_score,
            enabled: m.enabled,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct CrossAgentTransactionModel {
    pub id: CrossAgentTxId,
    pub source_agent_id: AgentId,
    pub target_agent_id: AgentId,
    pub amount: Decimal,
    pub payment_type: String,
    pub authorized: bool,
    pub authorization_method: AuthorizationMethod,
    pub settlement_status: SettlementStatus,
    pub requires_human: bool,
    pub policy_id: Option<PolicyId>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CrossAgentTransactionModel> for CrossAgentTransaction {
    fn from(m: CrossAgentTransactionModel) -> Self {
        Self {
            id: m.id,
            source_agent_id: m.source_agent_id,
            target_agent_id: m.target_agent_id,
            amount: m.amount,
            payment_type: m.payment_type,
            authorized: m.authorized,
            authorization_method: m.authorization_method,
            settlement_status: m.settlement_status,
            requires_human: m.requires_human,
            policy_id: m.policy_id,
            reason: m.reason,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct AgentGroupModel {
    pub id: GroupId,
    pub owner_id: OwnerId,
    pub name: String,
    pub agent_ids: Vec<Uuid>,
}

impl From<AgentGroupModel> for AgentGroup {
    fn from(m: AgentGroupModel) -> Self {
        Self {
            id: m.id,
            owner_id: m.owner_id,
            name: m.name,
            agent_ids: m.agent_ids.into_iter().map(AgentId).collect(),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct DeadManConfigModel {
    pub agent_id: AgentId,
    pub heartbeat_interval_seconds: i64,
    pub missed_heartbeat_threshold: i64,
    pub anomaly_window_minutes: i64,
    pub anomaly_spend_multiplier: Decimal,
    pub anomaly_tx_count_multiplier: Decimal,
    pub max_tx_per_minute: i64,
    pub max_unique_vendors_per_hour: i64,
    pub on_anomaly: DeadManAction,
    pub on_missed_heartbeat: DeadManAction,
    pub on_manual_trigger: DeadManAction,
    pub cascade_to_children: bool,
    pub recovery_requires_human: bool,
    pub created_at: DateTime<Utc>,
}

impl From<DeadManConfigModel> for DeadManConfig {
    fn from(m: DeadManConfigModel) -> Self {
        Self {
            agent_id: m.agent_id,
            heartbeat_interval_seconds: m.heartbeat_interval_seconds,
            missed_heartbeat_threshold: m.missed_heartbeat_threshold,
            anomaly_window_minutes: m.anomaly_window_minutes,
            anomaly_spend_multiplier: m.anomaly_spend_multiplier,
            anomaly_tx_count_multiplier: m.anomaly_tx_count_multiplier,
            max_tx_per_minute: m.max_tx_per_minute,
            max_unique_vendors_per_hour: m.max_unique_vendors_per_hour,
            on_anomaly: m.on_anomaly,
            on_missed_heartbeat: m.on_missed_heartbeat,
            on_manual_trigger: m.on_manual_trigger,
            cascade_to_children: m.cascade_to_children,
            recovery_requires_human: m.recovery_requires_human,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct DeadManEventModel {
    pub id: EventId,
    pub agent_id: AgentId,
    pub trigger_type: DeadManTrigger,
    pub action_taken: DeadManAction,
    pub details: Json<serde_json::Value>,
    pub cascaded_to: Vec<Uuid>,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

impl From<DeadManEventModel> for DeadManEvent {
    fn from(m: DeadManEventModel) -> Self {
        Self {
            id: m.id,
            agent_id: m.agent_id,
            trigger_type: m.trigger_type,
            action_taken: m.action_taken,
            details: m.details.0,
            cascaded_to: m.cascaded_to.into_iter().map(AgentId).collect(),
            resolved: m.resolved,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct AuditLogModel {
    pub id: EventId,
    pub agent_id: Option<AgentId>,
    pub action: String,
    pub resource: String,
    pub resource_id: String,
    pub decision: AuditDecision,
    pub reasoning: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditLogModel> for AuditLog {
    fn from(m: AuditLogModel) -> Self {
        Self {
            id: m.id,
            agent_id: m.agent_id,
            action: m.action,
            resource: m.resource,
            resource_id: m.resource_id,
            decision: m.decision,
            reasoning: m.reasoning.0,
            created_at: m.created_at,
        }
    }
}
