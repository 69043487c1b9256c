use crate::domain::entities::WalletStatus;
use crate::domain::types::{
    AgentId, CrossAgentTxId, KillSwitchId, OwnerId, PolicyId, RuleId, TransactionId, WalletId,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent not found with ID: {0}")]
    NotFound(AgentId),

    #[error("Owner not found with ID: {0}")]
    OwnerNotFound(OwnerId),

    #[error("Invalid agent data: {0}")]
    InvalidData(String),

    #[error("Illegal agent state transition: {0}")]
    InvalidState(String),

    #[error("Repository error: {0}")]
    RepositoryError(String),
}

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Wallet not found with ID: {0}")]
    NotFound(WalletId),

    #[error("Agent not found with ID: {0}")]
    AgentNotFound(AgentId),

    #[error("Invalid wallet data: {0}")]
    InvalidData(String),

    #[error("Insufficient funds in wallet: {0}")]
    InsufficientFunds(WalletId),

    #[error("Wallet {0} is not active (status: {1:?})")]
    NotActive(WalletId, WalletStatus),

    #[error("Wallet {0} is latched by a kill switch")]
    KillSwitched(WalletId),

    #[error("Repository error: {0}")]
    RepositoryError(String),
}

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction not found with ID: {0}")]
    NotFound(TransactionId),

    #[error("Transaction amount must be positive")]
    InvalidAmount,

    #[error("Invalid transaction data: {0}")]
    ValidationError(String),

    #[error("Transaction {0} is not awaiting approval")]
    NotAwaitingApproval(TransactionId),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Repository error: {0}")]
    RepositoryError(String),
}

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Rule not found with ID: {0}")]
    NotFound(RuleId),

    #[error("Invalid rule parameters: {0}")]
    InvalidParams(String),

    #[error("Repository error: {0}")]
    RepositoryError(String),
}

#[derive(Error, Debug)]
pub enum KillSwitchError {
    #[error("Kill switch not found with ID: {0}")]
    NotFound(KillSwitchId),

    #[error("Invalid kill switch configuration: {0}")]
    InvalidConfig(String),

    #[error("Kill switch {0} is not triggered")]
    NotTriggered(KillSwitchId),

    #[error("Repository error: {0}")]
    RepositoryError(String),
}

#[derive(Error, Debug)]
pub enum DeadManError {
    #[error("No dead-man configuration for agent: {0}")]
    NotRegistered(AgentId),

    #[error("Invalid dead-man configuration: {0}")]
    InvalidConfig(String),

    #[error("Agent {0} is frozen by dead-man switch")]
    Frozen(AgentId),

    #[error("Agent {0} is terminated and cannot be recovered")]
    Terminated(AgentId),

    #[error("Repository error: {0}")]
    RepositoryError(String),
}

#[derive(Error, Debug)]
pub enum LineageError {
    #[error("Agent not found with ID: {0}")]
    AgentNotFound(AgentId),

    #[error("Lineage not found for agent: {0}")]
    NotFound(AgentId),

    #[error("Spawn rejected: {0}")]
    SpawnRejected(String),

    #[error("Agent {0} already has a lineage record")]
    DuplicateLineage(AgentId),

    #[error("Repository error: {0}")]
    RepositoryError(String),
}

#[derive(Error, Debug)]
pub enum CrossAgentError {
    #[error("Policy not found with ID: {0}")]
    PolicyNotFound(PolicyId),

    #[error("Cross-agent transaction not found with ID: {0}")]
    NotFound(CrossAgentTxId),

    #[error("Invalid policy data: {0}")]
    InvalidData(String),

    #[error("Authorization rejected: {0}")]
    Rejected(String),

    #[error("Cross-agent transaction {0} is not pending escalation")]
    NotEscalated(CrossAgentTxId),

    #[error("Repository error: {0}")]
    RepositoryError(String),
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Repository error: {0}")]
    RepositoryError(String),
}
