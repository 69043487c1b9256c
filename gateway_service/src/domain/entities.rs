use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::{AgentError, TransactionError, WalletError};
use crate::domain::types::{AgentId, GroupId, OwnerId, TransactionId, WalletId};

/// Categoría reservada para depósitos: nunca cuenta contra reglas de gasto.
pub const DEPOSIT_CATEGORY: &str = "deposit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "agent_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Active,
    Paused,
    Suspended,
    Frozen,
    Terminated,
    Killed,
}

impl AgentStatus {
    /// Terminated y Killed son estados finales: no hay vuelta atrás.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Terminated | AgentStatus::Killed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "wallet_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletStatus {
    Active,
    Frozen,
    Closed,
    KillSwitched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Approved,
    AwaitingApproval,
    Rejected,
    Completed,
    Failed,
    Cancelled,
    KillSwitched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "recipient_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientType {
    External,
    AgentWallet,
    Escrow,
}

/// Modelo de Entidad: Owner.
/// El dueño humano (u organización) que responde por uno o más agentes.
/// Su `api_key` es opaca e inmutable: la rotación la reemplaza atómicamente.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub id: OwnerId,
    pub api_key: String,
    pub contact: String,
    pub created_at: DateTime<Utc>,
}

impl Owner {
    pub fn new(contact: String) -> Result<Self, AgentError> {
        if contact.trim().is_empty() {
            return Err(AgentError::InvalidData(
                "Owner contact cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            id: OwnerId::new(),
            api_key: generate_api_key("owner"),
            contact,
            created_at: Utc::now(),
        })
    }
}

/// Modelo de Entidad: Agent.
/// Un principal autónomo cuyo gasto está gobernado por el gateway.
///
/// Las transiciones de estado se alejan monótonamente de `Active` salvo por
/// reset explícito de un operador; `Terminated`/`Killed` son terminales.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub owner_id: OwnerId,
    pub api_key: String,
    pub name: String,
    pub status: AgentStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(owner_id: OwnerId, name: String) -> Result<Self, AgentError> {
        if name.trim().is_empty() {
            return Err(AgentError::InvalidData(
                "Agent name cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            id: AgentId::new(),
            owner_id,
            api_key: generate_api_key("agent"),
            name,
            status: AgentStatus::Active,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        })
    }

    /// Valida una transición manual de estado pedida por el dueño.
    pub fn can_transition_to(&self, next: AgentStatus) -> Result<(), AgentError> {
        if self.status.is_terminal() {
            return Err(AgentError::InvalidState(format!(
                "Agent {} is {:?} and cannot change state",
                self.id, self.status
            )));
        }
        if next == self.status {
            return Err(AgentError::InvalidState(format!(
                "Agent {} is already {:?}",
                self.id, next
            )));
        }
        Ok(())
    }
}

/// Modelo de Entidad: Wallet.
/// Una entrada de libro mayor con saldo, propiedad de exactamente un agente.
/// Invariante: el balance después de cualquier débito completado es >= 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub agent_id: AgentId,
    pub balance: Decimal,
    pub currency: String,
    pub status: WalletStatus,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(agent_id: AgentId, currency: String) -> Result<Self, WalletError> {
        let currency = currency.trim().to_uppercase();
        if currency.len() != 3 {
            return Err(WalletError::InvalidData(
                "Currency must be a 3-letter ISO code".to_string(),
            ));
        }
        Ok(Self {
            id: WalletId::new(),
            agent_id,
            balance: Decimal::ZERO,
            currency,
            status: WalletStatus::Active,
            created_at: Utc::now(),
        })
    }

    /// Solo una billetera Active puede ser debitada.
    pub fn ensure_debitable(&self, amount: Decimal) -> Result<(), WalletError> {
        match self.status {
            WalletStatus::Active => {}
            WalletStatus::KillSwitched => return Err(WalletError::KillSwitched(self.id)),
            other => return Err(WalletError::NotActive(self.id, other)),
        }
        if self.balance < amount {
            return Err(WalletError::InsufficientFunds(self.id));
        }
        Ok(())
    }
}

/// Modelo de Entidad: Transaction.
/// Creada en la admisión; muta a un estado terminal dentro de la misma
/// llamada, excepto `AwaitingApproval` que persiste hasta decisión del dueño.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub amount: Decimal,
    pub recipient_id: Option<String>,
    pub recipient_type: RecipientType,
    pub category: Option<String>,
    pub description: Option<String>,
    pub status: TransactionStatus,
    pub metadata: serde_json::Value,
    pub rule_check_results: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn new(wallet_id: WalletId, candidate: SpendCandidate) -> Result<Self, TransactionError> {
        if candidate.amount <= Decimal::ZERO {
            return Err(TransactionError::InvalidAmount);
        }
        Ok(Self {
            id: TransactionId::new(),
            wallet_id,
            amount: candidate.amount,
            recipient_id: candidate.recipient_id,
            recipient_type: candidate.recipient_type,
            category: candidate.category,
            description: candidate.description,
            status: TransactionStatus::Pending,
            metadata: candidate.metadata.unwrap_or(serde_json::Value::Null),
            rule_check_results: None,
            created_at: Utc::now(),
            completed_at: None,
        })
    }

    /// Una transacción Completed de categoría "deposit" no cuenta contra
    /// ninguna regla de gasto ni agregado de ventana.
    pub fn deposit(wallet_id: WalletId, amount: Decimal) -> Result<Self, TransactionError> {
        if amount <= Decimal::ZERO {
            return Err(TransactionError::InvalidAmount);
        }
        let now = Utc::now();
        Ok(Self {
            id: TransactionId::new(),
            wallet_id,
            amount,
            recipient_id: None,
            recipient_type: RecipientType::External,
            category: Some(DEPOSIT_CATEGORY.to_string()),
            description: None,
            status: TransactionStatus::Completed,
            metadata: serde_json::Value::Null,
            rule_check_results: None,
            created_at: now,
            completed_at: Some(now),
        })
    }

    pub fn is_deposit(&self) -> bool {
        self.category.as_deref() == Some(DEPOSIT_CATEGORY)
    }

    /// Delta que esta transacción aplica al balance de su billetera.
    /// Depósitos suman, todo lo demás resta.
    pub fn signed_amount(&self) -> Decimal {
        if self.is_deposit() {
            self.amount
        } else {
            -self.amount
        }
    }

    /// Lee `metadata.pnl` si la transacción lo trae (posiciones de trading).
    pub fn pnl(&self) -> Option<Decimal> {
        let value = self.metadata.get("pnl")?;
        match value {
            serde_json::Value::Number(n) => n.to_string().parse().ok(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// DTO de entrada para la admisión de un gasto.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct SpendCandidate {
    pub amount: Decimal,
    pub recipient_id: Option<String>,
    pub recipient_type: RecipientType,
    pub category: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Modelo de Entidad: AgentGroup.
/// Solo se usa como ancla de resolución para `target_agent_group` en
/// políticas cross-agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentGroup {
    pub id: GroupId,
    pub owner_id: OwnerId,
    pub name: String,
    pub agent_ids: Vec<AgentId>,
}

/// Genera una credencial bearer opaca. El prefijo solo facilita el triage
/// en logs; no participa en la autorización.
pub fn generate_api_key(prefix: &str) -> String {
    format!("aw_{}_{}", prefix, Uuid::new_v4().simple())
}
