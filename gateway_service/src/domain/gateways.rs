use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::types::AgentId;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("external hook unavailable: {0}")]
    Unavailable(String),
}

/// Hook de notificación externo (webhook, cola, etc.). Best-effort: un
/// fallo aquí nunca bloquea la admisión.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn notify(&self, topic: &str, payload: serde_json::Value) -> Result<(), GatewayError>;
}

/// Resultado del rail externo para un envío delegado.
#[derive(Debug, Clone)]
pub struct RailReceipt {
    pub success: bool,
    pub blocked_by: Option<String>,
    pub reason: Option<String>,
}

/// Contrato de capacidad que todo adaptador de rail de pago debe cumplir
/// (procesador de tarjetas, billetera on-chain, proxy HTTP 402). El core
/// pasa cada `send` por sus compuertas antes de delegar aquí.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentRail: Send + Sync {
    async fn create_wallet(&self, agent_id: AgentId) -> Result<String, GatewayError>;
    async fn send(
        &self,
        agent_id: AgentId,
        to_address: &str,
        amount: Decimal,
        currency: &str,
        purpose: &str,
        metadata: &serde_json::Value,
    ) -> Result<RailReceipt, GatewayError>;
    async fn get_balance(&self, agent_id: AgentId) -> Result<Decimal, GatewayError>;
}
