use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::domain::gateways::{GatewayError, PaymentRail, RailReceipt};
use crate::domain::types::AgentId;

/// Rail de pago falso para desarrollo y tests: acepta todo envío y lo
/// registra en el log. Un adaptador real (procesador de tarjetas, wallet
/// on-chain, proxy 402) implementa el mismo trait.
pub struct FakePaymentRail;

impl FakePaymentRail {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FakePaymentRail {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentRail for FakePaymentRail {
    async fn create_wallet(&self, agent_id: AgentId) -> Result<String, GatewayError> {
        let address = format!("fake-rail-{}", Uuid::new_v4().simple());
        info!(%agent_id, %address, "fake rail wallet created");
        Ok(address)
    }

    async fn send(
        &self,
        agent_id: AgentId,
        to_address: &str,
        amount: Decimal,
        currency: &str,
        purpose: &str,
        _metadata: &serde_json::Value,
    ) -> Result<RailReceipt, GatewayError> {
        info!(%agent_id, to_address, %amount, currency, purpose, "fake rail send");
        Ok(RailReceipt {
            success: true,
            blocked_by: None,
            reason: None,
        })
    }

    async fn get_balance(&self, _agent_id: AgentId) -> Result<Decimal, GatewayError> {
        Ok(Decimal::ZERO)
    }
}
