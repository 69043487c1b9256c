use async_trait::async_trait;
use tracing::info;

use crate::domain::gateways::{GatewayError, NotificationGateway};

/// Notificador por defecto: escribe el evento en el log estructurado.
/// En producción se reemplaza por un webhook o una cola; el contrato es el
/// mismo y siempre best-effort.
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationGateway for LogNotifier {
    async fn notify(&self, topic: &str, payload: serde_json::Value) -> Result<(), GatewayError> {
        info!(topic, %payload, "notification");
        Ok(())
    }
}
