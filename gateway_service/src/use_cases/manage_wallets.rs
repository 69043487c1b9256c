use std::sync::Arc;

use crate::domain::audit::{AuditDecision, AuditLog};
use crate::domain::entities::{Wallet, WalletStatus};
use crate::domain::error::WalletError;
use crate::domain::repository::{AgentRepository, AuditLogRepository, WalletRepository};
use crate::domain::types::{AgentId, WalletId};

/// Altas y transiciones manuales de billeteras. El congelamiento manual es
/// reversible por el dueño; `KillSwitched` solo lo pone el kill switch (o
/// la parada de emergencia) y solo lo saca un reset.
pub struct ManageWalletsUseCase {
    wallet_repo: Arc<dyn WalletRepository>,
    agent_repo: Arc<dyn AgentRepository>,
    audit_repo: Arc<dyn AuditLogRepository>,
}

impl ManageWalletsUseCase {
    pub fn new(
        wallet_repo: Arc<dyn WalletRepository>,
        agent_repo: Arc<dyn AgentRepository>,
        audit_repo: Arc<dyn AuditLogRepository>,
    ) -> Self {
        Self {
            wallet_repo,
            agent_repo,
            audit_repo,
        }
    }

    #[tracing::instrument(name = "ManageWalletsUseCase::create", skip(self))]
    pub async fn create(&self, agent_id: AgentId, currency: String) -> Result<Wallet, WalletError> {
        self.agent_repo
            .find_by_id(agent_id)
            .await
            .map_err(|e| WalletError::RepositoryError(e.to_string()))?
            .ok_or(WalletError::AgentNotFound(agent_id))?;

        let wallet = Wallet::new(agent_id, currency)?;
        let saved = self.wallet_repo.create(wallet).await?;
        self.audit(&saved, "wallet.create").await;
        Ok(saved)
    }

    pub async fn get(&self, id: WalletId) -> Result<Wallet, WalletError> {
        self.wallet_repo
            .find_by_id(id)
            .await?
            .ok_or(WalletError::NotFound(id))
    }

    pub async fn list_for_agent(&self, agent_id: AgentId) -> Result<Vec<Wallet>, WalletError> {
        self.wallet_repo.list_by_agent(agent_id).await
    }

    /// Congela o descongela manualmente. Una billetera enganchada por kill
    /// switch no se descongela por esta vía.
    #[tracing::instrument(name = "ManageWalletsUseCase::set_frozen", skip(self))]
    pub async fn set_frozen(&self, id: WalletId, frozen: bool) -> Result<Wallet, WalletError> {
        let mut wallet = self.get(id).await?;
        match (wallet.status, frozen) {
            (WalletStatus::Active, true) => {
                self.wallet_repo.update_status(id, WalletStatus::Frozen).await?;
                wallet.status = WalletStatus::Frozen;
            }
            (WalletStatus::Frozen, false) => {
                self.wallet_repo.update_status(id, WalletStatus::Active).await?;
                wallet.status = WalletStatus::Active;
            }
            (WalletStatus::KillSwitched, false) => {
                return Err(WalletError::KillSwitched(id));
            }
            _ => {
                return Err(WalletError::InvalidData(format!(
                    "wallet {} is {:?}; cannot set frozen={}",
                    id, wallet.status, frozen
                )));
            }
        }
        self.audit(&wallet, "wallet.set_frozen").await;
        Ok(wallet)
    }

    async fn audit(&self, wallet: &Wallet, action: &str) {
        let entry = AuditLog::new(
            Some(wallet.agent_id),
            action,
            "wallet",
            wallet.id.to_string(),
            AuditDecision::System,
            serde_json::json!({ "status": wallet.status, "currency": wallet.currency }),
        );
        if let Err(e) = self.audit_repo.append(entry).await {
            tracing::error!("Failed to audit {} for {}: {}", action, wallet.id, e);
        }
    }
}
