use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::audit::{AuditDecision, AuditLog};
use crate::domain::entities::{AgentStatus, WalletStatus};
use crate::domain::error::{KillSwitchError, WalletError};
use crate::domain::killswitch::{KillSwitch, KillSwitchKind};
use crate::domain::repository::{
    AgentRepository, AuditLogRepository, KillSwitchRepository, WalletRepository,
};
use crate::domain::types::{KillSwitchId, WalletId};

/// Administración de kill switches: alta, reset de operador, baja y la
/// parada de emergencia que no espera a ningún gatillo.
pub struct ManageKillSwitchesUseCase {
    kill_switch_repo: Arc<dyn KillSwitchRepository>,
    wallet_repo: Arc<dyn WalletRepository>,
    agent_repo: Arc<dyn AgentRepository>,
    audit_repo: Arc<dyn AuditLogRepository>,
}

impl ManageKillSwitchesUseCase {
    pub fn new(
        kill_switch_repo: Arc<dyn KillSwitchRepository>,
        wallet_repo: Arc<dyn WalletRepository>,
        agent_repo: Arc<dyn AgentRepository>,
        audit_repo: Arc<dyn AuditLogRepository>,
    ) -> Self {
        Self {
            kill_switch_repo,
            wallet_repo,
            agent_repo,
            audit_repo,
        }
    }

    #[tracing::instrument(name = "ManageKillSwitchesUseCase::create", skip(self))]
    pub async fn create(
        &self,
        wallet_id: WalletId,
        kind: KillSwitchKind,
        threshold: Decimal,
        window_hours: i64,
    ) -> Result<KillSwitch, KillSwitchError> {
        self.wallet_repo
            .find_by_id(wallet_id)
            .await
            .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))?
            .ok_or_else(|| {
                KillSwitchError::InvalidConfig(WalletError::NotFound(wallet_id).to_string())
            })?;

        let switch = KillSwitch::new(wallet_id, kind, threshold, window_hours)?;
        let saved = self.kill_switch_repo.create(switch).await?;

        let entry = AuditLog::new(
            None,
            "kill_switch.create",
            "kill_switch",
            saved.id.to_string(),
            AuditDecision::System,
            serde_json::json!({
                "wallet_id": wallet_id,
                "kind": kind,
                "threshold": threshold,
                "window_hours": window_hours,
            }),
        );
        if let Err(e) = self.audit_repo.append(entry).await {
            tracing::error!("Failed to audit kill switch creation {}: {}", saved.id, e);
        }
        Ok(saved)
    }

    /// Reset de operador: limpia el pestillo y devuelve la billetera a
    /// Active, atómicamente (lo garantiza el repositorio). La entrada de
    /// auditoría viaja en la misma transacción de BD.
    #[tracing::instrument(name = "ManageKillSwitchesUseCase::reset", skip(self))]
    pub async fn reset(&self, id: KillSwitchId) -> Result<(), KillSwitchError> {
        let switch = self
            .kill_switch_repo
            .find_by_id(id)
            .await?
            .ok_or(KillSwitchError::NotFound(id))?;
        if !switch.triggered {
            return Err(KillSwitchError::NotTriggered(id));
        }

        let audit = AuditLog::new(
            None,
            "kill_switch.reset",
            "kill_switch",
            id.to_string(),
            AuditDecision::System,
            serde_json::json!({
                "wallet_id": switch.wallet_id,
                "kind": switch.kind,
                "was_triggered_at": switch.triggered_at,
            }),
        );
        self.kill_switch_repo.reset(id, switch.wallet_id, audit).await
    }

    #[tracing::instrument(name = "ManageKillSwitchesUseCase::delete", skip(self))]
    pub async fn delete(&self, id: KillSwitchId) -> Result<(), KillSwitchError> {
        let switch = self
            .kill_switch_repo
            .find_by_id(id)
            .await?
            .ok_or(KillSwitchError::NotFound(id))?;
        self.kill_switch_repo.delete(id).await?;

        let entry = AuditLog::new(
            None,
            "kill_switch.delete",
            "kill_switch",
            id.to_string(),
            AuditDecision::System,
            serde_json::json!({ "wallet_id": switch.wallet_id, "kind": switch.kind }),
        );
        if let Err(e) = self.audit_repo.append(entry).await {
            tracing::error!("Failed to audit kill switch deletion {}: {}", id, e);
        }
        Ok(())
    }

    pub async fn list(&self, wallet_id: WalletId) -> Result<Vec<KillSwitch>, KillSwitchError> {
        self.kill_switch_repo.list_active_for_wallet(wallet_id).await
    }

    pub async fn find(&self, id: KillSwitchId) -> Result<Option<KillSwitch>, KillSwitchError> {
        self.kill_switch_repo.find_by_id(id).await
    }

    /// Parada de emergencia del dueño: billetera a KillSwitched y agente a
    /// Killed, sin evaluar ningún gatillo.
    #[tracing::instrument(name = "ManageKillSwitchesUseCase::emergency_stop", skip(self))]
    pub async fn emergency_stop(&self, wallet_id: WalletId) -> Result<(), KillSwitchError> {
        let wallet = self
            .wallet_repo
            .find_by_id(wallet_id)
            .await
            .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))?
            .ok_or_else(|| {
                KillSwitchError::InvalidConfig(WalletError::NotFound(wallet_id).to_string())
            })?;

        self.wallet_repo
            .update_status(wallet_id, WalletStatus::KillSwitched)
            .await
            .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))?;
        self.agent_repo
            .update_status(wallet.agent_id, AgentStatus::Killed)
            .await
            .map_err(|e| KillSwitchError::RepositoryError(e.to_string()))?;

        let entry = AuditLog::new(
            Some(wallet.agent_id),
            "kill_switch.emergency_stop",
            "wallet",
            wallet_id.to_string(),
            AuditDecision::System,
            serde_json::json!({ "agent_id": wallet.agent_id, "forced": true }),
        );
        if let Err(e) = self.audit_repo.append(entry).await {
            tracing::error!("Failed to audit emergency stop of {}: {}", wallet_id, e);
        }
        Ok(())
    }
}
