use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;

use crate::domain::audit::{AuditDecision, AuditLog};
use crate::domain::crossagent::{
    resolve_policy, AuthorizationMethod, CrossAgentPolicy, CrossAgentTransaction, SettlementMode,
    SettlementStatus,
};
use crate::domain::entities::AgentGroup;
use crate::domain::error::CrossAgentError;
use crate::domain::gateways::NotificationGateway;
use crate::domain::repository::{AgentRepository, AuditLogRepository, CrossAgentRepository};
use crate::domain::types::{AgentId, CrossAgentTxId, OwnerId, PolicyId};

/// Cross-agent governor: resuelve la política más específica entre dos
/// agentes, aplica sus controles y registra el estado de liquidación.
///
/// Las transacciones cross-agent no pasan por el motor de reglas de la
/// billetera: esta es su ruta de admisión completa.
pub struct CrossAgentUseCase {
    cross_repo: Arc<dyn CrossAgentRepository>,
    agent_repo: Arc<dyn AgentRepository>,
    audit_repo: Arc<dyn AuditLogRepository>,
    notifier: Arc<dyn NotificationGateway>,
}

impl CrossAgentUseCase {
    pub fn new(
        cross_repo: Arc<dyn CrossAgentRepository>,
        agent_repo: Arc<dyn AgentRepository>,
        audit_repo: Arc<dyn AuditLogRepository>,
        notifier: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self {
            cross_repo,
            agent_repo,
            audit_repo,
            notifier,
        }
    }

    // --- Policy CRUD -----------------------------------------------------

    pub async fn create_policy(
        &self,
        policy: CrossAgentPolicy,
    ) -> Result<CrossAgentPolicy, CrossAgentError> {
        policy.validate()?;
        let saved = self.cross_repo.create_policy(policy).await?;
        self.audit(
            Some(saved.source_agent_id),
            "cross_agent.policy_create",
            "cross_agent_policy",
            saved.id.to_string(),
            AuditDecision::System,
            serde_json::json!({ "enabled": saved.enabled }),
        )
        .await;
        Ok(saved)
    }

    pub async fn update_policy(
        &self,
        policy: CrossAgentPolicy,
    ) -> Result<CrossAgentPolicy, CrossAgentError> {
        policy.validate()?;
        self.cross_repo
            .find_policy(policy.id)
            .await?
            .ok_or(CrossAgentError::PolicyNotFound(policy.id))?;
        let updated = self.cross_repo.update_policy(policy).await?;
        self.audit(
            Some(updated.source_agent_id),
            "cross_agent.policy_update",
            "cross_agent_policy",
            updated.id.to_string(),
            AuditDecision::System,
            serde_json::json!({ "enabled": updated.enabled }),
        )
        .await;
        Ok(updated)
    }

    pub async fn delete_policy(&self, id: PolicyId) -> Result<(), CrossAgentError> {
        let policy = self
            .cross_repo
            .find_policy(id)
            .await?
            .ok_or(CrossAgentError::PolicyNotFound(id))?;
        self.cross_repo.delete_policy(id).await?;
        self.audit(
            Some(policy.source_agent_id),
            "cross_agent.policy_delete",
            "cross_agent_policy",
            id.to_string(),
            AuditDecision::System,
            serde_json::Value::Null,
        )
        .await;
        Ok(())
    }

    pub async fn list_policies(
        &self,
        owner: OwnerId,
    ) -> Result<Vec<CrossAgentPolicy>, CrossAgentError> {
        self.cross_repo.list_policies_for_owner(owner).await
    }

    pub async fn find_policy(
        &self,
        id: PolicyId,
    ) -> Result<Option<CrossAgentPolicy>, CrossAgentError> {
        self.cross_repo.find_policy(id).await
    }

    pub async fn create_group(&self, group: AgentGroup) -> Result<AgentGroup, CrossAgentError> {
        if group.name.trim().is_empty() {
            return Err(CrossAgentError::InvalidData(
                "group name cannot be empty".to_string(),
            ));
        }
        let saved = self.cross_repo.create_group(group).await?;
        self.audit(
            None,
            "cross_agent.group_create",
            "agent_group",
            saved.id.to_string(),
            AuditDecision::System,
            serde_json::json!({ "members": saved.agent_ids.len() }),
        )
        .await;
        Ok(saved)
    }

    // --- Authorization ---------------------------------------------------

    /// Autoriza un pago agent-a-agent. El resultado persistido cuenta toda
    /// la historia: autorizado, escalado a humano, o retenido sin política.
    #[tracing::instrument(name = "CrossAgentUseCase::authorize", skip(self))]
    pub async fn authorize(
        &self,
        source: AgentId,
        target: AgentId,
        amount: Decimal,
        payment_type: String,
    ) -> Result<CrossAgentTransaction, CrossAgentError> {
        if amount <= Decimal::ZERO {
            return Err(CrossAgentError::InvalidData(
                "amount must be positive".to_string(),
            ));
        }

        // 1. Resolución de política: exacta → grupo → comodín.
        let policies = self.cross_repo.list_policies_for_source(source).await?;
        let groups = self.cross_repo.groups_containing(target).await?;
        let Some(policy) = resolve_policy(&policies, target, &groups).cloned() else {
            // Sin política: se retiene a la espera de un humano.
            let held = self
                .persist_tx(
                    source,
                    target,
                    amount,
                    payment_type,
                    false,
                    AuthorizationMethod::Escalated,
                    SettlementStatus::Pending,
                    true,
                    None,
                    Some("no policy covers this pair; human approval required".to_string()),
                )
                .await?;
            self.notify_escalation(&held).await;
            return Ok(held);
        };

        // 2. Política mutua si la política la exige.
        if policy.require_mutual_policy {
            let reverse_policies = self.cross_repo.list_policies_for_source(target).await?;
            let reverse_groups = self.cross_repo.groups_containing(source).await?;
            if resolve_policy(&reverse_policies, source, &reverse_groups).is_none() {
                return self
                    .persist_rejected(source, target, amount, payment_type, policy.id,
                        "mutual policy required but target has none".to_string())
                    .await;
            }
        }

        // 3. Controles: tipo de pago, por transacción, diarios y confianza.
        let since = Utc::now() - Duration::hours(24);
        let daily_to_target = self
            .cross_repo
            .sum_authorized_since(source, Some(target), since)
            .await?;
        let daily_all = self.cross_repo.sum_authorized_since(source, None, since).await?;
        let trust_score = {
            let (settled, total) = self.cross_repo.settlement_counts(target).await?;
            if total > 0 {
                Some(Decimal::from(settled) / Decimal::from(total))
            } else {
                None
            }
        };

        if let Err(rejection) =
            policy.check(amount, &payment_type, daily_to_target, daily_all, trust_score)
        {
            return self
                .persist_rejected(source, target, amount, payment_type, policy.id, rejection.to_string())
                .await;
        }

        // 4. Escalamiento por monto alto.
        if policy.needs_human(amount) {
            let escalated = self
                .persist_tx(
                    source,
                    target,
                    amount,
                    payment_type,
                    false,
                    AuthorizationMethod::Escalated,
                    SettlementStatus::Pending,
                    true,
                    Some(policy.id),
                    Some("amount above human-approval threshold".to_string()),
                )
                .await?;
            self.notify_escalation(&escalated).await;
            return Ok(escalated);
        }

        // 5. Autorizada; la liquidación inmediata queda settled, el resto
        //    pendiente.
        let settlement = match policy.settlement_mode {
            SettlementMode::Immediate => SettlementStatus::Settled,
            SettlementMode::Batched | SettlementMode::Escrow => SettlementStatus::Pending,
        };
        self.persist_tx(
            source,
            target,
            amount,
            payment_type,
            true,
            AuthorizationMethod::Auto,
            settlement,
            false,
            Some(policy.id),
            None,
        )
        .await
    }

    /// Aprobación del dueño para una transacción escalada. Solo el dueño
    /// del agente fuente puede firmar; para cualquier otro la transacción
    /// no existe.
    #[tracing::instrument(name = "CrossAgentUseCase::approve", skip(self))]
    pub async fn approve(
        &self,
        id: CrossAgentTxId,
        operator: OwnerId,
    ) -> Result<CrossAgentTransaction, CrossAgentError> {
        let mut tx = self
            .cross_repo
            .find_tx(id)
            .await?
            .ok_or(CrossAgentError::NotFound(id))?;

        let source_agent = self
            .agent_repo
            .find_by_id(tx.source_agent_id)
            .await
            .map_err(|e| CrossAgentError::RepositoryError(e.to_string()))?
            .ok_or(CrossAgentError::NotFound(id))?;
        if source_agent.owner_id != operator {
            return Err(CrossAgentError::NotFound(id));
        }

        if tx.authorized || !tx.requires_human {
            return Err(CrossAgentError::NotEscalated(id));
        }

        tx.authorized = true;
        tx.authorization_method = AuthorizationMethod::HumanApproved;
        let approved = self.cross_repo.update_tx(tx).await?;

        self.audit(
            Some(approved.source_agent_id),
            "cross_agent.approve",
            "cross_agent_transaction",
            approved.id.to_string(),
            AuditDecision::Allowed,
            serde_json::json!({ "operator": operator }),
        )
        .await;
        Ok(approved)
    }

    // --- Internals -------------------------------------------------------

    async fn persist_rejected(
        &self,
        source: AgentId,
        target: AgentId,
        amount: Decimal,
        payment_type: String,
        policy_id: PolicyId,
        reason: String,
    ) -> Result<CrossAgentTransaction, CrossAgentError> {
        let rejected = self
            .persist_tx(
                source,
                target,
                amount,
                payment_type,
                false,
                AuthorizationMethod::Auto,
                SettlementStatus::Failed,
                false,
                Some(policy_id),
                Some(reason),
            )
            .await?;
        Ok(rejected)
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist_tx(
        &self,
        source: AgentId,
        target: AgentId,
        amount: Decimal,
        payment_type: String,
        authorized: bool,
        method: AuthorizationMethod,
        settlement: SettlementStatus,
        requires_human: bool,
        policy_id: Option<PolicyId>,
        reason: Option<String>,
    ) -> Result<CrossAgentTransaction, CrossAgentError> {
        let tx = CrossAgentTransaction {
            id: CrossAgentTxId::new(),
            source_agent_id: source,
            target_agent_id: target,
            amount,
            payment_type,
            authorized,
            authorization_method: method,
            settlement_status: settlement,
            requires_human,
            policy_id,
            reason: reason.clone(),
            created_at: Utc::now(),
        };
        let saved = self.cross_repo.save_tx(tx).await?;

        let decision = if authorized {
            AuditDecision::Allowed
        } else if requires_human {
            AuditDecision::Escalated
        } else {
            AuditDecision::Blocked
        };
        self.audit(
            Some(source),
            "cross_agent.authorize",
            "cross_agent_transaction",
            saved.id.to_string(),
            decision,
            serde_json::json!({
                "target": target,
                "amount": amount,
                "settlement_status": saved.settlement_status,
                "reason": reason,
            }),
        )
        .await;
        Ok(saved)
    }

    async fn notify_escalation(&self, tx: &CrossAgentTransaction) {
        if let Err(e) = self
            .notifier
            .notify(
                "cross_agent.escalated",
                serde_json::json!({
                    "transaction_id": tx.id,
                    "source": tx.source_agent_id,
                    "target": tx.target_agent_id,
                    "amount": tx.amount,
                }),
            )
            .await
        {
            warn!("Escalation notification failed for {}: {}", tx.id, e);
        }
    }

    async fn audit(
        &self,
        agent_id: Option<AgentId>,
        action: &str,
        resource: &str,
        resource_id: String,
        decision: AuditDecision,
        reasoning: serde_json::Value,
    ) {
        let entry = AuditLog::new(agent_id, action, resource, resource_id, decision, reasoning);
        if let Err(e) = self.audit_repo.append(entry).await {
            tracing::error!("Failed to audit {}: {}", action, e);
        }
    }
}
