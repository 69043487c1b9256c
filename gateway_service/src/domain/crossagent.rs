use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::error::CrossAgentError;
use crate::domain::types::{AgentId, CrossAgentTxId, GroupId, OwnerId, PolicyId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "settlement_mode", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementMode {
    Immediate,
    Batched,
    Escrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "settlement_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Pending,
    Settled,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "authorization_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationMethod {
    Auto,
    Escalated,
    HumanApproved,
}

/// A qué objetivo aplica una política: par exacto, grupo, o comodín para
/// cualquier contraparte del agente fuente.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyTarget {
    Exact(AgentId),
    Group(GroupId),
    Wildcard,
}

/// Modelo de Entidad: CrossAgentPolicy.
/// Reglas por par ordenado (o grupo, o comodín) que gobiernan pagos entre
/// agentes. Exactamente una forma de objetivo está poblada.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossAgentPolicy {
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

impl CrossAgentPolicy {
    pub fn validate(&self) -> Result<(), CrossAgentError> {
        if self.target_agent_id.is_some() && self.target_agent_group.is_some() {
            return Err(CrossAgentError::InvalidData(
                "a policy targets an agent, a group, or neither (wildcard) - not both".to_string(),
            ));
        }
        if self.allowed_payment_types.is_empty() {
            return Err(CrossAgentError::InvalidData(
                "allowed_payment_types cannot be empty".to_string(),
            ));
        }
        if self.max_per_transaction <= Decimal::ZERO
            || self.max_daily_to_target <= Decimal::ZERO
            || self.max_daily_all_agents <= Decimal::ZERO
        {
            return Err(CrossAgentError::InvalidData(
                "limits must be positive".to_string(),
            ));
        }
        if let Some(above) = self.require_human_approval_above {
            if above <= Decimal::ZERO {
                return Err(CrossAgentError::InvalidData(
                    "require_human_approval_above must be positive".to_string(),
                ));
            }
        }
        if self.min_counterparty_trust_score < Decimal::ZERO
            || self.min_counterparty_trust_score > Decimal::ONE
        {
            return Err(CrossAgentError::InvalidData(
                "min_counterparty_trust_score must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    pub fn target(&self) -> PolicyTarget {
        match (self.target_agent_id, self.target_agent_group) {
            (Some(agent), _) => PolicyTarget::Exact(agent),
            (None, Some(group)) => PolicyTarget::Group(group),
            (None, None) => PolicyTarget::Wildcard,
        }
    }

    /// Orden de especificidad para la resolución: exacto > grupo > comodín.
    pub fn specificity(&self) -> u8 {
        match self.target() {
            PolicyTarget::Exact(_) => 2,
            PolicyTarget::Group(_) => 1,
            PolicyTarget::Wildcard => 0,
        }
    }

    /// Controles de la política contra el candidato y los agregados de 24 h.
    /// `trust_score` viene como `None` cuando la contraparte no tiene
    /// historial todavía; en ese caso el umbral de confianza no aplica.
    pub fn check(
        &self,
        amount: Decimal,
        payment_type: &str,
        daily_to_target: Decimal,
        daily_all_agents: Decimal,
        trust_score: Option<Decimal>,
    ) -> Result<(), CrossAgentError> {
        if !self
            .allowed_payment_types
            .iter()
            .any(|t| t == payment_type)
        {
            return Err(CrossAgentError::Rejected(format!(
                "payment type '{}' not allowed by policy",
                payment_type
            )));
        }
        if amount > self.max_per_transaction {
            return Err(CrossAgentError::Rejected(format!(
                "amount {} exceeds per-transaction limit {}",
                amount, self.max_per_transaction
            )));
        }
        if daily_to_target + amount > self.max_daily_to_target {
            return Err(CrossAgentError::Rejected(format!(
                "daily total to target would reach {} (limit {})",
                daily_to_target + amount,
                self.max_daily_to_target
            )));
        }
        if daily_all_agents + amount > self.max_daily_all_agents {
            return Err(CrossAgentError::Rejected(format!(
                "daily total across all agents would reach {} (limit {})",
                daily_all_agents + amount,
                self.max_daily_all_agents
            )));
        }
        if self.min_counterparty_trust_score > Decimal::ZERO {
            if let Some(score) = trust_score {
                if score < self.min_counterparty_trust_score {
                    return Err(CrossAgentError::Rejected(format!(
                        "counterparty trust score {} below minimum {}",
                        score, self.min_counterparty_trust_score
                    )));
                }
            }
        }
        Ok(())
    }

    /// Montos por encima de este umbral se escalan a aprobación humana.
    pub fn needs_human(&self, amount: Decimal) -> bool {
        matches!(self.require_human_approval_above, Some(above) if amount > above)
    }
}

/// Elige la política más específica entre las habilitadas que cubren
/// (source, target). `group_ids` son los grupos a los que pertenece el
/// target.
pub fn resolve_policy<'a>(
    policies: &'a [CrossAgentPolicy],
    target: AgentId,
    group_ids: &[GroupId],
) -> Option<&'a CrossAgentPolicy> {
    policies
        .iter()
        .filter(|p| p.enabled)
        .filter(|p| match p.target() {
            PolicyTarget::Exact(agent) => agent == target,
            PolicyTarget::Group(group) => group_ids.contains(&group),
            PolicyTarget::Wildcard => true,
        })
        .max_by_key(|p| p.specificity())
}

/// Modelo de Entidad: CrossAgentTransaction.
/// Si `requires_human` y no está autorizada, queda retenida hasta una
/// aprobación explícita del dueño.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossAgentTransaction {
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn policy(target: Option<AgentId>, group: Option<GroupId>) -> CrossAgentPolicy {
        CrossAgentPolicy {
            id: PolicyId::new(),
            owner_id: OwnerId::new(),
            source_agent_id: AgentId::new(),
            target_agent_id: target,
            target_agent_group: group,
            allowed_payment_types: vec!["service_fee".to_string()],
            max_per_transaction: dec!(100),
            max_daily_to_target: dec!(300),
            max_daily_all_agents: dec!(1000),
            require_human_approval_above: Some(dec!(80)),
            require_mutual_policy: false,
            settlement_mode: SettlementMode::Immediate,
            min_counterparty_trust_score: Decimal::ZERO,
            enabled: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_exact_beats_group_beats_wildcard() {
        let target = AgentId::new();
        let group = GroupId::new();

        let exact = policy(Some(target), None);
        let grouped = policy(None, Some(group));
        let wildcard = policy(None, None);

        let policies = vec![wildcard.clone(), grouped.clone(), exact.clone()];
        let resolved = resolve_policy(&policies, target, &[group]).unwrap();
        assert_eq!(resolved.id, exact.id);

        let policies = vec![wildcard.clone(), grouped.clone()];
        let resolved = resolve_policy(&policies, target, &[group]).unwrap();
        assert_eq!(resolved.id, grouped.id);

        let policies = vec![wildcard.clone()];
        let resolved = resolve_policy(&policies, target, &[]).unwrap();
        assert_eq!(resolved.id, wildcard.id);
    }

    #[test]
    fn test_disabled_policies_are_ignored() {
        let target = AgentId::new();
        let mut exact = policy(Some(target), None);
        exact.enabled = false;

        assert!(resolve_policy(&[exact], target, &[]).is_none());
    }

    #[test]
    fn test_check_enforces_payment_type_and_limits() {
        let p = policy(None, None);

        assert!(p
            .check(dec!(50), "service_fee", dec!(0), dec!(0), None)
            .is_ok());
        assert!(p
            .check(dec!(50), "data_purchase", dec!(0), dec!(0), None)
            .is_err());
        assert!(p
            .check(dec!(101), "service_fee", dec!(0), dec!(0), None)
            .is_err());
        // Daily-to-target aggregation: 280 + 50 > 300.
        assert!(p
            .check(dec!(50), "service_fee", dec!(280), dec!(0), None)
            .is_err());
        // Global daily aggregation: 960 + 50 > 1000.
        assert!(p
            .check(dec!(50), "service_fee", dec!(0), dec!(960), None)
            .is_err());
    }

    #[test]
    fn test_trust_score_gate() {
        let mut p = policy(None, None);
        p.min_counterparty_trust_score = dec!(0.8);

        assert!(p
            .check(dec!(10), "service_fee", dec!(0), dec!(0), Some(dec!(0.9)))
            .is_ok());
        assert!(p
            .check(dec!(10), "service_fee", dec!(0), dec!(0), Some(dec!(0.5)))
            .is_err());
        // A counterparty with no history yet is not blocked by the gate.
        assert!(p
            .check(dec!(10), "service_fee", dec!(0), dec!(0), None)
            .is_ok());
    }

    #[test]
    fn test_needs_human_above_threshold() {
        let p = policy(None, None);
        assert!(!p.needs_human(dec!(80)));
        assert!(p.needs_human(dec!(80.01)));
    }

    #[test]
    fn test_validate_rejects_double_target() {
        let p = policy(Some(AgentId::new()), Some(GroupId::new()));
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_validate_trust_score_range() {
        let mut p = policy(None, None);
        p.min_counterparty_trust_score = dec!(1.2);
        assert!(p.validate().is_err());
    }
}
