use std::sync::Arc;

use crate::domain::audit::{AuditDecision, AuditLog};
use crate::domain::error::{RuleError, WalletError};
use crate::domain::repository::{AuditLogRepository, SpendRuleRepository, WalletRepository};
use crate::domain::rules::{RuleParams, SpendRule};
use crate::domain::types::{RuleId, WalletId};

/// CRUD de reglas de gasto. Los parámetros se validan al crear y al
/// actualizar; una regla con esquema inválido nunca llega al store.
pub struct ManageRulesUseCase {
    rule_repo: Arc<dyn SpendRuleRepository>,
    wallet_repo: Arc<dyn WalletRepository>,
    audit_repo: Arc<dyn AuditLogRepository>,
}

impl ManageRulesUseCase {
    pub fn new(
        rule_repo: Arc<dyn SpendRuleRepository>,
        wallet_repo: Arc<dyn WalletRepository>,
        audit_repo: Arc<dyn AuditLogRepository>,
    ) -> Self {
        Self {
            rule_repo,
            wallet_repo,
            audit_repo,
        }
    }

    #[tracing::instrument(name = "ManageRulesUseCase::create", skip(self, params))]
    pub async fn create(
        &self,
        wallet_id: WalletId,
        params: RuleParams,
        priority: i32,
    ) -> Result<SpendRule, RuleError> {
        self.wallet_repo
            .find_by_id(wallet_id)
            .await
            .map_err(|e| RuleError::RepositoryError(e.to_string()))?
            .ok_or_else(|| RuleError::InvalidParams(WalletError::NotFound(wallet_id).to_string()))?;

        let rule = SpendRule::new(wallet_id, params, priority)?;
        let saved = self.rule_repo.create(rule).await?;
        self.audit(&saved, "rule.create").await;
        Ok(saved)
    }

    #[tracing::instrument(name = "ManageRulesUseCase::update", skip(self, params))]
    pub async fn update(
        &self,
        id: RuleId,
        params: Option<RuleParams>,
        active: Option<bool>,
        priority: Option<i32>,
    ) -> Result<SpendRule, RuleError> {
        let mut rule = self
            .rule_repo
            .find_by_id(id)
            .await?
            .ok_or(RuleError::NotFound(id))?;

        if let Some(params) = params {
            params.validate()?;
            // Un cambio explícito de parámetros levanta el estrangulamiento.
            rule.params = params;
            rule.throttled = false;
        }
        if let Some(active) = active {
            rule.active = active;
        }
        if let Some(priority) = priority {
            rule.priority = priority;
        }

        let updated = self.rule_repo.update(rule).await?;
        self.audit(&updated, "rule.update").await;
        Ok(updated)
    }

    #[tracing::instrument(name = "ManageRulesUseCase::delete", skip(self))]
    pub async fn delete(&self, id: RuleId) -> Result<(), RuleError> {
        let rule = self
            .rule_repo
            .find_by_id(id)
            .await?
            .ok_or(RuleError::NotFound(id))?;
        self.rule_repo.delete(id).await?;
        self.audit(&rule, "rule.delete").await;
        Ok(())
    }

    pub async fn list(&self, wallet_id: WalletId) -> Result<Vec<SpendRule>, RuleError> {
        self.rule_repo.list_for_wallet(wallet_id).await
    }

    pub async fn find(&self, id: RuleId) -> Result<Option<SpendRule>, RuleError> {
        self.rule_repo.find_by_id(id).await
    }

    async fn audit(&self, rule: &SpendRule, action: &str) {
        let entry = AuditLog::new(
            None,
            action,
            "spend_rule",
            rule.id.to_string(),
            AuditDecision::System,
            serde_json::json!({
                "wallet_id": rule.wallet_id,
                "kind": rule.kind(),
                "active": rule.active,
                "priority": rule.priority,
            }),
        );
        if let Err(e) = self.audit_repo.append(entry).await {
            tracing::error!("Failed to audit {} for {}: {}", action, rule.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Wallet;
    use crate::domain::repository::{
        MockAuditLogRepository, MockSpendRuleRepository, MockWalletRepository,
    };
    use crate::domain::types::AgentId;
    use rust_decimal_macros::dec;

    fn wallet_repo_with_wallet() -> MockWalletRepository {
        let mut wallets = MockWalletRepository::new();
        wallets.expect_find_by_id().returning(|id| {
            let mut wallet = Wallet::new(AgentId::new(), "USD".to_string()).unwrap();
            wallet.id = id;
            Ok(Some(wallet))
        });
        wallets
    }

    #[tokio::test]
    async fn test_create_validates_params() {
        let use_case = ManageRulesUseCase::new(
            Arc::new(MockSpendRuleRepository::new()),
            Arc::new(wallet_repo_with_wallet()),
            Arc::new(MockAuditLogRepository::new()),
        );

        let result = use_case
            .create(WalletId::new(), RuleParams::DailyLimit { limit: dec!(-5) }, 0)
            .await;
        assert!(matches!(result, Err(RuleError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn test_update_params_clears_throttle() {
        let mut rules = MockSpendRuleRepository::new();
        let mut audit = MockAuditLogRepository::new();
        rules.expect_find_by_id().returning(|id| {
            let mut rule = SpendRule::new(
                WalletId::new(),
                RuleParams::DailyLimit { limit: dec!(50) },
                0,
            )
            .unwrap();
            rule.id = id;
            rule.throttled = true;
            Ok(Some(rule))
        });
        rules
            .expect_update()
            .withf(|rule| !rule.throttled && rule.params == RuleParams::DailyLimit { limit: dec!(500) })
            .times(1)
            .returning(|rule| Ok(rule));
        audit.expect_append().returning(|entry| Ok(entry));

        let use_case = ManageRulesUseCase::new(
            Arc::new(rules),
            Arc::new(MockWalletRepository::new()),
            Arc::new(audit),
        );
        let updated = use_case
            .update(
                RuleId::new(),
                Some(RuleParams::DailyLimit { limit: dec!(500) }),
                None,
                None,
            )
            .await
            .unwrap();

        assert!(!updated.throttled);
    }

    #[tokio::test]
    async fn test_delete_missing_rule_is_not_found() {
        let mut rules = MockSpendRuleRepository::new();
        rules.expect_find_by_id().returning(|_| Ok(None));

        let use_case = ManageRulesUseCase::new(
            Arc::new(rules),
            Arc::new(MockWalletRepository::new()),
            Arc::new(MockAuditLogRepository::new()),
        );
        let result = use_case.delete(RuleId::new()).await;

        assert!(matches!(result, Err(RuleError::NotFound(_))));
    }
}
