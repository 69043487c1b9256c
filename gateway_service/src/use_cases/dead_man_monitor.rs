use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::domain::audit::{AuditDecision, AuditLog};
use crate::domain::deadman::{DeadManAction, DeadManConfig, DeadManEvent, DeadManTrigger};
use crate::domain::entities::AgentStatus;
use crate::domain::error::DeadManError;
use crate::domain::gateways::NotificationGateway;
use crate::domain::repository::{
    AgentRepository, AuditLogRepository, DeadManRepository, LineageRepository,
    SpendRuleRepository, TransactionRepository,
};
use crate::domain::types::AgentId;

/// Compuerta síncrona pre-transacción: la admisión consulta al dead-man
/// switch antes de cualquier otra evaluación.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeadManGate: Send + Sync {
    async fn evaluate(
        &self,
        agent_id: AgentId,
        amount: Decimal,
        vendor: Option<String>,
    ) -> Result<(), DeadManError>;
}

/// Respuesta al heartbeat de un agente vivo.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HeartbeatAck {
    pub agent_id: AgentId,
    pub next_deadline: DateTime<Utc>,
}

/// Estado en proceso del monitor. Caché blanda: se reconstruye del event
/// log al arrancar y se repuebla con heartbeats; la ventana de
/// sub-aplicación hasta entonces es una degradación aceptada.
#[derive(Default)]
struct MonitorState {
    frozen: HashSet<AgentId>,
    heartbeats: HashMap<AgentId, DateTime<Utc>>,
    tx_times: HashMap<AgentId, VecDeque<DateTime<Utc>>>,
}

/// Monitor de vida, velocidad y anomalías de gasto por agente.
///
/// Mantiene los mapas en proceso detrás de un único mutex que jamás se
/// sostiene a través de un punto de I/O; el sweep de fondo primero toma una
/// foto del conjunto de agentes y después procesa de a uno.
pub struct DeadManMonitor {
    state: Mutex<MonitorState>,
    dead_man_repo: Arc<dyn DeadManRepository>,
    agent_repo: Arc<dyn AgentRepository>,
    transaction_repo: Arc<dyn TransactionRepository>,
    rule_repo: Arc<dyn SpendRuleRepository>,
    lineage_repo: Arc<dyn LineageRepository>,
    audit_repo: Arc<dyn AuditLogRepository>,
    notifier: Arc<dyn NotificationGateway>,
}

impl DeadManMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dead_man_repo: Arc<dyn DeadManRepository>,
        agent_repo: Arc<dyn AgentRepository>,
        transaction_repo: Arc<dyn TransactionRepository>,
        rule_repo: Arc<dyn SpendRuleRepository>,
        lineage_repo: Arc<dyn LineageRepository>,
        audit_repo: Arc<dyn AuditLogRepository>,
        notifier: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self {
            state: Mutex::new(MonitorState::default()),
            dead_man_repo,
            agent_repo,
            transaction_repo,
            rule_repo,
            lineage_repo,
            audit_repo,
            notifier,
        }
    }

    /// Reconstruye el conjunto de congelados desde los eventos sin
    /// resolver. Se llama una vez al arrancar la instancia.
    pub async fn rehydrate(&self) -> Result<usize, DeadManError> {
        let events = self.dead_man_repo.unresolved_events().await?;
        let mut state = self.state.lock().expect("dead-man state poisoned");
        for event in &events {
            if event.action_taken.blocks_admission() {
                state.frozen.insert(event.agent_id);
                for cascaded in &event.cascaded_to {
                    state.frozen.insert(*cascaded);
                }
            }
        }
        Ok(state.frozen.len())
    }

    /// Registra (o reemplaza) la configuración del agente y arranca su
    /// reloj de heartbeat.
    pub async fn register(&self, config: DeadManConfig) -> Result<DeadManConfig, DeadManError> {
        config.validate()?;
        let saved = self.dead_man_repo.upsert_config(config).await?;
        let mut state = self.state.lock().expect("dead-man state poisoned");
        state.heartbeats.insert(saved.agent_id, Utc::now());
        Ok(saved)
    }

    /// Endpoint de heartbeat. A un agente congelado se le responde con
    /// error (debe cesar toda transacción), salvo que su configuración no
    /// exija recuperación humana: ahí el heartbeat prueba vida y lo
    /// descongela solo.
    pub async fn heartbeat(&self, agent_id: AgentId) -> Result<HeartbeatAck, DeadManError> {
        let now = Utc::now();
        let frozen = {
            let state = self.state.lock().expect("dead-man state poisoned");
            state.frozen.contains(&agent_id)
        };

        let config = self
            .dead_man_repo
            .find_config(agent_id)
            .await?
            .ok_or(DeadManError::NotRegistered(agent_id))?;

        if frozen {
            if config.recovery_requires_human {
                return Err(DeadManError::Frozen(agent_id));
            }
            self.unfreeze(agent_id).await?;
        }

        let mut state = self.state.lock().expect("dead-man state poisoned");
        state.heartbeats.insert(agent_id, now);
        Ok(HeartbeatAck {
            agent_id,
            next_deadline: now + Duration::seconds(config.heartbeat_deadline_seconds()),
        })
    }

    /// Congelamiento manual pedido por el dueño: aplica la acción
    /// configurada en `on_manual_trigger`.
    pub async fn manual_trigger(&self, agent_id: AgentId) -> Result<(), DeadManError> {
        let config = self.config_or_default(agent_id).await?;
        self.trigger(
            &config,
            DeadManTrigger::Manual,
            config.on_manual_trigger,
            serde_json::json!({ "requested_by": "owner" }),
        )
        .await
    }

    /// Terminación manual: irreversible, cascada según configuración.
    pub async fn manual_terminate(&self, agent_id: AgentId) -> Result<(), DeadManError> {
        let config = self.config_or_default(agent_id).await?;
        self.trigger(
            &config,
            DeadManTrigger::Manual,
            DeadManAction::Terminate,
            serde_json::json!({ "requested_by": "owner" }),
        )
        .await
    }

    /// Recuperación por operador. Terminated nunca se recupera.
    pub async fn unfreeze(&self, agent_id: AgentId) -> Result<(), DeadManError> {
        let agent = self
            .agent_repo
            .find_by_id(agent_id)
            .await
            .map_err(|e| DeadManError::RepositoryError(e.to_string()))?
            .ok_or(DeadManError::NotRegistered(agent_id))?;
        if agent.status.is_terminal() {
            return Err(DeadManError::Terminated(agent_id));
        }

        {
            let mut state = self.state.lock().expect("dead-man state poisoned");
            state.frozen.remove(&agent_id);
        }
        self.agent_repo
            .update_status(agent_id, AgentStatus::Active)
            .await
            .map_err(|e| DeadManError::RepositoryError(e.to_string()))?;
        self.dead_man_repo.resolve_events(agent_id).await?;

        let audit = AuditLog::new(
            Some(agent_id),
            "dead_man.unfreeze",
            "agent",
            agent_id.to_string(),
            AuditDecision::System,
            serde_json::json!({ "restored_to": "ACTIVE" }),
        );
        if let Err(e) = self.audit_repo.append(audit).await {
            error!("Failed to audit dead-man recovery for {}: {}", agent_id, e);
        }
        info!("Agent {} recovered from dead-man freeze", agent_id);
        Ok(())
    }

    pub fn is_frozen(&self, agent_id: AgentId) -> bool {
        self.state
            .lock()
            .expect("dead-man state poisoned")
            .frozen
            .contains(&agent_id)
    }

    /// Barrido periódico (~10 s): dispara `on_missed_heartbeat` para cada
    /// agente cuyo silencio supera estrictamente el umbral.
    pub async fn sweep(&self) {
        let now = Utc::now();
        let configs = match self.dead_man_repo.list_configs().await {
            Ok(configs) => configs,
            Err(e) => {
                error!("Dead-man sweep could not load configs: {}", e);
                return;
            }
        };

        // Snapshot: nada de locks a través de I/O.
        let snapshot: Vec<(DeadManConfig, Option<DateTime<Utc>>, bool)> = {
            let state = self.state.lock().expect("dead-man state poisoned");
            configs
                .into_iter()
                .map(|c| {
                    let last = state.heartbeats.get(&c.agent_id).copied();
                    let frozen = state.frozen.contains(&c.agent_id);
                    (c, last, frozen)
                })
                .collect()
        };

        for (config, last_heartbeat, frozen) in snapshot {
            if frozen {
                continue;
            }
            let Some(last) = last_heartbeat else {
                // Nunca reportó desde el arranque de esta instancia; el
                // reloj corre desde el próximo heartbeat o registro.
                continue;
            };
            let silence = (now - last).num_seconds();
            if silence > config.heartbeat_deadline_seconds() {
                warn!(
                    "Agent {} missed heartbeats for {}s (deadline {}s)",
                    config.agent_id,
                    silence,
                    config.heartbeat_deadline_seconds()
                );
                let details = serde_json::json!({
                    "silence_seconds": silence,
                    "deadline_seconds": config.heartbeat_deadline_seconds(),
                });
                if let Err(e) = self
                    .trigger(
                        &config,
                        DeadManTrigger::MissedHeartbeat,
                        config.on_missed_heartbeat,
                        details,
                    )
                    .await
                {
                    error!("Dead-man trigger failed for {}: {}", config.agent_id, e);
                }
            }
        }
    }

    async fn config_or_default(&self, agent_id: AgentId) -> Result<DeadManConfig, DeadManError> {
        Ok(self
            .dead_man_repo
            .find_config(agent_id)
            .await?
            .unwrap_or_else(|| DeadManConfig::new(agent_id)))
    }

    /// Aplica la escalera de acciones y registra el evento.
    async fn trigger(
        &self,
        config: &DeadManConfig,
        trigger_type: DeadManTrigger,
        action: DeadManAction,
        details: serde_json::Value,
    ) -> Result<(), DeadManError> {
        let agent_id = config.agent_id;
        let mut cascaded_to = Vec::new();

        match action {
            DeadManAction::Alert => {}
            DeadManAction::Throttle => {
                let rules = self
                    .rule_repo
                    .list_active_daily_for_agent(agent_id)
                    .await
                    .map_err(|e| DeadManError::RepositoryError(e.to_string()))?;
                for mut rule in rules {
                    if let Some(tightened) = rule.params.throttled_copy() {
                        rule.params = tightened;
                        rule.throttled = true;
                        self.rule_repo
                            .update(rule)
                            .await
                            .map_err(|e| DeadManError::RepositoryError(e.to_string()))?;
                    }
                }
            }
            DeadManAction::Freeze | DeadManAction::Terminate => {
                let status = if action == DeadManAction::Terminate {
                    AgentStatus::Terminated
                } else {
                    AgentStatus::Frozen
                };

                let mut targets = vec![agent_id];
                if config.cascade_to_children {
                    match self.lineage_repo.descendants(agent_id).await {
                        Ok(descendants) => {
                            for lineage in descendants {
                                cascaded_to.push(lineage.agent_id);
                                targets.push(lineage.agent_id);
                            }
                        }
                        Err(e) => {
                            // Sin linaje registrado no hay nada que cascadear.
                            warn!("No lineage cascade for {}: {}", agent_id, e);
                        }
                    }
                }

                {
                    let mut state = self.state.lock().expect("dead-man state poisoned");
                    for target in &targets {
                        state.frozen.insert(*target);
                    }
                }
                for target in &targets {
                    self.agent_repo
                        .update_status(*target, status)
                        .await
                        .map_err(|e| DeadManError::RepositoryError(e.to_string()))?;
                    if action == DeadManAction::Terminate {
                        if let Err(e) = self.lineage_repo.update_status(*target, status).await {
                            warn!("Lineage status update failed for {}: {}", target, e);
                        }
                    }
                }
            }
        }

        let event = DeadManEvent::new(agent_id, trigger_type, action, details.clone(), cascaded_to);
        self.dead_man_repo.record_event(event).await?;

        let audit = AuditLog::new(
            Some(agent_id),
            "dead_man.trigger",
            "agent",
            agent_id.to_string(),
            AuditDecision::System,
            serde_json::json!({
                "trigger": trigger_type,
                "action": action,
                "details": details,
            }),
        );
        if let Err(e) = self.audit_repo.append(audit).await {
            error!("Failed to audit dead-man trigger for {}: {}", agent_id, e);
        }

        // Best-effort: el hook externo jamás bloquea.
        if let Err(e) = self
            .notifier
            .notify(
                "dead_man.triggered",
                serde_json::json!({
                    "agent_id": agent_id,
                    "trigger": trigger_type,
                    "action": action,
                }),
            )
            .await
        {
            warn!("Dead-man notification failed for {}: {}", agent_id, e);
        }
        Ok(())
    }

    /// Media del gasto en hasta 7 ventanas previas no vacías del mismo
    /// ancho. Devuelve None si no hay historial previo.
    fn window_baseline(
        samples: &[(DateTime<Utc>, Decimal)],
        now: DateTime<Utc>,
        width: Duration,
    ) -> Option<Decimal> {
        let mut sums = Vec::new();
        for k in 1..=7 {
            let to = now - width * k;
            let from = to - width;
            let sum: Decimal = samples
                .iter()
                .filter(|(at, _)| *at >= from && *at < to)
                .map(|(_, amount)| *amount)
                .sum();
            if sum > Decimal::ZERO {
                sums.push(sum);
            }
        }
        if sums.is_empty() {
            return None;
        }
        let count = Decimal::from(sums.len() as i64);
        Some(sums.iter().copied().sum::<Decimal>() / count)
    }
}

#[async_trait]
impl DeadManGate for DeadManMonitor {
    /// Compuerta de admisión: congelado, velocidad, diversidad de
    /// destinatarios y anomalías de gasto/conteo, en ese orden.
    async fn evaluate(
        &self,
        agent_id: AgentId,
        amount: Decimal,
        vendor: Option<String>,
    ) -> Result<(), DeadManError> {
        let now = Utc::now();

        // 1. Congelado: bloqueo inmediato.
        // 2. Velocidad: timestamps en proceso de los últimos 60 s.
        let recent_count = {
            let mut state = self.state.lock().expect("dead-man state poisoned");
            if state.frozen.contains(&agent_id) {
                return Err(DeadManError::Frozen(agent_id));
            }
            let times = state.tx_times.entry(agent_id).or_default();
            let hour_ago = now - Duration::hours(1);
            while times.front().is_some_and(|t| *t < hour_ago) {
                times.pop_front();
            }
            let minute_ago = now - Duration::seconds(60);
            times.iter().filter(|t| **t >= minute_ago).count() as i64
        };

        let Some(config) = self.dead_man_repo.find_config(agent_id).await? else {
            // Agente sin configuración: el monitor no lo gobierna.
            return Ok(());
        };

        if recent_count >= config.max_tx_per_minute {
            self.trigger(
                &config,
                DeadManTrigger::VelocityViolation,
                config.on_anomaly,
                serde_json::json!({
                    "tx_in_last_minute": recent_count,
                    "max_tx_per_minute": config.max_tx_per_minute,
                }),
            )
            .await?;
            return Err(DeadManError::Frozen(agent_id));
        }

        // 3. Diversidad de destinatarios: historial del store + el actual.
        if let Some(vendor) = vendor {
            let mut vendors: HashSet<String> = self
                .transaction_repo
                .recipient_ids_for_agent_since(agent_id, now - Duration::hours(1))
                .await
                .map_err(|e| DeadManError::RepositoryError(e.to_string()))?
                .into_iter()
                .collect();
            vendors.insert(vendor);
            if vendors.len() as i64 > config.max_unique_vendors_per_hour {
                self.trigger(
                    &config,
                    DeadManTrigger::VendorDiversity,
                    config.on_anomaly,
                    serde_json::json!({
                        "unique_vendors_last_hour": vendors.len(),
                        "max_unique_vendors_per_hour": config.max_unique_vendors_per_hour,
                    }),
                )
                .await?;
                return Err(DeadManError::Frozen(agent_id));
            }
        }

        // 4. Anomalías de gasto y de conteo contra la línea base de hasta
        //    7 ventanas previas no vacías.
        let width = Duration::minutes(config.anomaly_window_minutes);
        let samples = self
            .transaction_repo
            .completed_amounts_for_agent_since(agent_id, now - width * 8)
            .await
            .map_err(|e| DeadManError::RepositoryError(e.to_string()))?;

        let window_start = now - width;
        let current_spend: Decimal = samples
            .iter()
            .filter(|(at, _)| *at >= window_start)
            .map(|(_, amount)| *amount)
            .sum::<Decimal>()
            + amount;

        if let Some(baseline) = Self::window_baseline(&samples, now, width) {
            if current_spend > baseline * config.anomaly_spend_multiplier {
                self.trigger(
                    &config,
                    DeadManTrigger::SpendAnomaly,
                    config.on_anomaly,
                    serde_json::json!({
                        "current_window_spend": current_spend,
                        "baseline": baseline,
                        "multiplier": config.anomaly_spend_multiplier,
                    }),
                )
                .await?;
                if config.on_anomaly.blocks_admission() {
                    return Err(DeadManError::Frozen(agent_id));
                }
            }
        }

        let current_count = Decimal::from(
            samples.iter().filter(|(at, _)| *at >= window_start).count() as i64 + 1,
        );
        let mut count_sums = Vec::new();
        for k in 1..=7 {
            let to = now - width * k;
            let from = to - width;
            let count = samples.iter().filter(|(at, _)| *at >= from && *at < to).count();
            if count > 0 {
                count_sums.push(Decimal::from(count as i64));
            }
        }
        if !count_sums.is_empty() {
            let baseline =
                count_sums.iter().copied().sum::<Decimal>() / Decimal::from(count_sums.len() as i64);
            if current_count > baseline * config.anomaly_tx_count_multiplier {
                self.trigger(
                    &config,
                    DeadManTrigger::TxCountAnomaly,
                    config.on_anomaly,
                    serde_json::json!({
                        "current_window_count": current_count,
                        "baseline": baseline,
                        "multiplier": config.anomaly_tx_count_multiplier,
                    }),
                )
                .await?;
                if config.on_anomaly.blocks_admission() {
                    return Err(DeadManError::Frozen(agent_id));
                }
            }
        }

        // 5. Admitido: registrar el timestamp.
        let mut state = self.state.lock().expect("dead-man state poisoned");
        state.tx_times.entry(agent_id).or_default().push_back(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gateways::MockNotificationGateway;
    use crate::domain::repository::{
        MockAgentRepository, MockAuditLogRepository, MockDeadManRepository,
        MockLineageRepository, MockSpendRuleRepository, MockTransactionRepository,
    };
    use mockall::predicate::*;
    use rust_decimal_macros::dec;

    struct Mocks {
        dead_man: MockDeadManRepository,
        agents: MockAgentRepository,
        transactions: MockTransactionRepository,
        rules: MockSpendRuleRepository,
        lineage: MockLineageRepository,
        audit: MockAuditLogRepository,
        notifier: MockNotificationGateway,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                dead_man: MockDeadManRepository::new(),
                agents: MockAgentRepository::new(),
                transactions: MockTransactionRepository::new(),
                rules: MockSpendRuleRepository::new(),
                lineage: MockLineageRepository::new(),
                audit: MockAuditLogRepository::new(),
                notifier: MockNotificationGateway::new(),
            }
        }

        fn build(self) -> DeadManMonitor {
            DeadManMonitor::new(
                Arc::new(self.dead_man),
                Arc::new(self.agents),
                Arc::new(self.transactions),
                Arc::new(self.rules),
                Arc::new(self.lineage),
                Arc::new(self.audit),
                Arc::new(self.notifier),
            )
        }
    }

    fn permissive_config(agent_id: AgentId) -> DeadManConfig {
        let mut config = DeadManConfig::new(agent_id);
        config.max_tx_per_minute = 3;
        config.cascade_to_children = false;
        config
    }

    fn expect_trigger_plumbing(mocks: &mut Mocks) {
        mocks
            .dead_man
            .expect_record_event()
            .returning(|event| Ok(event));
        mocks.audit.expect_append().returning(|entry| Ok(entry));
        mocks.notifier.expect_notify().returning(|_, _| Ok(()));
    }

    #[tokio::test]
    async fn test_velocity_violation_freezes_on_fourth_admission() {
        // Arrange: maxTxPerMinute = 3, freeze on anomaly.
        let agent_id = AgentId::new();
        let mut mocks = Mocks::new();

        let config = permissive_config(agent_id);
        mocks
            .dead_man
            .expect_find_config()
            .returning(move |_| Ok(Some(config.clone())));
        mocks
            .transactions
            .expect_recipient_ids_for_agent_since()
            .returning(|_, _| Ok(vec![]));
        mocks
            .transactions
            .expect_completed_amounts_for_agent_since()
            .returning(|_, _| Ok(vec![]));
        mocks
            .agents
            .expect_update_status()
            .with(eq(agent_id), eq(AgentStatus::Frozen))
            .times(1)
            .returning(|_, _| Ok(()));
        expect_trigger_plumbing(&mut mocks);

        let monitor = mocks.build();

        // Act: three admissions pass, the fourth trips the velocity cap.
        for _ in 0..3 {
            monitor
                .evaluate(agent_id, dec!(10), Some("vendor-a".to_string()))
                .await
                .expect("within velocity budget");
        }
        let result = monitor.evaluate(agent_id, dec!(10), Some("vendor-a".to_string())).await;

        // Assert
        assert!(matches!(result, Err(DeadManError::Frozen(_))));
        assert!(monitor.is_frozen(agent_id));
    }

    #[tokio::test]
    async fn test_frozen_agent_blocked_before_any_io() {
        let agent_id = AgentId::new();
        let mut mocks = Mocks::new();
        mocks
            .dead_man
            .expect_unresolved_events()
            .returning(move || {
                Ok(vec![DeadManEvent::new(
                    agent_id,
                    DeadManTrigger::Manual,
                    DeadManAction::Freeze,
                    serde_json::Value::Null,
                    vec![],
                )])
            });

        let monitor = mocks.build();
        monitor.rehydrate().await.unwrap();

        let result = monitor.evaluate(agent_id, dec!(1), None).await;
        assert!(matches!(result, Err(DeadManError::Frozen(_))));
    }

    #[tokio::test]
    async fn test_vendor_diversity_joins_store_history() {
        let agent_id = AgentId::new();
        let mut mocks = Mocks::new();

        let mut config = permissive_config(agent_id);
        config.max_unique_vendors_per_hour = 2;
        mocks
            .dead_man
            .expect_find_config()
            .returning(move |_| Ok(Some(config.clone())));
        // Two vendors already seen this hour; a third distinct one exceeds
        // the cap.
        mocks
            .transactions
            .expect_recipient_ids_for_agent_since()
            .returning(|_, _| Ok(vec!["vendor-a".to_string(), "vendor-b".to_string()]));
        mocks
            .agents
            .expect_update_status()
            .times(1)
            .returning(|_, _| Ok(()));
        expect_trigger_plumbing(&mut mocks);

        let monitor = mocks.build();
        let result = monitor.evaluate(agent_id, dec!(5), Some("vendor-c".to_string())).await;
        assert!(matches!(result, Err(DeadManError::Frozen(_))));
    }

    #[tokio::test]
    async fn test_spend_anomaly_blocks_only_when_action_freezes() {
        let agent_id = AgentId::new();
        let now = Utc::now();

        // Baseline windows with ~10 each; current window spend of 100 is a
        // 10x spike over the mean.
        let history: Vec<(DateTime<Utc>, Decimal)> = (1..=3)
            .map(|k| (now - Duration::minutes(60 * k + 5), dec!(10)))
            .collect();

        for (action, should_block) in [(DeadManAction::Alert, false), (DeadManAction::Freeze, true)]
        {
            let mut mocks = Mocks::new();
            let mut config = permissive_config(agent_id);
            config.on_anomaly = action;
            mocks
                .dead_man
                .expect_find_config()
                .returning(move |_| Ok(Some(config.clone())));
            let history = history.clone();
            mocks
                .transactions
                .expect_completed_amounts_for_agent_since()
                .returning(move |_, _| Ok(history.clone()));
            mocks
                .transactions
                .expect_recipient_ids_for_agent_since()
                .returning(|_, _| Ok(vec![]));
            if should_block {
                mocks
                    .agents
                    .expect_update_status()
                    .returning(|_, _| Ok(()));
            }
            expect_trigger_plumbing(&mut mocks);

            let monitor = mocks.build();
            let result = monitor.evaluate(agent_id, dec!(100), None).await;
            assert_eq!(result.is_err(), should_block, "action {:?}", action);
        }
    }

    #[tokio::test]
    async fn test_terminated_agent_cannot_be_unfrozen() {
        let agent_id = AgentId::new();
        let mut mocks = Mocks::new();
        mocks.agents.expect_find_by_id().returning(move |id| {
            let mut agent =
                crate::domain::entities::Agent::new(crate::domain::types::OwnerId::new(), "a".to_string())
                    .unwrap();
            agent.id = id;
            agent.status = AgentStatus::Terminated;
            Ok(Some(agent))
        });

        let monitor = mocks.build();
        let result = monitor.unfreeze(agent_id).await;
        assert!(matches!(result, Err(DeadManError::Terminated(_))));
    }

    #[tokio::test]
    async fn test_freeze_cascades_to_descendants() {
        let agent_id = AgentId::new();
        let child_a = AgentId::new();
        let child_b = AgentId::new();

        let mut mocks = Mocks::new();
        let mut config = permissive_config(agent_id);
        config.cascade_to_children = true;
        let config_clone = config.clone();
        mocks
            .dead_man
            .expect_find_config()
            .returning(move |_| Ok(Some(config_clone.clone())));
        mocks.lineage.expect_descendants().returning(move |_| {
            let parent = crate::domain::lineage::AgentLineage::root(agent_id);
            Ok(vec![parent.child(child_a, Default::default()), {
                let mut l = parent.child(child_b, Default::default());
                l.depth = 2;
                l
            }])
        });
        mocks
            .agents
            .expect_update_status()
            .times(3)
            .returning(|_, _| Ok(()));
        mocks
            .dead_man
            .expect_record_event()
            .withf(move |event| event.cascaded_to == vec![child_a, child_b])
            .times(1)
            .returning(|event| Ok(event));
        mocks.audit.expect_append().returning(|entry| Ok(entry));
        mocks.notifier.expect_notify().returning(|_, _| Ok(()));

        let monitor = mocks.build();
        monitor.manual_trigger(agent_id).await.unwrap();

        assert!(monitor.is_frozen(agent_id));
        assert!(monitor.is_frozen(child_a));
        assert!(monitor.is_frozen(child_b));
    }

    #[tokio::test]
    async fn test_heartbeat_refreshes_and_reports_deadline() {
        let agent_id = AgentId::new();
        let mut mocks = Mocks::new();
        let config = permissive_config(agent_id);
        let deadline = config.heartbeat_deadline_seconds();
        mocks
            .dead_man
            .expect_find_config()
            .returning(move |_| Ok(Some(config.clone())));

        let monitor = mocks.build();
        let before = Utc::now();
        let ack = monitor.heartbeat(agent_id).await.unwrap();
        assert!(ack.next_deadline >= before + Duration::seconds(deadline));
    }

    #[tokio::test]
    async fn test_heartbeat_auto_recovers_when_human_not_required() {
        let agent_id = AgentId::new();
        let mut mocks = Mocks::new();

        let mut config = permissive_config(agent_id);
        config.recovery_requires_human = false;
        mocks
            .dead_man
            .expect_find_config()
            .returning(move |_| Ok(Some(config.clone())));
        mocks.dead_man.expect_unresolved_events().returning(move || {
            Ok(vec![DeadManEvent::new(
                agent_id,
                DeadManTrigger::MissedHeartbeat,
                DeadManAction::Freeze,
                serde_json::Value::Null,
                vec![],
            )])
        });
        mocks.agents.expect_find_by_id().returning(move |id| {
            let mut agent = crate::domain::entities::Agent::new(
                crate::domain::types::OwnerId::new(),
                "worker".to_string(),
            )
            .unwrap();
            agent.id = id;
            agent.status = AgentStatus::Frozen;
            Ok(Some(agent))
        });
        mocks
            .agents
            .expect_update_status()
            .with(eq(agent_id), eq(AgentStatus::Active))
            .times(1)
            .returning(|_, _| Ok(()));
        mocks.dead_man.expect_resolve_events().returning(|_| Ok(1));
        mocks.audit.expect_append().returning(|entry| Ok(entry));

        let monitor = mocks.build();
        monitor.rehydrate().await.unwrap();
        assert!(monitor.is_frozen(agent_id));

        // The heartbeat itself proves liveness and lifts the freeze.
        let ack = monitor.heartbeat(agent_id).await.unwrap();
        assert_eq!(ack.agent_id, agent_id);
        assert!(!monitor.is_frozen(agent_id));
    }

    #[tokio::test]
    async fn test_throttle_tightens_daily_limits() {
        use crate::domain::rules::{RuleParams, SpendRule};
        use crate::domain::types::WalletId;

        let agent_id = AgentId::new();
        let mut mocks = Mocks::new();
        let mut config = permissive_config(agent_id);
        config.on_manual_trigger = DeadManAction::Throttle;
        mocks
            .dead_man
            .expect_find_config()
            .returning(move |_| Ok(Some(config.clone())));
        mocks.rules.expect_list_active_daily_for_agent().returning(|_| {
            Ok(vec![SpendRule::new(
                WalletId::new(),
                RuleParams::DailyLimit { limit: dec!(500) },
                0,
            )
            .unwrap()])
        });
        mocks
            .rules
            .expect_update()
            .withf(|rule| {
                rule.throttled && rule.params == RuleParams::DailyLimit { limit: dec!(50.0) }
            })
            .times(1)
            .returning(|rule| Ok(rule));
        expect_trigger_plumbing(&mut mocks);

        let monitor = mocks.build();
        monitor.manual_trigger(agent_id).await.unwrap();
        assert!(!monitor.is_frozen(agent_id));
    }
}
