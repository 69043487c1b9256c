use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::error::DeadManError;
use crate::domain::types::{AgentId, EventId};

/// Escalera de acciones del dead-man switch, de menor a mayor severidad.
/// El orden derivado se usa para comparar severidad (alert < throttle <
/// freeze < terminate).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "dead_man_action", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadManAction {
    Alert,
    Throttle,
    Freeze,
    Terminate,
}

impl DeadManAction {
    /// Solo freeze y terminate cortan la admisión en curso.
    pub fn blocks_admission(&self) -> bool {
        matches!(self, DeadManAction::Freeze | DeadManAction::Terminate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "dead_man_trigger", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadManTrigger {
    MissedHeartbeat,
    VelocityViolation,
    VendorDiversity,
    SpendAnomaly,
    TxCountAnomaly,
    Manual,
}

/// Configuración por agente del monitor de vida/anomalías.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadManConfig {
    pub agent_id: AgentId,
    pub heartbeat_interval_seconds: i64,
    pub missed_heartbeat_threshold: i64,
    pub anomaly_window_minutes: i64,
    pub anomaly_spend_multiplier: Decimal,
    pub anomaly_tx_count_multiplier: Decimal,
    pub max_tx_per_minute: i64,
    pub max_unique_vendors_per_hour: i64,
    pub on_anomaly: DeadManAction,
    pub on_missed_heartbeat: DeadManAction,
    pub on_manual_trigger: DeadManAction,
    pub cascade_to_children: bool,
    pub recovery_requires_human: bool,
    pub created_at: DateTime<Utc>,
}

impl DeadManConfig {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            heartbeat_interval_seconds: 60,
            missed_heartbeat_threshold: 3,
            anomaly_window_minutes: 60,
            anomaly_spend_multiplier: Decimal::from(3),
            anomaly_tx_count_multiplier: Decimal::from(5),
            max_tx_per_minute: 10,
            max_unique_vendors_per_hour: 20,
            on_anomaly: DeadManAction::Freeze,
            on_missed_heartbeat: DeadManAction::Alert,
            on_manual_trigger: DeadManAction::Freeze,
            cascade_to_children: true,
            recovery_requires_human: true,
            created_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<(), DeadManError> {
        if self.heartbeat_interval_seconds <= 0
            || self.missed_heartbeat_threshold <= 0
            || self.anomaly_window_minutes <= 0
            || self.max_tx_per_minute <= 0
            || self.max_unique_vendors_per_hour <= 0
        {
            return Err(DeadManError::InvalidConfig(
                "intervals, thresholds and caps must be positive".to_string(),
            ));
        }
        if self.anomaly_spend_multiplier <= Decimal::ZERO
            || self.anomaly_tx_count_multiplier <= Decimal::ZERO
        {
            return Err(DeadManError::InvalidConfig(
                "anomaly multipliers must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Plazo máximo sin heartbeat antes de disparar `on_missed_heartbeat`.
    /// Un silencio exactamente igual al umbral todavía no dispara.
    pub fn heartbeat_deadline_seconds(&self) -> i64 {
        self.heartbeat_interval_seconds * self.missed_heartbeat_threshold
    }
}

/// Evento append-only del dead-man switch. `cascaded_to` lista los agentes
/// congelados/terminados como consecuencia.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadManEvent {
    pub id: EventId,
    pub agent_id: AgentId,
    pub trigger_type: DeadManTrigger,
    pub action_taken: DeadManAction,
    pub details: serde_json::Value,
    pub cascaded_to: Vec<AgentId>,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

impl DeadManEvent {
    pub fn new(
        agent_id: AgentId,
        trigger_type: DeadManTrigger,
        action_taken: DeadManAction,
        details: serde_json::Value,
        cascaded_to: Vec<AgentId>,
    ) -> Self {
        Self {
            id: EventId::new(),
            agent_id,
            trigger_type,
            action_taken,
            details,
            cascaded_to,
            resolved: false,
            created_at: Utc::now(),
        }
    }
}
