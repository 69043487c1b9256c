use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::types::{AgentId, EventId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audit_decision", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditDecision {
    Allowed,
    Blocked,
    Escalated,
    System,
}

/// Modelo de Entidad: AuditLog.
/// Registro append-only: cada decisión de admisión y cada transición de
/// estado produce exactamente una entrada. Las entradas nunca se actualizan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: EventId,
    pub agent_id: Option<AgentId>,
    pub action: String,
    pub resource: String,
    pub resource_id: String,
    pub decision: AuditDecision,
    pub reasoning: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    pub fn new(
        agent_id: Option<AgentId>,
        action: &str,
        resource: &str,
        resource_id: String,
        decision: AuditDecision,
        reasoning: serde_json::Value,
    ) -> Self {
        Self {
            id: EventId::new(),
            agent_id,
            action: action.to_string(),
            resource: resource.to_string(),
            resource_id,
            decision,
            reasoning,
            created_at: Utc::now(),
        }
    }
}

/// Conteos agregados para el resumen de auditoría de un dueño.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total: i64,
    pub allowed: i64,
    pub blocked: i64,
    pub escalated: i64,
    pub system: i64,
}
