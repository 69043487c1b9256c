use axum::{
    extract::{Path, State},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::auth::AuthPrincipal;
use crate::api::error::ApiError;
use crate::api::http_routes::AppState;
use crate::api::response::ApiResponse;
use crate::domain::deadman::{DeadManAction, DeadManConfig};
use crate::domain::error::DeadManError;
use crate::domain::types::AgentId;

#[derive(Deserialize)]
pub struct RegisterDeadManRequest {
    pub heartbeat_interval_seconds: Option<i64>,
    pub missed_heartbeat_threshold: Option<i64>,
    pub anomaly_window_minutes: Option<i64>,
    pub anomaly_spend_multiplier: Option<Decimal>,
    pub anomaly_tx_count_multiplier: Option<Decimal>,
    pub max_tx_per_minute: Option<i64>,
    pub max_unique_vendors_per_hour: Option<i64>,
    pub on_anomaly: Option<DeadManAction>,
    pub on_missed_heartbeat: Option<DeadManAction>,
    pub on_manual_trigger: Option<DeadManAction>,
    pub cascade_to_children: Option<bool>,
    pub recovery_requires_human: Option<bool>,
}

impl RegisterDeadManRequest {
    fn into_config(self, agent_id: AgentId) -> DeadManConfig {
        let mut config = DeadManConfig::new(agent_id);
        if let Some(v) = self.heartbeat_interval_seconds {
            config.heartbeat_interval_seconds = v;
        }
        if let Some(v) = self.missed_heartbeat_threshold {
            config.missed_heartbeat_threshold = v;
        }
        if let Some(v) = self.anomaly_window_minutes {
            config.anomaly_window_minutes = v;
        }
        if let Some(v) = self.anomaly_spend_multiplier {
            config.anomaly_spend_multiplier = v;
        }
        if let Some(v) = self.anomaly_tx_count_multiplier {
            config.anomaly_tx_count_multiplier = v;
        }
        if let Some(v) = self.max_tx_per_minute {
            config.max_tx_per_minute = v;
        }
        if let Some(v) = self.max_unique_vendors_per_hour {
            config.max_unique_vendors_per_hour = v;
        }
        if let Some(v) = self.on_anomaly {
            config.on_anomaly = v;
        }
        if let Some(v) = self.on_missed_heartbeat {
            config.on_missed_heartbeat = v;
        }
        if let Some(v) = self.on_manual_trigger {
            config.on_manual_trigger = v;
        }
        if let Some(v) = self.cascade_to_children {
            config.cascade_to_children = v;
        }
        if let Some(v) = self.recovery_requires_human {
            config.recovery_requires_human = v;
        }
        config
    }
}

// Handler: Heartbeat del propio agente.
// POST /agents/{id}/heartbeat
//
// A un agente congelado se le responde que cese toda transacción.
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<AgentId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let agent = principal.require_agent()?;
    if agent.id != id {
        return Err(ApiError::Forbidden(
            "Agents may only heartbeat for themselves".to_string(),
        ));
    }

    match state.dead_man_monitor.heartbeat(id).await {
        Ok(ack) => Ok(Json(ApiResponse::success(serde_json::json!(ack)))),
        Err(DeadManError::Frozen(_)) => Ok(Json(ApiResponse::success(serde_json::json!({
            "frozen": true,
            "directive": "cease all transactions immediately",
        })))),
        Err(e) => Err(e.into()),
    }
}

// Handler: Registrar/actualizar la configuración del dead-man (dueño)
// POST /agents/{id}/dead-man
pub async fn register(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<AgentId>,
    Json(payload): Json<RegisterDeadManRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    super::owned_agent(&state, principal, id).await?;
    let config = state
        .dead_man_monitor
        .register(payload.into_config(id))
        .await?;
    Ok(Json(ApiResponse::success(serde_json::json!(config))))
}

// Handler: Congelamiento manual (dueño)
// POST /agents/{id}/dead-man/freeze
pub async fn freeze(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<AgentId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    super::owned_agent(&state, principal, id).await?;
    state.dead_man_monitor.manual_trigger(id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({ "frozen": true }))))
}

// Handler: Recuperación por operador (dueño)
// POST /agents/{id}/dead-man/unfreeze
pub async fn unfreeze(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<AgentId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    super::owned_agent(&state, principal, id).await?;
    state.dead_man_monitor.unfreeze(id).await?;
    Ok(Json(ApiResponse::success(
        serde_json::json!({ "frozen": false }),
    )))
}

// Handler: Terminación manual — irreversible (dueño)
// POST /agents/{id}/dead-man/terminate
pub async fn terminate(
    State(state): State<Arc<AppState>>,
    principal: AuthPrincipal,
    Path(id): Path<AgentId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    super::owned_agent(&state, principal, id).await?;
    state.dead_man_monitor.manual_terminate(id).await?;
    Ok(Json(ApiResponse::success(
        serde_json::json!({ "terminated": true }),
    )))
}
