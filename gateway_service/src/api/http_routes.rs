use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::domain::repository::{AgentRepository, OwnerRepository};
use crate::use_cases::{
    approve_transaction::ApproveTransactionUseCase, audit_trail::AuditTrailUseCase,
    cross_agent::CrossAgentUseCase, dead_man_monitor::DeadManMonitor, deposit::DepositUseCase,
    manage_agents::ManageAgentsUseCase, manage_kill_switches::ManageKillSwitchesUseCase,
    manage_rules::ManageRulesUseCase, manage_wallets::ManageWalletsUseCase,
    spawn_agent::SpawnAgentUseCase, submit_transaction::SubmitTransactionUseCase,
};

// Estado compartido de la aplicación: casos de uso más los repositorios
// que necesita el extractor de autenticación.
pub struct AppState {
    pub owner_repo: Arc<dyn OwnerRepository>,
    pub agent_repo: Arc<dyn AgentRepository>,
    pub submit_transaction_use_case: SubmitTransactionUseCase,
    pub approve_transaction_use_case: ApproveTransactionUseCase,
    pub deposit_use_case: DepositUseCase,
    pub manage_agents_use_case: ManageAgentsUseCase,
    pub manage_wallets_use_case: ManageWalletsUseCase,
    pub manage_rules_use_case: ManageRulesUseCase,
    pub manage_kill_switches_use_case: ManageKillSwitchesUseCase,
    pub dead_man_monitor: Arc<DeadManMonitor>,
    pub spawn_agent_use_case: SpawnAgentUseCase,
    pub cross_agent_use_case: CrossAgentUseCase,
    pub audit_trail_use_case: AuditTrailUseCase,
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        // Dueños
        .route("/owners", post(handlers::agents::create_owner))
        .route("/owners/rotate-key", post(handlers::agents::rotate_owner_key))
        // Agentes
        .route("/agents", post(handlers::agents::create_agent).get(handlers::agents::list_agents))
        .route("/agents/{id}", get(handlers::agents::get_agent))
        .route("/agents/{id}/wallets", get(handlers::agents::list_agent_wallets))
        .route("/agents/{id}/pause", post(handlers::agents::pause_agent))
        .route("/agents/{id}/activate", post(handlers::agents::activate_agent))
        .route("/agents/{id}/heartbeat", post(handlers::dead_man::heartbeat))
        // Dead-man switch
        .route("/agents/{id}/dead-man", post(handlers::dead_man::register))
        .route("/agents/{id}/dead-man/freeze", post(handlers::dead_man::freeze))
        .route("/agents/{id}/dead-man/unfreeze", post(handlers::dead_man::unfreeze))
        .route("/agents/{id}/dead-man/terminate", post(handlers::dead_man::terminate))
        // Linaje
        .route("/agents/{id}/spawn", post(handlers::lineage::spawn_child))
        .route("/agents/{id}/lineage", get(handlers::lineage::get_lineage))
        .route(
            "/agents/{id}/terminate-lineage",
            post(handlers::lineage::terminate_lineage),
        )
        // Billeteras
        .route("/wallets", post(handlers::wallets::create_wallet))
        .route("/wallets/{id}", get(handlers::wallets::get_wallet))
        .route("/wallets/{id}/balance", get(handlers::wallets::get_balance))
        .route("/wallets/{id}/deposit", post(handlers::wallets::deposit))
        .route("/wallets/{id}/freeze", post(handlers::wallets::freeze_wallet))
        .route("/wallets/{id}/unfreeze", post(handlers::wallets::unfreeze_wallet))
        .route(
            "/wallets/{id}/emergency-stop",
            post(handlers::kill_switches::emergency_stop),
        )
        // Reglas de gasto
        .route(
            "/wallets/{id}/rules",
            post(handlers::rules::create_rule).get(handlers::rules::list_rules),
        )
        .route(
            "/rules/{id}",
            put(handlers::rules::update_rule).delete(handlers::rules::delete_rule),
        )
        // Transacciones
        .route(
            "/wallets/{id}/transactions",
            post(handlers::transactions::submit_transaction)
                .get(handlers::transactions::list_transactions),
        )
        .route(
            "/transactions/pending",
            get(handlers::transactions::list_pending),
        )
        .route(
            "/transactions/{id}/approve",
            post(handlers::transactions::approve_transaction),
        )
        .route(
            "/transactions/{id}/reject",
            post(handlers::transactions::reject_transaction),
        )
        // Kill switches
        .route(
            "/wallets/{id}/kill-switches",
            post(handlers::kill_switches::create_kill_switch)
                .get(handlers::kill_switches::list_kill_switches),
        )
        .route(
            "/kill-switches/{id}/reset",
            post(handlers::kill_switches::reset_kill_switch),
        )
        .route(
            "/kill-switches/{id}",
            delete(handlers::kill_switches::delete_kill_switch),
        )
        // Cross-agent
        .route(
            "/cross-agent/policies",
            post(handlers::cross_agent::create_policy).get(handlers::cross_agent::list_policies),
        )
        .route(
            "/cross-agent/policies/{id}",
            put(handlers::cross_agent::update_policy)
                .delete(handlers::cross_agent::delete_policy),
        )
        .route("/cross-agent/groups", post(handlers::cross_agent::create_group))
        .route("/cross-agent/authorize", post(handlers::cross_agent::authorize))
        .route(
            "/cross-agent/transactions/{id}/approve",
            post(handlers::cross_agent::approve_transaction),
        )
        // Auditoría
        .route("/audit", get(handlers::audit::list_audit))
        .route("/audit/export", get(handlers::audit::export_audit))
        .route("/audit/summary", get(handlers::audit::audit_summary))
        .with_state(state) // Inyectamos el estado (Casos de Uso)
}
