use dotenvy::dotenv;
use gateway_service::{
    api::http_routes::{routes, AppState},
    infrastructure::{
        gateways::{fake_payment_rail::FakePaymentRail, log_notifier::LogNotifier},
        persistence::{
            agent_repository::{PostgresAgentRepository, PostgresOwnerRepository},
            audit_repository::PostgresAuditLogRepository,
            cross_agent_repository::PostgresCrossAgentRepository,
            dead_man_repository::PostgresDeadManRepository,
            kill_switch_repository::PostgresKillSwitchRepository,
            lineage_repository::PostgresLineageRepository,
            rule_repository::PostgresSpendRuleRepository,
            transaction_repository::PostgresTransactionRepository,
            wallet_repository::PostgresWalletRepository,
        },
    },
    jobs::{dead_man_sweep::DeadManSweepJob, reconcile_pending::ReconcilePendingJob},
    use_cases::{
        approve_transaction::ApproveTransactionUseCase,
        audit_trail::AuditTrailUseCase,
        cross_agent::CrossAgentUseCase,
        dead_man_monitor::DeadManMonitor,
        deposit::DepositUseCase,
        manage_agents::ManageAgentsUseCase,
        manage_kill_switches::ManageKillSwitchesUseCase,
        manage_rules::ManageRulesUseCase,
        manage_wallets::ManageWalletsUseCase,
        spawn_agent::SpawnAgentUseCase,
        submit_transaction::{SubmitTransactionUseCase, WalletLocks},
    },
};
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        gateway_service::api::handlers::transactions::submit_transaction,
        gateway_service::api::handlers::transactions::list_pending,
        gateway_service::api::handlers::wallets::deposit
    ),
    components(schemas(
        gateway_service::api::handlers::wallets::DepositRequest,
        gateway_service::api::response::ApiResponse<serde_json::Value>
    ))
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Cargar variables de entorno
    dotenv().ok();

    // 2. Configurar Logging/Tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting AgentWallet Gateway Service...");

    // 3. Configurar Conexión a Base de Datos
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;

    info!("Connected to Database");

    // 4. Instanciar Dependencias (Infraestructura)
    let owner_repo = Arc::new(PostgresOwnerRepository::new(pool.clone()));
    let agent_repo = Arc::new(PostgresAgentRepository::new(pool.clone()));
    let wallet_repo = Arc::new(PostgresWalletRepository::new(pool.clone()));
    let transaction_repo = Arc::new(PostgresTransactionRepository::new(pool.clone()));
    let rule_repo = Arc::new(PostgresSpendRuleRepository::new(pool.clone()));
    let kill_switch_repo = Arc::new(PostgresKillSwitchRepository::new(pool.clone()));
    let lineage_repo = Arc::new(PostgresLineageRepository::new(pool.clone()));
    let cross_repo = Arc::new(PostgresCrossAgentRepository::new(pool.clone()));
    let dead_man_repo = Arc::new(PostgresDeadManRepository::new(pool.clone()));
    let audit_repo = Arc::new(PostgresAuditLogRepository::new(pool));
    let notifier = Arc::new(LogNotifier::new());
    let payment_rail = Arc::new(FakePaymentRail::new());
    let wallet_locks = Arc::new(WalletLocks::new());

    // 5. Monitor dead-man: estado en proceso, rehidratado del event log.
    let dead_man_monitor = Arc::new(DeadManMonitor::new(
        dead_man_repo,
        agent_repo.clone(),
        transaction_repo.clone(),
        rule_repo.clone(),
        lineage_repo.clone(),
        audit_repo.clone(),
        notifier.clone(),
    ));
    match dead_man_monitor.rehydrate().await {
        Ok(frozen) => info!("Dead-man monitor rehydrated ({} frozen agents)", frozen),
        Err(e) => warn!("Dead-man rehydration failed, starting cold: {}", e),
    }

    // 6. Instanciar Casos de Uso
    let submit_transaction_use_case = SubmitTransactionUseCase::new(
        wallet_repo.clone(),
        transaction_repo.clone(),
        rule_repo.clone(),
        kill_switch_repo.clone(),
        audit_repo.clone(),
        dead_man_monitor.clone(),
        payment_rail,
        wallet_locks.clone(),
    );
    let approve_transaction_use_case = ApproveTransactionUseCase::new(
        transaction_repo.clone(),
        wallet_repo.clone(),
        audit_repo.clone(),
        wallet_locks,
    );
    let deposit_use_case = DepositUseCase::new(
        wallet_repo.clone(),
        transaction_repo.clone(),
        audit_repo.clone(),
    );
    let manage_agents_use_case = ManageAgentsUseCase::new(agent_repo.clone(), audit_repo.clone());
    let manage_wallets_use_case = ManageWalletsUseCase::new(
        wallet_repo.clone(),
        agent_repo.clone(),
        audit_repo.clone(),
    );
    let manage_rules_use_case = ManageRulesUseCase::new(
        rule_repo,
        wallet_repo.clone(),
        audit_repo.clone(),
    );
    let manage_kill_switches_use_case = ManageKillSwitchesUseCase::new(
        kill_switch_repo,
        wallet_repo,
        agent_repo.clone(),
        audit_repo.clone(),
    );
    let spawn_agent_use_case = SpawnAgentUseCase::new(
        agent_repo.clone(),
        lineage_repo,
        audit_repo.clone(),
    );
    let cross_agent_use_case =
        CrossAgentUseCase::new(cross_repo, agent_repo.clone(), audit_repo.clone(), notifier);
    let audit_trail_use_case = AuditTrailUseCase::new(audit_repo.clone());

    // 7. Configurar Estado de la App Axum
    let app_state = Arc::new(AppState {
        owner_repo,
        agent_repo,
        submit_transaction_use_case,
        approve_transaction_use_case,
        deposit_use_case,
        manage_agents_use_case,
        manage_wallets_use_case,
        manage_rules_use_case,
        manage_kill_switches_use_case,
        dead_man_monitor: dead_man_monitor.clone(),
        spawn_agent_use_case,
        cross_agent_use_case,
        audit_trail_use_case,
    });

    // 8. Configurar Rutas y Servidor
    let app = routes(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{}:{}", host, port);

    // 9. Iniciar Background Jobs (Procesos en Segundo Plano)
    let sweep_monitor = dead_man_monitor;
    tokio::spawn(async move {
        // Barrido de heartbeats: cada ~10 segundos.
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(10));
        let job = DeadManSweepJob::new(sweep_monitor);

        info!("Dead-man sweep scheduler started");

        loop {
            interval.tick().await;
            job.run().await;
        }
    });

    let job_transaction_repo = transaction_repo;
    let job_audit_repo = audit_repo;
    tokio::spawn(async move {
        // Conciliación de PENDING huérfanos: cada 60 segundos.
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        let job = ReconcilePendingJob::new(job_transaction_repo, job_audit_repo);

        info!("Pending reconciliation scheduler started");

        loop {
            interval.tick().await;
            job.run().await;
        }
    });

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
