use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::error::{
    AgentError, AuditError, CrossAgentError, DeadManError, KillSwitchError, LineageError,
    RuleError, TransactionError, WalletError,
};

// Error unificado de la API del gateway. Cada error de dominio se
// convierte implícitamente y se mapea a su clase de resultado HTTP:
// 400 validación / bloqueo de política, 401/403 autenticación y alcance,
// 404 entidad inexistente, 409 conflicto de estado, 500 fallo interno
// (opaco: el detalle va al log, no al cliente).
pub enum ApiError {
    Unauthorized,
    Forbidden(String),
    Agent(AgentError),
    Wallet(WalletError),
    Transaction(TransactionError),
    Rule(RuleError),
    KillSwitch(KillSwitchError),
    DeadMan(DeadManError),
    Lineage(LineageError),
    CrossAgent(CrossAgentError),
    Audit(AuditError),
}

macro_rules! from_domain_error {
    ($variant:ident, $error:ty) => {
        impl From<$error> for ApiError {
            fn from(err: $error) -> Self {
                ApiError::$variant(err)
            }
        }
    };
}

from_domain_error!(Agent, AgentError);
from_domain_error!(Wallet, WalletError);
from_domain_error!(Transaction, TransactionError);
from_domain_error!(Rule, RuleError);
from_domain_error!(KillSwitch, KillSwitchError);
from_domain_error!(DeadMan, DeadManError);
from_domain_error!(Lineage, LineageError);
from_domain_error!(CrossAgent, CrossAgentError);
from_domain_error!(Audit, AuditError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Missing or invalid credentials".to_string(),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),

            ApiError::Agent(err) => match err {
                AgentError::NotFound(_) | AgentError::OwnerNotFound(_) => {
                    (StatusCode::NOT_FOUND, err.to_string())
                }
                AgentError::InvalidData(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                AgentError::InvalidState(_) => (StatusCode::CONFLICT, err.to_string()),
                AgentError::RepositoryError(_) => internal(err),
            },
            ApiError::Wallet(err) => match err {
                WalletError::NotFound(_) | WalletError::AgentNotFound(_) => {
                    (StatusCode::NOT_FOUND, err.to_string())
                }
                WalletError::RepositoryError(_) => internal(err),
                _ => (StatusCode::BAD_REQUEST, err.to_string()),
            },
            ApiError::Transaction(err) => match err {
                TransactionError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                TransactionError::NotAwaitingApproval(_) => {
                    (StatusCode::CONFLICT, err.to_string())
                }
                TransactionError::Wallet(WalletError::NotFound(_)) => {
                    (StatusCode::NOT_FOUND, err.to_string())
                }
                TransactionError::RepositoryError(_) => internal(err),
                _ => (StatusCode::BAD_REQUEST, err.to_string()),
            },
            ApiError::Rule(err) => match err {
                RuleError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                RuleError::InvalidParams(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                RuleError::RepositoryError(_) => internal(err),
            },
            ApiError::KillSwitch(err) => match err {
                KillSwitchError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                KillSwitchError::NotTriggered(_) => (StatusCode::CONFLICT, err.to_string()),
                KillSwitchError::InvalidConfig(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                KillSwitchError::RepositoryError(_) => internal(err),
            },
            ApiError::DeadMan(err) => match err {
                DeadManError::NotRegistered(_) => (StatusCode::NOT_FOUND, err.to_string()),
                DeadManError::InvalidConfig(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                DeadManError::Frozen(_) | DeadManError::Terminated(_) => {
                    (StatusCode::BAD_REQUEST, err.to_string())
                }
                DeadManError::RepositoryError(_) => internal(err),
            },
            ApiError::Lineage(err) => match err {
                LineageError::AgentNotFound(_) | LineageError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, err.to_string())
                }
                LineageError::DuplicateLineage(_) => (StatusCode::CONFLICT, err.to_string()),
                LineageError::SpawnRejected(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                LineageError::RepositoryError(_) => internal(err),
            },
            ApiError::CrossAgent(err) => match err {
                CrossAgentError::PolicyNotFound(_) | CrossAgentError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, err.to_string())
                }
                CrossAgentError::NotEscalated(_) => (StatusCode::CONFLICT, err.to_string()),
                CrossAgentError::RepositoryError(_) => internal(err),
                _ => (StatusCode::BAD_REQUEST, err.to_string()),
            },
            ApiError::Audit(err) => internal(err),
        };

        let body = Json(json!({
            "status": "error",
            "message": message,
        }));

        (status, body).into_response()
    }
}

fn internal(err: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::error!("Internal error: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}
