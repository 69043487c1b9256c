use chrono::{DateTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::error::RuleError;
use crate::domain::types::{RuleId, WalletId};

/// Clases de regla soportadas. El conjunto es cerrado: cada clase tiene un
/// esquema de parámetros fijo y una función de evaluación pura.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rule_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    PerTransactionLimit,
    DailyLimit,
    WeeklyLimit,
    MonthlyLimit,
    CategoryWhitelist,
    CategoryBlacklist,
    RecipientWhitelist,
    RecipientBlacklist,
    TimeWindow,
    ApprovalThreshold,
    SignalFilter,
}

/// Parámetros por clase de regla, etiquetados para persistirse como JSONB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleParams {
    PerTransactionLimit { limit: Decimal },
    DailyLimit { limit: Decimal },
    WeeklyLimit { limit: Decimal },
    MonthlyLimit { limit: Decimal },
    CategoryWhitelist { categories: Vec<String> },
    CategoryBlacklist { categories: Vec<String> },
    RecipientWhitelist { recipients: Vec<String> },
    RecipientBlacklist { recipients: Vec<String> },
    TimeWindow { start_hour: u8, end_hour: u8 },
    ApprovalThreshold { threshold: Decimal },
    SignalFilter { allowed_signals: Vec<String> },
}

impl RuleParams {
    pub fn kind(&self) -> RuleKind {
        match self {
            RuleParams::PerTransactionLimit { .. } => RuleKind::PerTransactionLimit,
            RuleParams::DailyLimit { .. } => RuleKind::DailyLimit,
            RuleParams::WeeklyLimit { .. } => RuleKind::WeeklyLimit,
            RuleParams::MonthlyLimit { .. } => RuleKind::MonthlyLimit,
            RuleParams::CategoryWhitelist { .. } => RuleKind::CategoryWhitelist,
            RuleParams::CategoryBlacklist { .. } => RuleKind::CategoryBlacklist,
            RuleParams::RecipientWhitelist { .. } => RuleKind::RecipientWhitelist,
            RuleParams::RecipientBlacklist { .. } => RuleKind::RecipientBlacklist,
            RuleParams::TimeWindow { .. } => RuleKind::TimeWindow,
            RuleParams::ApprovalThreshold { .. } => RuleKind::ApprovalThreshold,
            RuleParams::SignalFilter { .. } => RuleKind::SignalFilter,
        }
    }

    /// Validación aplicada al crear o actualizar una regla.
    ///
    /// Límites y umbrales deben ser positivos, las listas no vacías y las
    /// horas dentro de [0, 23].
    pub fn validate(&self) -> Result<(), RuleError> {
        match self {
            RuleParams::PerTransactionLimit { limit }
            | RuleParams::DailyLimit { limit }
            | RuleParams::WeeklyLimit { limit }
            | RuleParams::MonthlyLimit { limit } => {
                if *limit <= Decimal::ZERO {
                    return Err(RuleError::InvalidParams(
                        "limit must be positive".to_string(),
                    ));
                }
            }
            RuleParams::ApprovalThreshold { threshold } => {
                if *threshold <= Decimal::ZERO {
                    return Err(RuleError::InvalidParams(
                        "threshold must be positive".to_string(),
                    ));
                }
            }
            RuleParams::CategoryWhitelist { categories }
            | RuleParams::CategoryBlacklist { categories } => {
                if categories.is_empty() {
                    return Err(RuleError::InvalidParams(
                        "categories cannot be empty".to_string(),
                    ));
                }
            }
            RuleParams::RecipientWhitelist { recipients }
            | RuleParams::RecipientBlacklist { recipients } => {
                if recipients.is_empty() {
                    return Err(RuleError::InvalidParams(
                        "recipients cannot be empty".to_string(),
                    ));
                }
            }
            RuleParams::TimeWindow {
                start_hour,
                end_hour,
            } => {
                if *start_hour > 23 || *end_hour > 23 {
                    return Err(RuleError::InvalidParams(
                        "hours must be in [0, 23]".to_string(),
                    ));
                }
            }
            RuleParams::SignalFilter { allowed_signals } => {
                if allowed_signals.is_empty() {
                    return Err(RuleError::InvalidParams(
                        "allowed_signals cannot be empty".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Aplica el estrangulamiento del dead-man switch: los límites diarios
    /// activos se reducen a un décimo.
    pub fn throttled_copy(&self) -> Option<RuleParams> {
        match self {
            RuleParams::DailyLimit { limit } => Some(RuleParams::DailyLimit {
                limit: *limit * Decimal::new(1, 1),
            }),
            _ => None,
        }
    }
}

/// Modelo de Entidad: SpendRule.
/// Un predicado más efecto (bloquear o marcar-para-aprobación) aplicado
/// durante la admisión. Las reglas activas de una billetera se evalúan en
/// orden de prioridad descendente.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendRule {
    pub id: RuleId,
    pub wallet_id: WalletId,
    pub params: RuleParams,
    pub active: bool,
    pub priority: i32,
    pub throttled: bool,
    pub created_at: DateTime<Utc>,
}

impl SpendRule {
    pub fn new(wallet_id: WalletId, params: RuleParams, priority: i32) -> Result<Self, RuleError> {
        params.validate()?;
        Ok(Self {
            id: RuleId::new(),
            wallet_id,
            params,
            active: true,
            priority,
            throttled: false,
            created_at: Utc::now(),
        })
    }

    pub fn kind(&self) -> RuleKind {
        self.params.kind()
    }
}

/// Contexto de evaluación: el candidato más los agregados de ventana ya
/// calculados por el Store.
#[derive(Debug, Clone)]
pub struct RuleContext {
    pub amount: Decimal,
    pub category: Option<String>,
    pub recipient: Option<String>,
    pub signal_strength: Option<String>,
    pub spent_today: Decimal,
    pub spent_this_week: Decimal,
    pub spent_this_month: Decimal,
    pub now: DateTime<Utc>,
}

/// Resultado de evaluar una regla individual. Cada regla produce un
/// resultado — la evaluación nunca corta en el primer fallo, porque el
/// audit trail necesita el veredicto de todas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCheckResult {
    pub rule_id: RuleId,
    pub kind: RuleKind,
    pub passed: bool,
    pub requires_approval: bool,
    pub reason: String,
    pub details: serde_json::Value,
}

/// Veredicto estructurado del motor de reglas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleVerdict {
    pub approved: bool,
    pub requires_approval: bool,
    pub results: Vec<RuleCheckResult>,
    pub evaluated_at: DateTime<Utc>,
}

impl RuleVerdict {
    pub fn results_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.results).unwrap_or(serde_json::Value::Null)
    }
}

/// Evalúa todas las reglas activas de la billetera contra el candidato.
///
/// `approved` es verdadero si toda regla con efecto bloqueante pasó;
/// `requires_approval` es el OR de los flags de las reglas ApprovalThreshold.
pub fn evaluate_rules(rules: &[SpendRule], ctx: &RuleContext) -> RuleVerdict {
    let mut ordered: Vec<&SpendRule> = rules.iter().filter(|r| r.active).collect();
    ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

    let mut approved = true;
    let mut requires_approval = false;
    let mut results = Vec::with_capacity(ordered.len());

    for rule in ordered {
        let result = evaluate_one(rule, ctx);
        if !result.passed {
            approved = false;
        }
        if result.requires_approval {
            requires_approval = true;
        }
        results.push(result);
    }

    RuleVerdict {
        approved,
        requires_approval,
        results,
        evaluated_at: ctx.now,
    }
}

fn evaluate_one(rule: &SpendRule, ctx: &RuleContext) -> RuleCheckResult {
    let (passed, requires_approval, reason, details) = match &rule.params {
        RuleParams::PerTransactionLimit { limit } => {
            let passed = ctx.amount <= *limit;
            (
                passed,
                false,
                if passed {
                    format!("amount {} within per-transaction limit {}", ctx.amount, limit)
                } else {
                    format!("amount {} exceeds per-transaction limit {}", ctx.amount, limit)
                },
                serde_json::json!({ "limit": limit, "amount": ctx.amount }),
            )
        }
        RuleParams::DailyLimit { limit } => {
            window_limit_result("daily", *limit, ctx.spent_today, ctx.amount)
        }
        RuleParams::WeeklyLimit { limit } => {
            window_limit_result("weekly", *limit, ctx.spent_this_week, ctx.amount)
        }
        RuleParams::MonthlyLimit { limit } => {
            window_limit_result("monthly", *limit, ctx.spent_this_month, ctx.amount)
        }
        RuleParams::CategoryWhitelist { categories } => match &ctx.category {
            None => (
                true,
                false,
                "no category on transaction".to_string(),
                serde_json::json!({ "allowed": categories }),
            ),
            Some(cat) => {
                let passed = categories.contains(cat);
                (
                    passed,
                    false,
                    if passed {
                        format!("category '{}' is whitelisted", cat)
                    } else {
                        format!("category '{}' is not in the whitelist", cat)
                    },
                    serde_json::json!({ "allowed": categories, "category": cat }),
                )
            }
        },
        RuleParams::CategoryBlacklist { categories } => match &ctx.category {
            None => (
                true,
                false,
                "no category on transaction".to_string(),
                serde_json::json!({ "blocked": categories }),
            ),
            Some(cat) => {
                let passed = !categories.contains(cat);
                (
                    passed,
                    false,
                    if passed {
                        format!("category '{}' is not blacklisted", cat)
                    } else {
                        format!("category '{}' is blacklisted", cat)
                    },
                    serde_json::json!({ "blocked": categories, "category": cat }),
                )
            }
        },
        RuleParams::RecipientWhitelist { recipients } => match &ctx.recipient {
            None => (
                true,
                false,
                "no recipient on transaction".to_string(),
                serde_json::json!({ "allowed": recipients }),
            ),
            Some(r) => {
                let passed = recipients.contains(r);
                (
                    passed,
                    false,
                    if passed {
                        format!("recipient '{}' is whitelisted", r)
                    } else {
                        format!("recipient '{}' is not in the whitelist", r)
                    },
                    serde_json::json!({ "allowed": recipients, "recipient": r }),
                )
            }
        },
        RuleParams::RecipientBlacklist { recipients } => match &ctx.recipient {
            None => (
                true,
                false,
                "no recipient on transaction".to_string(),
                serde_json::json!({ "blocked": recipients }),
            ),
            Some(r) => {
                let passed = !recipients.contains(r);
                (
                    passed,
                    false,
                    if passed {
                        format!("recipient '{}' is not blacklisted", r)
                    } else {
                        format!("recipient '{}' is blacklisted", r)
                    },
                    serde_json::json!({ "blocked": recipients, "recipient": r }),
                )
            }
        },
        RuleParams::TimeWindow {
            start_hour,
            end_hour,
        } => {
            let hour = ctx.now.hour() as u8;
            // Ventana semiabierta [start, end); si start > end la ventana
            // cruza medianoche.
            let passed = if start_hour <= end_hour {
                hour >= *start_hour && hour < *end_hour
            } else {
                hour >= *start_hour || hour < *end_hour
            };
            (
                passed,
                false,
                if passed {
                    format!("hour {}h UTC inside window [{}h, {}h)", hour, start_hour, end_hour)
                } else {
                    format!("hour {}h UTC outside window [{}h, {}h)", hour, start_hour, end_hour)
                },
                serde_json::json!({ "start_hour": start_hour, "end_hour": end_hour, "hour": hour }),
            )
        }
        RuleParams::ApprovalThreshold { threshold } => {
            let needs_human = ctx.amount > *threshold;
            (
                true,
                needs_human,
                if needs_human {
                    format!(
                        "amount {} above approval threshold {}; owner sign-off required",
                        ctx.amount, threshold
                    )
                } else {
                    format!("amount {} at or below approval threshold {}", ctx.amount, threshold)
                },
                serde_json::json!({ "threshold": threshold, "amount": ctx.amount }),
            )
        }
        RuleParams::SignalFilter { allowed_signals } => match &ctx.signal_strength {
            None => (
                false,
                false,
                "transaction carries no signal strength".to_string(),
                serde_json::json!({ "allowed": allowed_signals }),
            ),
            Some(signal) => {
                let passed = allowed_signals.contains(signal);
                (
                    passed,
                    false,
                    if passed {
                        format!("signal '{}' is allowed", signal)
                    } else {
                        format!("signal '{}' is not allowed", signal)
                    },
                    serde_json::json!({ "allowed": allowed_signals, "signal": signal }),
                )
            }
        },
    };

    RuleCheckResult {
        rule_id: rule.id,
        kind: rule.kind(),
        passed,
        requires_approval,
        reason,
        details,
    }
}

fn window_limit_result(
    window: &str,
    limit: Decimal,
    already_spent: Decimal,
    amount: Decimal,
) -> (bool, bool, String, serde_json::Value) {
    let projected = already_spent + amount;
    let passed = projected <= limit;
    (
        passed,
        false,
        if passed {
            format!("projected {} spend {} within limit {}", window, projected, limit)
        } else {
            format!("projected {} spend {} exceeds limit {}", window, projected, limit)
        },
        serde_json::json!({
            "limit": limit,
            "already_spent": already_spent,
            "projected": projected,
        }),
    )
}
