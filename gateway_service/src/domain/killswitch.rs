use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::entities::Transaction;
use crate::domain::error::KillSwitchError;
use crate::domain::types::{KillSwitchId, WalletId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "kill_switch_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KillSwitchKind {
    DrawdownPercent,
    LossAmount,
    ConsecutiveLosses,
    DailyLossLimit,
}

/// Modelo de Entidad: KillSwitch.
/// Cortacircuitos con pestillo por billetera: al disparar queda enganchado
/// (`triggered`) y la billetera pasa a `KillSwitched` hasta que el dueño lo
/// resetee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillSwitch {
    pub id: KillSwitchId,
    pub wallet_id: WalletId,
    pub kind: KillSwitchKind,
    pub threshold: Decimal,
    pub window_hours: i64,
    pub active: bool,
    pub triggered: bool,
    pub triggered_at: Option<DateTime<Utc>>,
    pub reset_at: Option<DateTime<Utc>>,
    pub current_value: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl KillSwitch {
    pub fn new(
        wallet_id: WalletId,
        kind: KillSwitchKind,
        threshold: Decimal,
        window_hours: i64,
    ) -> Result<Self, KillSwitchError> {
        match kind {
            KillSwitchKind::DrawdownPercent => {
                if threshold <= Decimal::ZERO || threshold > Decimal::ONE {
                    return Err(KillSwitchError::InvalidConfig(
                        "drawdown threshold must be in (0, 1]".to_string(),
                    ));
                }
            }
            _ => {
                if threshold <= Decimal::ZERO {
                    return Err(KillSwitchError::InvalidConfig(
                        "threshold must be positive".to_string(),
                    ));
                }
            }
        }
        if window_hours <= 0 {
            return Err(KillSwitchError::InvalidConfig(
                "window_hours must be positive".to_string(),
            ));
        }
        Ok(Self {
            id: KillSwitchId::new(),
            wallet_id,
            kind,
            threshold,
            window_hours,
            active: true,
            triggered: false,
            triggered_at: None,
            reset_at: None,
            current_value: None,
            created_at: Utc::now(),
        })
    }

    /// Un switch enganchado sin `reset_at` sigue bloqueando todo.
    pub fn is_latched(&self) -> bool {
        self.triggered && self.reset_at.is_none()
    }

    /// Evalúa la condición de disparo contra el historial Completed de la
    /// billetera. `history` debe venir en orden cronológico ascendente y
    /// acotado a la ventana que corresponde a la clase del switch (las
    /// clases diarias reciben el historial desde las 00:00 UTC).
    ///
    /// Devuelve el valor observado cuando la condición se cumple.
    pub fn check(&self, current_balance: Decimal, history: &[Transaction]) -> Option<Decimal> {
        match self.kind {
            KillSwitchKind::DrawdownPercent => {
                let peak = reconstruct_peak(current_balance, history);
                if peak <= Decimal::ZERO {
                    return None;
                }
                let drawdown = (peak - current_balance) / peak;
                (drawdown >= self.threshold).then_some(drawdown)
            }
            KillSwitchKind::LossAmount | KillSwitchKind::DailyLossLimit => {
                let losses = realized_losses(history);
                (losses >= self.threshold).then_some(losses)
            }
            KillSwitchKind::ConsecutiveLosses => {
                let streak = trailing_loss_streak(history);
                (Decimal::from(streak) >= self.threshold).then_some(Decimal::from(streak))
            }
        }
    }
}

/// Reconstruye el pico de balance dentro de la ventana: partiendo del
/// balance actual se deshace cada transacción hacia atrás y el pico es el
/// máximo de la serie resultante. Para billeteras más jóvenes que la
/// ventana esto equivale a balance actual + débitos de la ventana.
fn reconstruct_peak(current_balance: Decimal, history: &[Transaction]) -> Decimal {
    let mut balance = current_balance;
    let mut peak = current_balance;
    for tx in history.iter().rev() {
        balance -= tx.signed_amount();
        if balance > peak {
            peak = balance;
        }
    }
    peak
}

/// Σ max(0, −pnl) sobre el historial: solo cuentan las pérdidas realizadas.
fn realized_losses(history: &[Transaction]) -> Decimal {
    history
        .iter()
        .filter_map(|tx| tx.pnl())
        .filter(|pnl| *pnl < Decimal::ZERO)
        .map(|pnl| -pnl)
        .sum()
}

/// Racha final de transacciones de trading con pnl < 0. Una ganancia (o
/// cualquier transacción de trading sin pérdida) corta la racha.
fn trailing_loss_streak(history: &[Transaction]) -> u32 {
    let mut streak = 0;
    for tx in history.iter().rev() {
        if tx.category.as_deref() != Some("trading") {
            continue;
        }
        match tx.pnl() {
            Some(pnl) if pnl < Decimal::ZERO => streak += 1,
            _ => break,
        }
    }
    streak
}
