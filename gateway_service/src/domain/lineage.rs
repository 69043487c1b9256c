use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::entities::AgentStatus;
use crate::domain::error::LineageError;
use crate::domain::types::{AgentId, EventId};

/// Política de spawn heredable. Cada límite numérico del hijo es <= al del
/// padre (monotonía de spawn); los overrides solo pueden apretar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnPolicy {
    pub max_spend_ratio: Decimal,
    pub max_transaction_ratio: Decimal,
    pub max_spawn_depth: i32,
    pub max_children: i32,
    pub children_can_spawn: bool,
    pub daily_spend_limit: Option<Decimal>,
    pub per_transaction_limit: Option<Decimal>,
    pub allowed_vendors: Option<Vec<String>>,
}

impl Default for SpawnPolicy {
    fn default() -> Self {
        Self {
            max_spend_ratio: Decimal::ONE,
            max_transaction_ratio: Decimal::ONE,
            max_spawn_depth: 3,
            max_children: 10,
            children_can_spawn: true,
            daily_spend_limit: None,
            per_transaction_limit: None,
            allowed_vendors: None,
        }
    }
}

/// Overrides opcionales pedidos al momento del spawn. Un override que
/// intente aflojar un límite simplemente no tiene efecto: la derivación
/// toma siempre el mínimo.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SpawnOverrides {
    pub max_spend_ratio: Option<Decimal>,
    pub max_transaction_ratio: Option<Decimal>,
    pub max_spawn_depth: Option<i32>,
    pub max_children: Option<i32>,
    pub children_can_spawn: Option<bool>,
    pub daily_spend_limit: Option<Decimal>,
    pub per_transaction_limit: Option<Decimal>,
    pub allowed_vendors: Option<Vec<String>>,
}

impl SpawnPolicy {
    /// Deriva la política efectiva del hijo: límites escalados por el ratio
    /// efectivo, reducidos por overrides, allowlists intersectadas y
    /// profundidad de spawn decrementada.
    pub fn derive_child(&self, overrides: &SpawnOverrides) -> SpawnPolicy {
        let spend_ratio = min_opt(self.max_spend_ratio, overrides.max_spend_ratio);
        let tx_ratio = min_opt(self.max_transaction_ratio, overrides.max_transaction_ratio);

        let daily = scale_and_cap(self.daily_spend_limit, spend_ratio, overrides.daily_spend_limit);
        let per_tx = scale_and_cap(
            self.per_transaction_limit,
            tx_ratio,
            overrides.per_transaction_limit,
        );

        let allowed_vendors = match (&self.allowed_vendors, &overrides.allowed_vendors) {
            (None, None) => None,
            (Some(parent), None) => Some(parent.clone()),
            (None, Some(requested)) => Some(requested.clone()),
            (Some(parent), Some(requested)) => Some(
                requested
                    .iter()
                    .filter(|v| parent.contains(v))
                    .cloned()
                    .collect(),
            ),
        };

        SpawnPolicy {
            max_spend_ratio: spend_ratio,
            max_transaction_ratio: tx_ratio,
            max_spawn_depth: min_opt(self.max_spawn_depth - 1, overrides.max_spawn_depth).max(0),
            max_children: min_opt(self.max_children, overrides.max_children),
            children_can_spawn: self.children_can_spawn
                && overrides.children_can_spawn.unwrap_or(true),
            daily_spend_limit: daily,
            per_transaction_limit: per_tx,
            allowed_vendors,
        }
    }
}

fn min_opt<T: PartialOrd + Copy>(parent: T, requested: Option<T>) -> T {
    match requested {
        Some(r) if r < parent => r,
        _ => parent,
    }
}

fn scale_and_cap(
    parent_limit: Option<Decimal>,
    ratio: Decimal,
    requested: Option<Decimal>,
) -> Option<Decimal> {
    let scaled = parent_limit.map(|l| l * ratio);
    match (scaled, requested) {
        (None, None) => None,
        (Some(s), None) => Some(s),
        (None, Some(r)) => Some(r),
        (Some(s), Some(r)) => Some(s.min(r)),
    }
}

/// Modelo de Entidad: AgentLineage.
/// Nodo del árbol de linaje, enraizado en un agente original. `root_id` es
/// invariante bajo spawns sucesivos y depth(hijo) = depth(padre) + 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLineage {
    pub agent_id: AgentId,
    pub parent_id: Option<AgentId>,
    pub root_id: AgentId,
    pub depth: i32,
    pub children_ids: Vec<AgentId>,
    pub status: AgentStatus,
    pub spawn_policy: SpawnPolicy,
    pub created_at: DateTime<Utc>,
}

impl AgentLineage {
    /// Linaje raíz implícito para un agente que nunca fue spawneado.
    pub fn root(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            parent_id: None,
            root_id: agent_id,
            depth: 0,
            children_ids: Vec::new(),
            status: AgentStatus::Active,
            spawn_policy: SpawnPolicy::default(),
            created_at: Utc::now(),
        }
    }

    /// Controles de admisión del spawn governor (sin tocar el store):
    /// profundidad, cupo de hijos y permiso de spawn para no-raíces.
    pub fn admit_spawn(&self) -> Result<(), LineageError> {
        if self.depth >= self.spawn_policy.max_spawn_depth {
            return Err(LineageError::SpawnRejected(format!(
                "max spawn depth {} reached",
                self.spawn_policy.max_spawn_depth
            )));
        }
        if self.children_ids.len() as i32 >= self.spawn_policy.max_children {
            return Err(LineageError::SpawnRejected(format!(
                "max children {} reached",
                self.spawn_policy.max_children
            )));
        }
        if self.depth > 0 && !self.spawn_policy.children_can_spawn {
            return Err(LineageError::SpawnRejected(
                "this lineage does not allow children to spawn".to_string(),
            ));
        }
        Ok(())
    }

    /// Construye el nodo hijo. La unicidad del hijo (acyclicidad del árbol)
    /// la garantiza el insert del store: un hijo con linaje previo es un
    /// duplicado rechazado.
    pub fn child(&self, child_id: AgentId, policy: SpawnPolicy) -> AgentLineage {
        AgentLineage {
            agent_id: child_id,
            parent_id: Some(self.agent_id),
            root_id: self.root_id,
            depth: self.depth + 1,
            children_ids: Vec::new(),
            status: AgentStatus::Active,
            spawn_policy: policy,
            created_at: Utc::now(),
        }
    }
}

/// Evento append-only: un registro por intento de spawn autorizado.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnEvent {
    pub id: EventId,
    pub parent_id: AgentId,
    pub child_id: AgentId,
    pub depth: i32,
    pub inherited_policy: SpawnPolicy,
    pub authorized: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_child_limits_scale_by_ratio_and_cap_by_override() {
        let parent = SpawnPolicy {
            daily_spend_limit: Some(dec!(1000)),
            ..SpawnPolicy::default()
        };
        let overrides = SpawnOverrides {
            max_spend_ratio: Some(dec!(0.5)),
            daily_spend_limit: Some(dec!(800)),
            ..SpawnOverrides::default()
        };

        let child = parent.derive_child(&overrides);
        // min(800, 1000 * 0.5) = 500
        assert_eq!(child.daily_spend_limit, Some(dec!(500.0)));
        assert_eq!(child.max_spend_ratio, dec!(0.5));
    }

    #[test]
    fn test_grandchild_stays_under_child() {
        let parent = SpawnPolicy {
            daily_spend_limit: Some(dec!(1000)),
            ..SpawnPolicy::default()
        };
        let child = parent.derive_child(&SpawnOverrides {
            max_spend_ratio: Some(dec!(0.5)),
            daily_spend_limit: Some(dec!(800)),
            ..SpawnOverrides::default()
        });
        let grandchild = child.derive_child(&SpawnOverrides::default());

        assert!(grandchild.daily_spend_limit.unwrap() <= child.daily_spend_limit.unwrap());
        assert_eq!(grandchild.max_spawn_depth, child.max_spawn_depth - 1);
    }

    #[test]
    fn test_overrides_cannot_loosen() {
        let parent = SpawnPolicy {
            max_spend_ratio: dec!(0.4),
            daily_spend_limit: Some(dec!(100)),
            max_children: 2,
            ..SpawnPolicy::default()
        };
        let child = parent.derive_child(&SpawnOverrides {
            max_spend_ratio: Some(dec!(0.9)),
            daily_spend_limit: Some(dec!(5000)),
            max_children: Some(50),
            ..SpawnOverrides::default()
        });

        assert_eq!(child.max_spend_ratio, dec!(0.4));
        assert_eq!(child.daily_spend_limit, Some(dec!(40.0)));
        assert_eq!(child.max_children, 2);
    }

    #[test]
    fn test_vendor_allowlists_intersect() {
        let parent = SpawnPolicy {
            allowed_vendors: Some(vec!["aws".to_string(), "gcp".to_string()]),
            ..SpawnPolicy::default()
        };
        let child = parent.derive_child(&SpawnOverrides {
            allowed_vendors: Some(vec!["gcp".to_string(), "azure".to_string()]),
            ..SpawnOverrides::default()
        });

        assert_eq!(child.allowed_vendors, Some(vec!["gcp".to_string()]));
    }

    #[test]
    fn test_spawn_depth_decrements_and_floors_at_zero() {
        let mut policy = SpawnPolicy::default();
        for _ in 0..5 {
            policy = policy.derive_child(&SpawnOverrides::default());
        }
        assert_eq!(policy.max_spawn_depth, 0);
    }

    #[test]
    fn test_admit_spawn_checks() {
        let agent = AgentId::new();
        let mut lineage = AgentLineage::root(agent);
        assert!(lineage.admit_spawn().is_ok());

        lineage.depth = 3;
        assert!(matches!(
            lineage.admit_spawn(),
            Err(LineageError::SpawnRejected(_))
        ));

        lineage.depth = 1;
        lineage.spawn_policy.children_can_spawn = false;
        assert!(lineage.admit_spawn().is_err());

        lineage.spawn_policy.children_can_spawn = true;
        lineage.children_ids = (0..10).map(|_| AgentId::new()).collect();
        assert!(lineage.admit_spawn().is_err());
    }

    #[test]
    fn test_child_node_keeps_root_and_increments_depth() {
        let root = AgentLineage::root(AgentId::new());
        let child_id = AgentId::new();
        let child = root.child(child_id, root.spawn_policy.derive_child(&SpawnOverrides::default()));

        assert_eq!(child.root_id, root.root_id);
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent_id, Some(root.agent_id));
    }
}
