pub mod dead_man_sweep;
pub mod reconcile_pending;
