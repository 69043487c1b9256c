pub mod agent_repository;
pub mod audit_repository;
pub mod cross_agent_repository;
pub mod dead_man_repository;
pub mod kill_switch_repository;
pub mod lineage_repository;
pub mod models;
pub mod rule_repository;
pub mod transaction_repository;
pub mod wallet_repository;
