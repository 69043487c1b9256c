pub mod approve_transaction;
pub mod audit_trail;
pub mod cross_agent;
pub mod dead_man_monitor;
pub mod deposit;
pub mod manage_agents;
pub mod manage_kill_switches;
pub mod manage_rules;
pub mod manage_wallets;
pub mod spawn_agent;
pub mod submit_transaction;
