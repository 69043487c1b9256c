//! AgentWallet Gateway Service Library
//!
//! This library is the core of the governance gateway that sits between
//! autonomous agents and money-moving actions, exporting the necessary
//! modules for the application binary and integration tests.
//!
//! # Modules
//!
//! * `api` - Contains the HTTP interface, auth extractor and error mapping.
//! * `domain` - Contains the entities, policy engines and business rules.
//! * `infrastructure` - Contains the concrete repositories and gateways.
//! * `use_cases` - Contains the application flows (admission, governors).
//! * `jobs` - Contains the background jobs (dead-man sweep, reconciler).

pub mod api;
pub mod domain;
pub mod infrastructure;
pub mod jobs;
pub mod use_cases;
