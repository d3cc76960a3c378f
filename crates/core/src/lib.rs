//! autoCRM domain core.
//!
//! Pure domain logic with zero I/O: field typing and value parsing, template
//! validation and versioning rules, ticket snapshots, the update planner that
//! produces audit deltas, audit replay, role-scoped projection, triage and
//! assistant prompt helpers, and agent metrics. Both the repository layer
//! and the API server depend on this crate.

pub mod article;
pub mod assistant;
pub mod error;
pub mod field;
pub mod metrics;
pub mod pagination;
pub mod projection;
pub mod roles;
pub mod template;
pub mod ticket;
pub mod triage;
pub mod types;
pub mod update;
