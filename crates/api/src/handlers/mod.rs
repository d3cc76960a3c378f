//! Request handlers.
//!
//! Each submodule provides the async handler functions for one resource.
//! Handlers validate access, delegate to the repositories in `autocrm_db` or
//! to the [`engine`](crate::engine) for multi-step writes, and map errors via
//! [`AppError`](crate::error::AppError).

pub mod agents;
pub mod articles;
pub mod auth;
pub mod metrics;
pub mod teams;
pub mod templates;
pub mod tickets;
pub mod triage;
