//! Authentication and authorization extractors.
//!
//! - [`auth::AuthUser`] -- Extracts the authenticated profile from a JWT Bearer token.
//! - [`rbac::RequireAgent`] -- Requires `agent` or `admin` role.
//! - [`rbac::RequireAdmin`] -- Requires the `admin` role.

pub mod auth;
pub mod rbac;
