//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` request DTOs for the API layer
//! - Plain insert structs consumed by the repositories

pub mod article;
pub mod profile;
pub mod team;
pub mod template;
pub mod ticket;
pub mod ticket_update;
