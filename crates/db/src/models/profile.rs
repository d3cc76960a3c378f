//! Profile (user) models.

use autocrm_core::error::CoreError;
use autocrm_core::roles::Role;
use autocrm_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Entity structs (database rows)
// ---------------------------------------------------------------------------

/// A row from the `profiles` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Profile {
    pub id: DbId,
    pub name: String,
    pub email: String,
    /// `None` for system actors that cannot log in.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Profile {
    /// The parsed role. The column is constrained by `ck_profiles_role`.
    pub fn role(&self) -> Result<Role, CoreError> {
        Role::parse(&self.role)
    }
}

/// Directory entry used by agent-reference pickers.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AgentSummary {
    pub id: DbId,
    pub name: String,
    pub email: String,
    pub role: String,
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Insert payload for a new profile. The password is already hashed.
#[derive(Debug, Clone)]
pub struct CreateProfile {
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
}

/// Request body for `POST /auth/signup`.
#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    /// `customer` (default) or `agent`.
    #[serde(default)]
    pub role: Option<Role>,
}

/// Request body for `POST /auth/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}
