//! Team models.

use autocrm_core::triage::TeamCandidate;
use autocrm_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Entity structs (database rows)
// ---------------------------------------------------------------------------

/// A row from the `teams` table plus its member ids.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Team {
    pub id: DbId,
    pub name: String,
    pub description: String,
    pub member_ids: Vec<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A similarity search hit against `team_embeddings`.
#[derive(Debug, Clone, FromRow)]
pub struct TeamMatch {
    pub id: DbId,
    pub name: String,
    pub description: String,
    pub similarity: f64,
}

impl From<TeamMatch> for TeamCandidate {
    fn from(m: TeamMatch) -> Self {
        TeamCandidate {
            id: m.id,
            name: m.name,
            description: m.description,
            similarity: m.similarity,
        }
    }
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Request body for `POST /teams`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTeam {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub member_ids: Vec<DbId>,
}

/// Request body for `PUT /teams/{id}`. All fields optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTeam {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Request body for `PUT /teams/{id}/members`.
#[derive(Debug, Clone, Deserialize)]
pub struct SetTeamMembers {
    pub member_ids: Vec<DbId>,
}
