//! Automatic ticket triage.
//!
//! When a ticket is created, its text is embedded, the closest teams are
//! found by cosine similarity, and a language model picks one team and a
//! priority through a single tool call. One random member of that team is
//! assigned through the regular audited update path, as an internal update
//! by the triage bot.
//!
//! - [`openai`] -- OpenAI-compatible chat and embedding client.
//! - [`service`] -- The triage run itself and team embedding upkeep.
//! - [`assistant`] -- The agent chat assistant, which shares the model.
//!
//! Triage is advisory: failures are logged and never affect the ticket that
//! triggered them.

pub mod assistant;
pub mod openai;
pub mod service;

use async_trait::async_trait;
use autocrm_core::error::CoreError;
use serde_json::Value;

use crate::error::AppError;

pub use assistant::AssistantReply;
pub use service::{TriageOutcome, TriageService};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_TEMPERATURE: f32 = 0.1;
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_CANDIDATE_TEAMS: i64 = 8;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_BOT_EMAIL: &str = "triagebot@autocrm.local";

/// Triage settings loaded from the environment.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Triage is disabled when unset.
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Must produce 1536-dimensional vectors to match `team_embeddings`.
    pub embedding_model: String,
    /// How many teams the similarity search offers to the model.
    pub candidate_teams: i64,
    /// Execution budget for one triage run.
    pub timeout_secs: u64,
    /// Bearer secret for the webhook. The webhook rejects every call when unset.
    pub webhook_secret: Option<String>,
    /// Email of the seeded profile recorded as the author of triage updates.
    pub bot_email: String,
}

impl TriageConfig {
    /// Load triage configuration from environment variables.
    ///
    /// | Env Var                  | Default                     |
    /// |--------------------------|-----------------------------|
    /// | `OPENAI_API_KEY`         | unset (triage disabled)     |
    /// | `OPENAI_BASE_URL`        | `https://api.openai.com/v1` |
    /// | `TRIAGE_MODEL`           | `gpt-4o`                    |
    /// | `TRIAGE_TEMPERATURE`     | `0.1`                       |
    /// | `EMBEDDING_MODEL`        | `text-embedding-3-small`    |
    /// | `TRIAGE_CANDIDATE_TEAMS` | `8`                         |
    /// | `TRIAGE_TIMEOUT_SECS`    | `60`                        |
    /// | `TRIAGE_WEBHOOK_SECRET`  | unset                       |
    /// | `TRIAGE_BOT_EMAIL`       | `triagebot@autocrm.local`   |
    pub fn from_env() -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Self {
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_base_url: non_empty("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            model: non_empty("TRIAGE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            temperature: non_empty("TRIAGE_TEMPERATURE")
                .map(|v| v.parse().expect("TRIAGE_TEMPERATURE must be a valid f32"))
                .unwrap_or(DEFAULT_TEMPERATURE),
            embedding_model: non_empty("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.into()),
            candidate_teams: non_empty("TRIAGE_CANDIDATE_TEAMS")
                .map(|v| v.parse().expect("TRIAGE_CANDIDATE_TEAMS must be a valid i64"))
                .unwrap_or(DEFAULT_CANDIDATE_TEAMS),
            timeout_secs: non_empty("TRIAGE_TIMEOUT_SECS")
                .map(|v| v.parse().expect("TRIAGE_TIMEOUT_SECS must be a valid u64"))
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            webhook_secret: non_empty("TRIAGE_WEBHOOK_SECRET"),
            bot_email: non_empty("TRIAGE_BOT_EMAIL").unwrap_or_else(|| DEFAULT_BOT_EMAIL.into()),
        }
    }
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            temperature: DEFAULT_TEMPERATURE,
            embedding_model: DEFAULT_EMBEDDING_MODEL.into(),
            candidate_teams: DEFAULT_CANDIDATE_TEAMS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            webhook_secret: None,
            bot_email: DEFAULT_BOT_EMAIL.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while triaging a ticket or embedding a team.
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The model or embedding API returned a non-2xx status code.
    #[error("Model API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The API answered 2xx with a body we cannot use.
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Triage exceeded its {0}s budget")]
    Timeout(u64),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl TriageError {
    /// Failures that end a run quietly: the upstream services misbehaved or
    /// the ticket or team vanished. Anything else is a fault on our side.
    pub fn is_swallowed(&self) -> bool {
        matches!(
            self,
            TriageError::Request(_)
                | TriageError::Api { .. }
                | TriageError::MalformedResponse(_)
                | TriageError::Timeout(_)
                | TriageError::Core(CoreError::ExternalService(_))
                | TriageError::Core(CoreError::NotFound { .. })
        )
    }
}

/// Assistant calls surface model failures to the agent as 502.
impl From<TriageError> for AppError {
    fn from(err: TriageError) -> Self {
        match err {
            TriageError::Core(e) => AppError::Core(e),
            TriageError::Database(e) => AppError::Database(e),
            other => AppError::Core(CoreError::ExternalService(other.to_string())),
        }
    }
}

impl From<AppError> for TriageError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Core(e) => TriageError::Core(e),
            AppError::Database(e) => TriageError::Database(e),
            AppError::BadRequest(msg) => TriageError::Core(CoreError::Validation(msg)),
            AppError::InternalError(msg) => TriageError::Core(CoreError::Internal(msg)),
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// A chat prompt offering exactly one tool.
#[derive(Debug, Clone)]
pub struct ToolPrompt {
    pub system: String,
    pub user: String,
    pub tool_name: String,
    pub tool_description: String,
    /// JSON schema of the tool arguments.
    pub parameters: Value,
}

/// A model answer: prose, a tool call, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub content: Option<String>,
    /// Raw JSON arguments of the first call to the offered tool.
    pub tool_arguments: Option<String>,
}

/// A chat model that may answer with a tool call.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the raw JSON arguments of the first call to
    /// `prompt.tool_name`, or `None` when the model answered in prose.
    async fn invoke_tool(&self, prompt: &ToolPrompt) -> Result<Option<String>, TriageError>;

    /// The whole answer, prose included. Models that only report tool calls
    /// answer without content.
    async fn chat(&self, prompt: &ToolPrompt) -> Result<ModelReply, TriageError> {
        Ok(ModelReply {
            content: None,
            tool_arguments: self.invoke_tool(prompt).await?,
        })
    }
}

/// A text embedding model.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, input: &str) -> Result<Vec<f32>, TriageError>;
}
