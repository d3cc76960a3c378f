//! Client for OpenAI-compatible chat completion and embedding endpoints.

use async_trait::async_trait;
use serde::Deserialize;

use super::{Embedder, LanguageModel, ModelReply, ToolPrompt, TriageConfig, TriageError};

/// HTTP client for one OpenAI-compatible API.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    embedding_model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    /// JSON-encoded arguments, as a string.
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiClient {
    /// Build a client from the triage configuration.
    ///
    /// Returns `None` when no API key is configured.
    pub fn from_config(config: &TriageConfig) -> Option<Self> {
        let api_key = config.openai_api_key.clone()?;
        Some(Self::with_client(reqwest::Client::new(), config, api_key))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: &TriageConfig, api_key: String) -> Self {
        Self {
            client,
            base_url: config.openai_base_url.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            embedding_model: config.embedding_model.clone(),
        }
    }

    // ---- private helpers ----

    /// Return the response unchanged on success, or an
    /// [`TriageError::Api`] with the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, TriageError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TriageError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, TriageError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn invoke_tool(&self, prompt: &ToolPrompt) -> Result<Option<String>, TriageError> {
        Ok(self.chat(prompt).await?.tool_arguments)
    }

    async fn chat(&self, prompt: &ToolPrompt) -> Result<ModelReply, TriageError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
            "tools": [{
                "type": "function",
                "function": {
                    "name": prompt.tool_name,
                    "description": prompt.tool_description,
                    "parameters": prompt.parameters,
                },
            }],
        });

        let response: ChatResponse = self.post_json("/chat/completions", &body).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TriageError::MalformedResponse("no choices returned".into()))?;

        let message = choice.message;
        let tool_arguments = message
            .tool_calls
            .into_iter()
            .find(|call| call.function.name == prompt.tool_name)
            .map(|call| call.function.arguments);
        Ok(ModelReply {
            content: message.content.filter(|c| !c.trim().is_empty()),
            tool_arguments,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, input: &str) -> Result<Vec<f32>, TriageError> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": input,
        });

        let response: EmbeddingResponse = self.post_json("/embeddings", &body).await?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| TriageError::MalformedResponse("no embedding returned".into()))
    }
}
