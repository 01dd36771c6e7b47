// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! LLM client abstraction for judge backends
//!
//! Every backend reduces to one capability: send a prompt, get raw reply text.
//! Verdict parsing happens one layer up in [`crate::judge`].

use crate::config::BackendConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Sampling temperature sent to every backend
pub const JUDGE_TEMPERATURE: f64 = 0.1;

/// Completion budget sent to every backend
pub const JUDGE_MAX_TOKENS: u32 = 200;

/// Request timeout for hosted vendor APIs
pub const REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Request timeout for the local inference server
pub const LOCAL_TIMEOUT: Duration = Duration::from_secs(60);

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Model id prefix that routes to the local backend and is stripped before sending
pub const LOCAL_PREFIX: &str = "local-";

/// Trait for LLM clients used as judges
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Send a prompt and return the raw reply text
    async fn complete(&self, prompt: &str) -> Result<String, LLMError>;

    /// Get model name
    fn model_name(&self) -> &str;

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Custom
    }
}

/// Backend family of a judge model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Chat-completion API with bearer auth
    OpenAI,
    /// Messages API with api-key header auth
    Anthropic,
    /// Ollama-style local inference server
    Local,
    /// No built-in transport
    Custom,
}

impl BackendKind {
    /// Route a model identifier to its backend by name prefix
    pub fn detect(model_id: &str) -> Self {
        const OPENAI: &[&str] = &["gpt-", "o1-"];
        const ANTHROPIC: &[&str] = &["claude-", "sonnet", "haiku", "opus"];
        const LOCAL: &[&str] = &["llama", "mistral", LOCAL_PREFIX];

        let matches = |prefixes: &[&str]| prefixes.iter().any(|p| model_id.starts_with(p));

        if matches(OPENAI) {
            BackendKind::OpenAI
        } else if matches(ANTHROPIC) {
            BackendKind::Anthropic
        } else if matches(LOCAL) {
            BackendKind::Local
        } else {
            BackendKind::Custom
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::OpenAI => "openai",
            BackendKind::Anthropic => "anthropic",
            BackendKind::Local => "local",
            BackendKind::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// Errors from LLM clients
#[derive(Debug, Error)]
pub enum LLMError {
    #[error("{provider} API key not provided (set {env_var})")]
    MissingCredential {
        provider: &'static str,
        env_var: &'static str,
    },

    #[error("No backend implemented for evaluator '{0}'")]
    NotImplemented(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LLMError {
    fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            LLMError::Timeout(timeout)
        } else {
            LLMError::Transport(err.to_string())
        }
    }

    /// True for configuration failures (as opposed to network or reply failures)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LLMError::MissingCredential { .. } | LLMError::NotImplemented(_)
        )
    }
}

/// Send a prepared request and decode the JSON reply, mapping every failure to `LLMError`
async fn send_json(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<serde_json::Value, LLMError> {
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| LLMError::from_transport(e, timeout))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| LLMError::from_transport(e, timeout))?;

    if !status.is_success() {
        return Err(LLMError::ApiError {
            status: status.as_u16(),
            body,
        });
    }

    Ok(serde_json::from_str(&body)?)
}

fn require_key<'a>(
    key: &'a Option<String>,
    provider: &'static str,
    env_var: &'static str,
) -> Result<&'a str, LLMError> {
    key.as_deref()
        .filter(|k| !k.is_empty())
        .ok_or(LLMError::MissingCredential { provider, env_var })
}

/// Build the shared backend for a model id. Performs no I/O.
pub fn create_client(model_id: &str, backends: &BackendConfig) -> Arc<dyn LLMClient> {
    match BackendKind::detect(model_id) {
        BackendKind::OpenAI => Arc::new(
            OpenAIClient::new(backends.openai_api_key.clone(), model_id.to_string())
                .with_base_url(backends.openai_base_url.clone()),
        ),
        BackendKind::Anthropic => Arc::new(
            AnthropicClient::new(backends.anthropic_api_key.clone(), model_id.to_string())
                .with_base_url(backends.anthropic_base_url.clone()),
        ),
        BackendKind::Local => Arc::new(OllamaClient::new(
            backends.local_endpoint.clone(),
            model_id.to_string(),
        )),
        BackendKind::Custom => Arc::new(UnconfiguredClient::new(model_id.to_string())),
    }
}

/// OpenAI chat-completion client
pub struct OpenAIClient {
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(api_key: Option<String>, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: REMOTE_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn complete(&self, prompt: &str) -> Result<String, LLMError> {
        let api_key = require_key(&self.api_key, "OpenAI", "OPENAI_API_KEY")?;

        let request = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "temperature": JUDGE_TEMPERATURE,
            "max_tokens": JUDGE_MAX_TOKENS
        });

        let response_data = send_json(
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&request),
            self.timeout,
        )
        .await?;

        response_data["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LLMError::InvalidResponse("Missing choices[0].message.content".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::OpenAI
    }
}

/// Anthropic Claude messages client
pub struct AnthropicClient {
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: Option<String>, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.anthropic.com/v1".to_string(),
            timeout: REMOTE_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl LLMClient for AnthropicClient {
    async fn complete(&self, prompt: &str) -> Result<String, LLMError> {
        let api_key = require_key(&self.api_key, "Anthropic", "ANTHROPIC_API_KEY")?;

        let request = serde_json::json!({
            "model": self.model,
            "max_tokens": JUDGE_MAX_TOKENS,
            "temperature": JUDGE_TEMPERATURE,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ]
        });

        let response_data = send_json(
            self.client
                .post(format!("{}/messages", self.base_url))
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("Content-Type", "application/json")
                .json(&request),
            self.timeout,
        )
        .await?;

        response_data["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LLMError::InvalidResponse("Missing content[0].text".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Anthropic
    }
}

/// Ollama-compatible local inference client
pub struct OllamaClient {
    endpoint: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(endpoint: String, model: String) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            timeout: LOCAL_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Model name as the local server knows it
    pub fn served_model(&self) -> &str {
        self.model.strip_prefix(LOCAL_PREFIX).unwrap_or(&self.model)
    }
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, LLMError> {
        let request = serde_json::json!({
            "model": self.served_model(),
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": JUDGE_TEMPERATURE,
                "num_predict": JUDGE_MAX_TOKENS
            }
        });

        let response_data = send_json(
            self.client
                .post(format!("{}/api/generate", self.endpoint))
                .json(&request),
            self.timeout,
        )
        .await?;

        response_data["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LLMError::InvalidResponse("Missing response".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Local
    }
}

/// Fallback for model ids no backend claims. Every call fails with `NotImplemented`;
/// supply a real [`LLMClient`] through [`crate::judge::JudgeClient::new`] instead.
pub struct UnconfiguredClient {
    model: String,
}

impl UnconfiguredClient {
    pub fn new(model: String) -> Self {
        Self { model }
    }
}

#[async_trait]
impl LLMClient for UnconfiguredClient {
    async fn complete(&self, _prompt: &str) -> Result<String, LLMError> {
        Err(LLMError::NotImplemented(self.model.clone()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
