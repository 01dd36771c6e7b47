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

//! Evaluation loop and judge backend configuration

use crate::EvalError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Configuration for the evaluation loop
///
/// `Default::default()` and deserialization differ in one place: a config built
/// in code runs 3 iterations, a config read from a mapping or file runs 1 unless
/// `iterations` is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationLoopConfig {
    /// Rounds per criterion; every judge is asked once per round
    #[serde(default = "default_mapping_iterations")]
    pub iterations: u32,

    /// Judge model ids. Order determines judge order within a round.
    #[serde(default = "default_evaluator_ids", alias = "evaluator_models")]
    pub evaluator_ids: Vec<String>,

    /// Minimum YES fraction for a criterion to pass (inclusive)
    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: f64,

    /// Timeout in seconds for the caller's agent invocation.
    /// Judge calls use their backend's fixed timeout.
    #[serde(default = "default_timeout_secs", alias = "timeout")]
    pub timeout_secs: u64,

    /// Fan out judge calls within a round concurrently
    #[serde(default = "default_parallel_execution")]
    pub parallel_execution: bool,

    /// Reserved. Judge calls are not retried by the loop.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
}

fn default_mapping_iterations() -> u32 {
    1
}

fn default_evaluator_ids() -> Vec<String> {
    vec!["claude-sonnet-4".to_string()]
}

fn default_consensus_threshold() -> f64 {
    0.67
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_parallel_execution() -> bool {
    true
}

fn default_retry_count() -> u32 {
    2
}

impl Default for EvaluationLoopConfig {
    fn default() -> Self {
        Self {
            iterations: 3,
            evaluator_ids: default_evaluator_ids(),
            consensus_threshold: default_consensus_threshold(),
            timeout_secs: default_timeout_secs(),
            parallel_execution: default_parallel_execution(),
            retry_count: default_retry_count(),
        }
    }
}

impl EvaluationLoopConfig {
    /// Build from a JSON-like mapping; absent keys take mapping defaults
    pub fn from_mapping(mapping: serde_json::Value) -> Result<Self, EvalError> {
        let config: Self = serde_json::from_value(mapping)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EvalError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_evaluators<I, S>(mut self, evaluator_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.evaluator_ids = evaluator_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.consensus_threshold = threshold;
        self
    }

    pub fn with_parallel_execution(mut self, parallel: bool) -> Self {
        self.parallel_execution = parallel;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), EvalError> {
        if self.iterations == 0 {
            return Err(EvalError::InvalidConfig(
                "iterations must be at least 1".to_string(),
            ));
        }

        if !self.consensus_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.consensus_threshold)
        {
            return Err(EvalError::InvalidConfig(format!(
                "consensus_threshold must be within [0, 1], got {}",
                self.consensus_threshold
            )));
        }

        let mut seen = HashSet::new();
        for id in &self.evaluator_ids {
            if !seen.insert(id.as_str()) {
                return Err(EvalError::InvalidConfig(format!(
                    "duplicate evaluator id: {}",
                    id
                )));
            }
        }

        Ok(())
    }
}

/// Credentials and endpoints for judge backends
///
/// Passed explicitly into each backend; only [`BackendConfig::from_env`] touches
/// the process environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// OpenAI API key
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// Anthropic API key
    #[serde(default)]
    pub anthropic_api_key: Option<String>,

    /// Local inference server base URL (e.g., "http://localhost:11434")
    #[serde(default = "default_local_endpoint")]
    pub local_endpoint: String,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
}

fn default_local_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            anthropic_api_key: None,
            local_endpoint: default_local_endpoint(),
            openai_base_url: default_openai_base_url(),
            anthropic_base_url: default_anthropic_base_url(),
        }
    }
}

impl BackendConfig {
    /// Load backend settings from environment variables
    ///
    /// Supported environment variables:
    /// - OPENAI_API_KEY: key for `gpt-*` / `o1-*` judges
    /// - ANTHROPIC_API_KEY: key for `claude-*` / `sonnet*` / `haiku*` / `opus*` judges
    /// - OLLAMA_BASE_URL: local inference endpoint (default: http://localhost:11434)
    ///
    /// Empty values are treated as unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve backend settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        config.openai_api_key = var("OPENAI_API_KEY");
        config.anthropic_api_key = var("ANTHROPIC_API_KEY");

        if let Some(base_url) = var("OLLAMA_BASE_URL") {
            config.local_endpoint = base_url;
        }

        config
    }
}
