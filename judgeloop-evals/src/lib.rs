// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! # Judgeloop Evaluation Engine
//!
//! Multi-judge semantic evaluation of agent responses.
//!
//! ## Features
//!
//! - **LLM-as-judge**: OpenAI, Anthropic and local (Ollama) judge backends
//! - **Robust verdict parsing**: JSON wrapped in prose or code fences, with a
//!   plain-text fallback
//! - **Consensus**: repeated rounds across several judges, aggregated into a
//!   YES fraction checked against a threshold
//! - **Failure isolation**: a failing judge call becomes an ERROR vote instead of
//!   aborting the evaluation
//!
//! ## Example
//!
//! ```rust,ignore
//! use judgeloop_evals::{BackendConfig, EvaluationLoop, EvaluationLoopConfig, SemanticCriterion};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), judgeloop_evals::EvalError> {
//!     let config = EvaluationLoopConfig::default()
//!         .with_evaluators(["gpt-4o-mini", "claude-3-5-haiku-20241022"]);
//!     let evaluation = EvaluationLoop::new(config, &BackendConfig::from_env())?;
//!
//!     let results = evaluation
//!         .evaluate_response(
//!             "Hi, I'm new here",
//!             "Welcome! Since you're a new customer, here is a 10% discount.",
//!             &[SemanticCriterion::new("Response should acknowledge new customer status")],
//!         )
//!         .await?;
//!
//!     for result in &results {
//!         println!("{}: {:.2} passed={}", result.criterion, result.consensus_score, result.passed);
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

pub mod config;
pub mod consensus;
pub mod evaluation_loop;
pub mod judge;
pub mod llm_client;

pub use config::{BackendConfig, EvaluationLoopConfig};
pub use consensus::calculate_consensus;
pub use evaluation_loop::EvaluationLoop;
pub use judge::{build_evaluation_prompt, parse_verdict, JudgeClient, ParsedVerdict};
pub use judgeloop_core::{
    ConsensusResult, ConsensusSummary, Decision, EvaluationResult, SemanticCriterion,
};
pub use llm_client::{create_client, BackendKind, LLMClient, LLMError};

/// Errors surfaced by the evaluation engine
///
/// Judge backend failures never appear here; they are recorded as ERROR verdicts.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
