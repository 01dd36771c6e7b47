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

//! Evaluation loop orchestrator
//!
//! For every criterion the loop runs `iterations` rounds; each round asks every
//! judge once, either concurrently or one after another. All verdicts, ERROR
//! sentinels included, feed the consensus for that criterion.

use crate::config::{BackendConfig, EvaluationLoopConfig};
use crate::consensus::calculate_consensus;
use crate::judge::JudgeClient;
use crate::EvalError;
use judgeloop_core::{ConsensusResult, EvaluationResult, SemanticCriterion};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Main evaluation loop orchestrator
#[derive(Debug, Clone)]
pub struct EvaluationLoop {
    config: EvaluationLoopConfig,
    judges: Vec<JudgeClient>,
}

impl EvaluationLoop {
    /// Create one judge per configured evaluator id. No network calls are made;
    /// missing credentials surface as ERROR verdicts on first use.
    pub fn new(config: EvaluationLoopConfig, backends: &BackendConfig) -> Result<Self, EvalError> {
        config.validate()?;

        let judges = config
            .evaluator_ids
            .iter()
            .map(|id| JudgeClient::from_model(id, backends))
            .collect();

        Ok(Self::assemble(config, judges))
    }

    /// Create a loop over explicit judges. Judge order replaces `config.evaluator_ids`.
    pub fn with_judges(
        mut config: EvaluationLoopConfig,
        judges: Vec<JudgeClient>,
    ) -> Result<Self, EvalError> {
        config.evaluator_ids = judges
            .iter()
            .map(|j| j.evaluator_id().to_string())
            .collect();
        config.validate()?;

        Ok(Self::assemble(config, judges))
    }

    fn assemble(config: EvaluationLoopConfig, judges: Vec<JudgeClient>) -> Self {
        if judges.is_empty() {
            warn!("Evaluation loop has no judges; every criterion will fail with score 0.0");
        }

        info!(
            "Evaluation loop ready: {} judge(s), {} iteration(s), threshold {}, {}",
            judges.len(),
            config.iterations,
            config.consensus_threshold,
            if config.parallel_execution {
                "parallel"
            } else {
                "sequential"
            }
        );

        Self { config, judges }
    }

    pub fn config(&self) -> &EvaluationLoopConfig {
        &self.config
    }

    pub fn judges(&self) -> &[JudgeClient] {
        &self.judges
    }

    /// Evaluate a response against every criterion, in order
    ///
    /// Returns one result per criterion. Judge failures lower the score of the
    /// affected criterion; only malformed criteria produce an error.
    pub async fn evaluate_response(
        &self,
        user_input: &str,
        agent_response: &str,
        criteria: &[SemanticCriterion],
    ) -> Result<Vec<ConsensusResult>, EvalError> {
        if let Some(bad) = criteria.iter().find(|c| !c.has_valid_weight()) {
            return Err(EvalError::InvalidInput(format!(
                "criterion '{}' has invalid weight {}",
                bad.criterion, bad.weight
            )));
        }

        let mut results = Vec::with_capacity(criteria.len());
        for criterion in criteria {
            let result = self
                .evaluate_single_criterion(user_input, agent_response, criterion)
                .await;

            info!(
                "Criterion '{}': consensus {:.3} ({} verdicts, {} errors) -> {}",
                result.criterion,
                result.consensus_score,
                result.individual_results.len(),
                result.error_count(),
                if result.passed { "PASS" } else { "FAIL" }
            );
            results.push(result);
        }

        Ok(results)
    }

    /// Run every round for one criterion and aggregate the verdicts
    pub async fn evaluate_single_criterion(
        &self,
        user_input: &str,
        agent_response: &str,
        criterion: &SemanticCriterion,
    ) -> ConsensusResult {
        let iterations = self.config.iterations as usize;
        let mut evaluations = Vec::with_capacity(iterations * self.judges.len());

        for iteration in 0..iterations {
            let round = if self.config.parallel_execution {
                self.run_parallel_round(user_input, agent_response, criterion)
                    .await
            } else {
                self.run_sequential_round(user_input, agent_response, criterion)
                    .await
            };

            debug!(
                "Round {}/{} for '{}' collected {} verdicts",
                iteration + 1,
                iterations,
                criterion.criterion,
                round.len()
            );
            evaluations.extend(round);
        }

        calculate_consensus(criterion, evaluations, self.config.consensus_threshold)
    }

    async fn run_sequential_round(
        &self,
        user_input: &str,
        agent_response: &str,
        criterion: &SemanticCriterion,
    ) -> Vec<EvaluationResult> {
        let mut round = Vec::with_capacity(self.judges.len());
        for judge in &self.judges {
            let start = Instant::now();
            let outcome = AssertUnwindSafe(judge.evaluate(user_input, agent_response, criterion))
                .catch_unwind()
                .await;

            round.push(match outcome {
                Ok(result) => result,
                Err(payload) => {
                    let reason = format!("panicked with message {:?}", panic_message(&*payload));
                    error!("Judge {} {}", judge.evaluator_id(), reason);
                    aborted_verdict(criterion, judge, reason, start)
                }
            });
        }
        round
    }

    /// Fan out one call per judge and join them all. Results come back in judge
    /// order; a task that dies is recorded as an ERROR verdict for its judge.
    async fn run_parallel_round(
        &self,
        user_input: &str,
        agent_response: &str,
        criterion: &SemanticCriterion,
    ) -> Vec<EvaluationResult> {
        let start = Instant::now();
        let user_input: Arc<str> = Arc::from(user_input);
        let agent_response: Arc<str> = Arc::from(agent_response);
        let shared_criterion = Arc::new(criterion.clone());

        let tasks = self.judges.iter().map(|judge| {
            let judge = judge.clone();
            let user_input = Arc::clone(&user_input);
            let agent_response = Arc::clone(&agent_response);
            let criterion = Arc::clone(&shared_criterion);

            tokio::spawn(async move {
                judge
                    .evaluate(&user_input, &agent_response, &criterion)
                    .await
            })
        });

        futures::future::join_all(tasks)
            .await
            .into_iter()
            .zip(&self.judges)
            .map(|(outcome, judge)| match outcome {
                Ok(result) => result,
                Err(e) => {
                    error!("Judge task {} panicked: {}", judge.evaluator_id(), e);
                    aborted_verdict(criterion, judge, e.to_string(), start)
                }
            })
            .collect()
    }
}

/// ERROR verdict for a judge call that panicked instead of returning
fn aborted_verdict(
    criterion: &SemanticCriterion,
    judge: &JudgeClient,
    reason: String,
    start: Instant,
) -> EvaluationResult {
    EvaluationResult::error(
        criterion.criterion.clone(),
        judge.evaluator_id(),
        format!("Evaluation failed: judge task aborted: {}", reason),
        start.elapsed().as_secs_f64(),
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
