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

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single judge's decision on one criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Yes,
    No,
    /// The judge call failed; counts as a NO vote
    Error,
}

impl Decision {
    /// Binary vote value used by consensus (YES -> 1.0, anything else -> 0.0)
    pub fn score(self) -> f64 {
        match self {
            Decision::Yes => 1.0,
            Decision::No | Decision::Error => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Yes => "YES",
            Decision::No => "NO",
            Decision::Error => "ERROR",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One judge's verdict for one criterion in one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Criterion text this verdict refers to
    pub criterion: String,

    /// Model identifier of the judge that produced the verdict
    pub evaluator_id: String,

    pub decision: Decision,

    /// Confidence (0.0 - 1.0). Fixed at 1.0 for parsed verdicts, 0.0 for errors.
    pub confidence: f64,

    /// Judge explanation, or the failure description for ERROR verdicts
    pub reasoning: String,

    /// Wall-clock duration of the judge call in seconds
    pub execution_time: f64,
}

impl EvaluationResult {
    /// Build the ERROR sentinel recorded when a judge call fails
    pub fn error(
        criterion: impl Into<String>,
        evaluator_id: impl Into<String>,
        reasoning: impl Into<String>,
        execution_time: f64,
    ) -> Self {
        Self {
            criterion: criterion.into(),
            evaluator_id: evaluator_id.into(),
            decision: Decision::Error,
            confidence: 0.0,
            reasoning: reasoning.into(),
            execution_time,
        }
    }

    pub fn is_error(&self) -> bool {
        self.decision == Decision::Error
    }
}

/// Aggregated verdict for one criterion across all iterations and judges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub criterion: String,

    /// Fraction of YES votes (0.0 - 1.0)
    pub consensus_score: f64,

    /// `consensus_score >= consensus_threshold`
    pub passed: bool,

    /// Every collected verdict, round-major then judge order
    #[serde(default)]
    pub individual_results: Vec<EvaluationResult>,

    /// `consensus_score * criterion.weight`
    pub weighted_score: f64,
}

impl ConsensusResult {
    /// Number of collected verdicts that were ERROR sentinels
    pub fn error_count(&self) -> usize {
        self.individual_results
            .iter()
            .filter(|r| r.is_error())
            .count()
    }
}

/// Roll-up over the consensus results of one response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub mean_consensus_score: f64,
    pub total_weighted_score: f64,
}

impl ConsensusSummary {
    pub fn from_results(results: &[ConsensusResult]) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        let mean_consensus_score = if total > 0 {
            results.iter().map(|r| r.consensus_score).sum::<f64>() / total as f64
        } else {
            0.0
        };

        Self {
            total,
            passed,
            failed: total - passed,
            mean_consensus_score,
            total_weighted_score: results.iter().fold(0.0, |acc, r| acc + r.weighted_score),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for ConsensusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Criteria: {}/{} passed, {:.1}% mean consensus, {:.3} weighted score",
            self.passed,
            self.total,
            self.mean_consensus_score * 100.0,
            self.total_weighted_score
        )
    }
}
