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

//! Consensus aggregation over individual judge verdicts

use judgeloop_core::{ConsensusResult, EvaluationResult, SemanticCriterion};

/// Aggregate verdicts for one criterion into a consensus result
///
/// Consensus score = mean of per-verdict votes (YES = 1.0, NO and ERROR = 0.0)
/// over every verdict. `passed` is `score >= threshold`; weight only scales
/// `weighted_score`. An empty verdict set scores 0.0 and fails.
pub fn calculate_consensus(
    criterion: &SemanticCriterion,
    evaluations: Vec<EvaluationResult>,
    threshold: f64,
) -> ConsensusResult {
    if evaluations.is_empty() {
        return ConsensusResult {
            criterion: criterion.criterion.clone(),
            consensus_score: 0.0,
            passed: false,
            individual_results: Vec::new(),
            weighted_score: 0.0,
        };
    }

    let yes_votes: f64 = evaluations.iter().map(|e| e.decision.score()).sum();
    let consensus_score = yes_votes / evaluations.len() as f64;

    ConsensusResult {
        criterion: criterion.criterion.clone(),
        consensus_score,
        passed: consensus_score >= threshold,
        individual_results: evaluations,
        weighted_score: consensus_score * criterion.weight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use judgeloop_core::Decision;

    fn verdict(decision: Decision) -> EvaluationResult {
        EvaluationResult {
            criterion: "c".to_string(),
            evaluator_id: "judge".to_string(),
            decision,
            confidence: if decision == Decision::Error { 0.0 } else { 1.0 },
            reasoning: String::new(),
            execution_time: 0.0,
        }
    }

    fn verdicts(yes: usize, no: usize, errors: usize) -> Vec<EvaluationResult> {
        std::iter::repeat(Decision::Yes)
            .take(yes)
            .chain(std::iter::repeat(Decision::No).take(no))
            .chain(std::iter::repeat(Decision::Error).take(errors))
            .map(verdict)
            .collect()
    }

    #[test]
    fn test_empty_verdicts() {
        let criterion = SemanticCriterion::new("c").with_weight(3.0);
        let result = calculate_consensus(&criterion, vec![], 0.0);

        assert_eq!(result.consensus_score, 0.0);
        assert!(!result.passed);
        assert_eq!(result.weighted_score, 0.0);
        assert!(result.individual_results.is_empty());
    }

    #[test]
    fn test_score_is_yes_fraction() {
        let criterion = SemanticCriterion::new("c");
        for n in 1..=7 {
            for k in 0..=n {
                let result = calculate_consensus(&criterion, verdicts(k, n - k, 0), 0.67);
                let expected = k as f64 / n as f64;
                assert!((result.consensus_score - expected).abs() < 1e-9);
                assert_eq!(result.passed, expected >= 0.67);
                assert_eq!(result.individual_results.len(), n);
            }
        }
    }

    #[test]
    fn test_errors_count_as_no() {
        let criterion = SemanticCriterion::new("c");
        let result = calculate_consensus(&criterion, verdicts(2, 0, 2), 0.67);

        assert!((result.consensus_score - 0.5).abs() < 1e-9);
        assert!(!result.passed);
        assert_eq!(result.error_count(), 2);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let criterion = SemanticCriterion::new("c");
        let result = calculate_consensus(&criterion, verdicts(1, 1, 0), 0.5);
        assert_eq!(result.consensus_score, 0.5);
        assert!(result.passed);

        let result = calculate_consensus(&criterion, verdicts(0, 3, 0), 0.0);
        assert!(result.passed);

        let result = calculate_consensus(&criterion, verdicts(3, 0, 0), 1.0);
        assert!(result.passed);
    }

    #[test]
    fn test_weight_scales_but_does_not_gate() {
        let heavy = SemanticCriterion::new("c").with_weight(2.5);
        let result = calculate_consensus(&heavy, verdicts(1, 3, 0), 0.67);
        assert!((result.weighted_score - 0.625).abs() < 1e-9);
        assert!(!result.passed);

        let zero = SemanticCriterion::new("c").with_weight(0.0);
        let result = calculate_consensus(&zero, verdicts(3, 0, 0), 0.67);
        assert_eq!(result.weighted_score, 0.0);
        assert!(result.passed);
    }

    #[test]
    fn test_preserves_verdict_order() {
        let criterion = SemanticCriterion::new("c");
        let mut input = verdicts(1, 1, 1);
        for (i, v) in input.iter_mut().enumerate() {
            v.evaluator_id = format!("judge-{}", i);
        }

        let result = calculate_consensus(&criterion, input.clone(), 0.5);
        assert_eq!(result.individual_results, input);
    }
}
