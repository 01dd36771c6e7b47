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

//! Semantic criterion judging using LLM-as-judge
//!
//! A [`JudgeClient`] asks one backend model whether an agent response meets a
//! criterion and turns the free-text reply into a YES/NO verdict. Backend
//! failures are folded into an ERROR verdict so callers never see them as errors.

use crate::config::BackendConfig;
use crate::llm_client::{create_client, BackendKind, LLMClient};
use judgeloop_core::{Decision, EvaluationResult, SemanticCriterion};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Greedy, newline-spanning: first `{` through last `}`
static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("Invalid regex pattern"));

const NO_REASONING: &str = "No reasoning provided";
const FALLBACK_REASONING: &str = "Parsed from non-JSON response";

/// Verdict extracted from a judge's raw reply
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedVerdict {
    /// Always YES or NO
    pub decision: Decision,
    pub confidence: f64,
    pub reasoning: String,
}

/// Build the fixed-format evaluation prompt
pub fn build_evaluation_prompt(
    user_input: &str,
    agent_response: &str,
    criterion: &SemanticCriterion,
) -> String {
    format!(
        r#"You are an expert evaluator assessing AI agent responses.

USER INPUT: "{user_input}"
AGENT RESPONSE: "{agent_response}"
EVALUATION CRITERION: "{criterion}"

Evaluate whether the agent response meets the criterion. Consider:
- Semantic meaning, not just exact words
- Overall intent and appropriateness
- Context and tone

Respond in this exact JSON format:
{{
    "decision": "YES|NO",
    "reasoning": "Brief explanation of your evaluation"
}}

Decision guide:
- YES: The response meets the criterion
- NO: The response does not meet the criterion

You must choose either YES or NO. Be precise and objective in your evaluation."#,
        user_input = user_input,
        agent_response = agent_response,
        criterion = criterion.criterion,
    )
}

/// Parse a judge reply into a verdict. Never fails.
///
/// 1. The first-`{`-to-last-`}` span is parsed as JSON; `decision` is upper-cased
///    and anything other than YES or NO becomes NO.
/// 2. Otherwise the whole reply is searched for "YES" (case-insensitive).
///
/// Confidence is always 1.0; judge-reported confidence is ignored.
pub fn parse_verdict(raw: &str) -> ParsedVerdict {
    parse_structured(raw).unwrap_or_else(|| {
        let decision = if raw.to_uppercase().contains("YES") {
            Decision::Yes
        } else {
            Decision::No
        };

        ParsedVerdict {
            decision,
            confidence: 1.0,
            reasoning: FALLBACK_REASONING.to_string(),
        }
    })
}

fn parse_structured(raw: &str) -> Option<ParsedVerdict> {
    let candidate = JSON_OBJECT.find(raw)?.as_str();
    let value: Value = serde_json::from_str(candidate).ok()?;
    let object = value.as_object()?;

    let decision = match object.get("decision") {
        None => Decision::No,
        Some(Value::String(s)) if s.to_uppercase() == "YES" => Decision::Yes,
        Some(Value::String(_)) => Decision::No,
        // Non-string decisions are not a structured verdict
        Some(_) => return None,
    };

    let reasoning = match object.get("reasoning") {
        None | Some(Value::Null) => NO_REASONING.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    Some(ParsedVerdict {
        decision,
        confidence: 1.0,
        reasoning,
    })
}

/// One configured judge: an evaluator id bound to a backend
#[derive(Clone)]
pub struct JudgeClient {
    evaluator_id: String,
    backend: Arc<dyn LLMClient>,
}

impl JudgeClient {
    /// Wrap an explicit backend, e.g. a custom [`LLMClient`] for ids no built-in backend handles
    pub fn new(evaluator_id: impl Into<String>, backend: Arc<dyn LLMClient>) -> Self {
        Self {
            evaluator_id: evaluator_id.into(),
            backend,
        }
    }

    /// Build the judge for a model id using prefix-based backend selection
    pub fn from_model(model_id: &str, backends: &BackendConfig) -> Self {
        Self::new(model_id, create_client(model_id, backends))
    }

    pub fn evaluator_id(&self) -> &str {
        &self.evaluator_id
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.backend_kind()
    }

    /// Ask the judge about one criterion. Failures yield an ERROR verdict.
    pub async fn evaluate(
        &self,
        user_input: &str,
        agent_response: &str,
        criterion: &SemanticCriterion,
    ) -> EvaluationResult {
        let start = Instant::now();
        let prompt = build_evaluation_prompt(user_input, agent_response, criterion);

        match self.backend.complete(&prompt).await {
            Ok(raw) => {
                let verdict = parse_verdict(&raw);
                debug!(
                    "Judge {} decided {} on '{}'",
                    self.evaluator_id, verdict.decision, criterion.criterion
                );

                EvaluationResult {
                    criterion: criterion.criterion.clone(),
                    evaluator_id: self.evaluator_id.clone(),
                    decision: verdict.decision,
                    confidence: verdict.confidence,
                    reasoning: verdict.reasoning,
                    execution_time: start.elapsed().as_secs_f64(),
                }
            }
            Err(e) => {
                warn!(
                    "Judge {} ({}) failed on '{}': {}",
                    self.evaluator_id,
                    self.backend_kind(),
                    criterion.criterion,
                    e
                );

                EvaluationResult::error(
                    criterion.criterion.clone(),
                    self.evaluator_id.clone(),
                    format!("Evaluation failed: {}", e),
                    start.elapsed().as_secs_f64(),
                )
            }
        }
    }
}

impl fmt::Debug for JudgeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JudgeClient")
            .field("evaluator_id", &self.evaluator_id)
            .field("backend", &self.backend_kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{LLMError, OllamaClient};
    use async_trait::async_trait;
    use std::time::Duration;

    struct MockLLMClient {
        reply: Result<String, String>,
    }

    #[async_trait]
    impl LLMClient for MockLLMClient {
        async fn complete(&self, prompt: &str) -> Result<String, LLMError> {
            assert!(prompt.contains("EVALUATION CRITERION"));
            self.reply.clone().map_err(LLMError::Transport)
        }

        fn model_name(&self) -> &str {
            "mock-model"
        }
    }

    fn judge(reply: Result<&str, &str>) -> JudgeClient {
        let reply = reply.map(str::to_string).map_err(str::to_string);
        JudgeClient::new("mock-model", Arc::new(MockLLMClient { reply }))
    }

    #[test]
    fn test_prompt_embeds_inputs_verbatim() {
        let criterion = SemanticCriterion::new("Response should acknowledge new customer status");
        let prompt = build_evaluation_prompt(
            "I just signed up",
            "Welcome aboard, \"new\" friend!",
            &criterion,
        );

        assert!(prompt.contains(r#"USER INPUT: "I just signed up""#));
        assert!(prompt.contains(r#"AGENT RESPONSE: "Welcome aboard, "new" friend!""#));
        assert!(prompt.contains(
            r#"EVALUATION CRITERION: "Response should acknowledge new customer status""#
        ));
        assert!(prompt.contains(r#""decision": "YES|NO""#));
        assert!(prompt.contains("You must choose either YES or NO"));
    }

    #[test]
    fn test_parse_json_embedded_in_prose() {
        let verdict = parse_verdict(r#"blah {"decision":"yes","reasoning":"ok"} trailing"#);
        assert_eq!(verdict.decision, Decision::Yes);
        assert_eq!(verdict.reasoning, "ok");
        assert_eq!(verdict.confidence, 1.0);
    }

    #[test]
    fn test_parse_code_fenced_json() {
        let raw = "Here is my evaluation:\n```json\n{\n  \"decision\": \"NO\",\n  \"reasoning\": \"Ignores the refund request\"\n}\n```\nHope this helps.";
        let verdict = parse_verdict(raw);
        assert_eq!(verdict.decision, Decision::No);
        assert_eq!(verdict.reasoning, "Ignores the refund request");
    }

    #[test]
    fn test_parse_invalid_decision_collapses_to_no() {
        let verdict = parse_verdict(r#"{"decision":"MAYBE"}"#);
        assert_eq!(verdict.decision, Decision::No);
        assert_eq!(verdict.reasoning, NO_REASONING);
    }

    #[test]
    fn test_parse_missing_decision_is_no() {
        let verdict = parse_verdict(r#"{"reasoning": "YES, clearly"}"#);
        assert_eq!(verdict.decision, Decision::No);
        assert_eq!(verdict.reasoning, "YES, clearly");
    }

    #[test]
    fn test_parse_fallback_substring() {
        let verdict = parse_verdict("Yes, the agent greets the customer.");
        assert_eq!(verdict.decision, Decision::Yes);
        assert_eq!(verdict.reasoning, FALLBACK_REASONING);

        let verdict = parse_verdict("The response does not meet the criterion.");
        assert_eq!(verdict.decision, Decision::No);
        assert_eq!(verdict.reasoning, FALLBACK_REASONING);

        let verdict = parse_verdict("");
        assert_eq!(verdict.decision, Decision::No);
    }

    #[test]
    fn test_parse_malformed_json_falls_back() {
        let verdict = parse_verdict(r#"{"decision": "YES", "reasoning": }"#);
        assert_eq!(verdict.decision, Decision::Yes);
        assert_eq!(verdict.reasoning, FALLBACK_REASONING);
    }

    #[test]
    fn test_parse_greedy_span_across_two_objects() {
        // Greedy match covers both objects, which is not valid JSON
        let verdict = parse_verdict(r#"{"decision":"NO"} then {"decision":"YES"}"#);
        assert_eq!(verdict.decision, Decision::Yes);
        assert_eq!(verdict.reasoning, FALLBACK_REASONING);
    }

    #[test]
    fn test_parse_non_string_decision_falls_back() {
        let verdict = parse_verdict(r#"{"decision": 1, "reasoning": "yes indeed"}"#);
        assert_eq!(verdict.decision, Decision::Yes);
        assert_eq!(verdict.reasoning, FALLBACK_REASONING);
    }

    #[test]
    fn test_parse_non_string_reasoning_kept() {
        let verdict = parse_verdict(r#"{"decision": "NO", "reasoning": ["too short"]}"#);
        assert_eq!(verdict.decision, Decision::No);
        assert_eq!(verdict.reasoning, r#"["too short"]"#);
    }

    #[test]
    fn test_parse_non_standard_number_tokens_fall_back() {
        // NaN/Infinity are not JSON; the plain-text scan still decides
        let verdict = parse_verdict(r#"{"decision": "YES", "score": NaN, "reasoning": "fine"}"#);
        assert_eq!(verdict.decision, Decision::Yes);
        assert_eq!(verdict.reasoning, FALLBACK_REASONING);

        let verdict = parse_verdict(r#"{"decision": "NO", "score": Infinity}"#);
        assert_eq!(verdict.decision, Decision::No);
        assert_eq!(verdict.reasoning, FALLBACK_REASONING);
    }

    #[tokio::test]
    async fn test_evaluate_success() {
        let criterion = SemanticCriterion::new("Is polite");
        let result = judge(Ok(r#"{"decision": "YES", "reasoning": "Says please"}"#))
            .evaluate("hi", "hello, please sit", &criterion)
            .await;

        assert_eq!(result.decision, Decision::Yes);
        assert_eq!(result.criterion, "Is polite");
        assert_eq!(result.evaluator_id, "mock-model");
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.reasoning, "Says please");
        assert!(result.execution_time >= 0.0);
    }

    #[tokio::test]
    async fn test_evaluate_backend_failure_becomes_error() {
        let criterion = SemanticCriterion::new("Is polite");
        let result = judge(Err("connection reset"))
            .evaluate("hi", "hello", &criterion)
            .await;

        assert_eq!(result.decision, Decision::Error);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(
            result.reasoning,
            "Evaluation failed: Transport error: connection reset"
        );
        assert!(result.execution_time >= 0.0);
    }

    #[tokio::test]
    async fn test_unknown_model_reports_not_implemented() {
        let judge = JudgeClient::from_model("my-custom-judge", &BackendConfig::default());
        assert_eq!(judge.backend_kind(), BackendKind::Custom);

        let result = judge
            .evaluate("hi", "hello", &SemanticCriterion::new("x"))
            .await;
        assert_eq!(result.decision, Decision::Error);
        assert!(result.reasoning.contains("No backend implemented"));
    }

    #[tokio::test]
    async fn test_missing_credential_becomes_error() {
        let backends = BackendConfig {
            openai_api_key: Some(String::new()),
            ..BackendConfig::default()
        };
        let judge = JudgeClient::from_model("gpt-4o-mini", &backends);

        let result = judge
            .evaluate("hi", "hello", &SemanticCriterion::new("x"))
            .await;
        assert_eq!(result.decision, Decision::Error);
        assert!(result.reasoning.contains("OpenAI API key not provided"));
    }

    #[tokio::test]
    async fn test_timing_out_endpoint_becomes_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend = OllamaClient::new(
            format!("http://{}", listener.local_addr().unwrap()),
            "local-slow".to_string(),
        )
        .with_timeout(Duration::from_millis(150));
        let judge = JudgeClient::new("local-slow", Arc::new(backend));

        let result = judge
            .evaluate("hi", "hello", &SemanticCriterion::new("x"))
            .await;
        assert_eq!(result.decision, Decision::Error);
        assert!(result.reasoning.contains("timed out"));
        assert!(result.execution_time >= 0.1);
        drop(listener);
    }
}
