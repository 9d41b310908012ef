//! Rubric-based prompt scoring.
//!
//! The primary path asks an LLM judge for a 0-10 rating on five fixed
//! criteria. When the judge answers with something that is not the
//! expected JSON, a local heuristic takes over and the result is tagged
//! [`Evaluation::Heuristic`] so callers can tell the two apart.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::utils::json_extraction::parse_json_object;
use crate::utils::preview;

use super::patterns::has_numbered_list;

/// Rubric criteria and their weights. The weights sum to 1.0.
pub const CRITERIA: [(&str, f64); 5] = [
    ("clarity", 0.25),
    ("specificity", 0.25),
    ("completeness", 0.20),
    ("structure", 0.15),
    ("effectiveness", 0.15),
];

const JUDGE_SYSTEM_PROMPT: &str = r#"You are an expert prompt engineer grading prompts written for a large language model.

Rate the prompt on each criterion with an integer from 0 to 10:
- clarity: is the request unambiguous and easy to follow?
- specificity: does it pin down scope, inputs and expected detail?
- completeness: does it carry all the context the model needs?
- structure: is it organised (sections, steps, lists) rather than a wall of text?
- effectiveness: how likely is it to produce a high-quality answer in its domain?

Respond with a single JSON object and nothing else:
{"clarity": 0, "specificity": 0, "completeness": 0, "structure": 0, "effectiveness": 0, "reasoning": "one or two sentences"}"#;

/// Outcome of scoring one prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evaluation {
    /// The judge returned a usable rubric. Values are in [0, 10].
    Judged {
        scores: BTreeMap<String, f64>,
        reasoning: String,
    },
    /// Degraded local estimate, used when the judge output was unusable.
    Heuristic { score: f64 },
}

impl Evaluation {
    /// Score in [0, 1].
    pub fn weighted_score(&self) -> f64 {
        match self {
            Evaluation::Judged { scores, .. } => weighted_score(scores),
            Evaluation::Heuristic { score } => *score,
        }
    }

    pub fn is_heuristic(&self) -> bool {
        matches!(self, Evaluation::Heuristic { .. })
    }
}

/// `Σ value/10 × weight` over the fixed criteria. Missing criteria count as 0.
pub fn weighted_score(scores: &BTreeMap<String, f64>) -> f64 {
    CRITERIA
        .iter()
        .map(|(name, weight)| {
            let value = scores.get(*name).copied().unwrap_or(0.0).clamp(0.0, 10.0);
            value / 10.0 * weight
        })
        .sum()
}

/// Local estimate from surface features of the text. Always in (0, 1].
pub fn heuristic_score(text: &str) -> f64 {
    let mut score = 0.3;

    let words = text.split_whitespace().count() as f64;
    score += (words / 150.0).min(1.0) * 0.2;

    if text.trim().contains('\n') {
        score += 0.15;
    }
    if has_numbered_list(text) {
        score += 0.15;
    }

    let lower = text.to_lowercase();
    if ["step by step", "step-by-step", "first,", "then ", "finally"]
        .iter()
        .any(|marker| lower.contains(marker))
    {
        score += 0.1;
    }

    score.clamp(0.0, 1.0)
}

#[derive(Debug, Deserialize)]
struct JudgeResponse {
    clarity: f64,
    specificity: f64,
    completeness: f64,
    structure: f64,
    effectiveness: f64,
    #[serde(default)]
    reasoning: String,
}

impl JudgeResponse {
    fn into_evaluation(self) -> Option<Evaluation> {
        let values = [
            self.clarity,
            self.specificity,
            self.completeness,
            self.structure,
            self.effectiveness,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let scores = CRITERIA
            .iter()
            .zip(values)
            .map(|((name, _), value)| (name.to_string(), value.clamp(0.0, 10.0)))
            .collect();
        Some(Evaluation::Judged {
            scores,
            reasoning: self.reasoning,
        })
    }
}

/// Scores prompts through an LLM judge.
pub struct Evaluator {
    llm: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl Evaluator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            model: String::new(),
            temperature: 0.2,
            max_tokens: 500,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Scores `text` for `domain`.
    ///
    /// # Errors
    ///
    /// Only a failed provider call is an error. Unparseable judge output
    /// yields [`Evaluation::Heuristic`].
    pub async fn evaluate(&self, text: &str, domain: &str) -> Result<Evaluation, LlmError> {
        let request = GenerationRequest::new(
            self.model.clone(),
            vec![
                Message::system(JUDGE_SYSTEM_PROMPT),
                Message::user(format!("Domain: {}\n\nPrompt to grade:\n---\n{}\n---", domain, text)),
            ],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let response = self.llm.generate(request).await?;
        let content = response.first_content().unwrap_or_default();

        let judged = parse_json_object::<JudgeResponse>(content)
            .ok()
            .and_then(JudgeResponse::into_evaluation);

        Ok(match judged {
            Some(evaluation) => {
                tracing::debug!(domain, score = evaluation.weighted_score(), "Prompt judged");
                evaluation
            }
            None => {
                let score = heuristic_score(text);
                tracing::warn!(
                    domain,
                    score,
                    response = %preview(content, 80),
                    "Judge response unusable, using heuristic score"
                );
                Evaluation::Heuristic { score }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Choice, GenerationResponse, Usage};
    use async_trait::async_trait;

    struct FixedJudge {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for FixedJudge {
        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            Ok(GenerationResponse {
                id: "judge".to_string(),
                model: "test-model".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(self.response.clone()),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage::default(),
            })
        }
    }

    fn evaluator(response: &str) -> Evaluator {
        Evaluator::new(Arc::new(FixedJudge {
            response: response.to_string(),
        }))
    }

    #[test]
    fn test_weights_sum_to_one() {
        let total: f64 = CRITERIA.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_score_exact() {
        let scores: BTreeMap<String, f64> = [
            ("clarity", 8.0),
            ("specificity", 7.0),
            ("completeness", 6.0),
            ("structure", 8.0),
            ("effectiveness", 7.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        assert!((weighted_score(&scores) - 0.72).abs() < 0.01);
    }

    #[test]
    fn test_heuristic_rewards_structure() {
        let flat = heuristic_score("Write code");
        let structured = heuristic_score(
            "Write a parser.\nWork step by step:\n1. Tokenize\n2. Parse\n3. Report errors",
        );
        assert!(flat > 0.0 && flat <= 1.0);
        assert!(structured > flat);
        assert!(structured <= 1.0);
        assert!(heuristic_score("") > 0.0);
    }

    #[tokio::test]
    async fn test_evaluate_parses_judge_json() {
        let evaluation = evaluator(
            "```json\n{\"clarity\": 8, \"specificity\": 7, \"completeness\": 6, \
             \"structure\": 8, \"effectiveness\": 7, \"reasoning\": \"clear\"}\n```",
        )
        .evaluate("Write code", "code")
        .await
        .expect("provider succeeds");

        assert!(!evaluation.is_heuristic());
        assert!((evaluation.weighted_score() - 0.72).abs() < 0.01);
        match evaluation {
            Evaluation::Judged { reasoning, scores } => {
                assert_eq!(reasoning, "clear");
                assert_eq!(scores.len(), 5);
            }
            other => panic!("expected judged evaluation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_evaluate_clamps_out_of_range_values() {
        let evaluation = evaluator(
            r#"{"clarity": 14, "specificity": 10, "completeness": 10, "structure": 10, "effectiveness": -3}"#,
        )
        .evaluate("p", "general")
        .await
        .expect("provider succeeds");
        assert!((evaluation.weighted_score() - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_not_json_falls_back_to_heuristic() {
        let evaluation = evaluator("not json")
            .evaluate("Write code", "code")
            .await
            .expect("malformed judge output is not an error");
        assert!(evaluation.is_heuristic());
        let score = evaluation.weighted_score();
        assert!(score > 0.0 && score <= 1.0);
    }

    #[tokio::test]
    async fn test_missing_criterion_falls_back() {
        let evaluation = evaluator(r#"{"clarity": 9, "reasoning": "partial"}"#)
            .evaluate("Write code", "code")
            .await
            .expect("provider succeeds");
        assert!(evaluation.is_heuristic());
    }
}
