//! Rewriting informed by historically successful prompts.

use serde::Deserialize;
use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::store::PromptRecord;
use crate::utils::json_extraction::{parse_json_object, JsonExtractionError};

use super::generator::strip_wrapping;

const LEARNER_SYSTEM_PROMPT: &str = r#"You improve prompts by learning from prompts that performed well in the past.

You receive a prompt to improve and a few similar prompts, each with its observed success rate. Work out what made the successful prompts effective (structure, explicit constraints, role framing, output format, level of detail) and apply those qualities to the prompt to improve. Keep its original intent and every concrete detail.

Respond with a single JSON object:
{"improved_prompt": "the rewritten prompt", "insights": ["short note on each quality you borrowed"]}"#;

/// Output of [`RetrievalLearner::learn_from_similar`].
#[derive(Debug, Clone, PartialEq)]
pub struct Learned {
    /// Rewritten prompt, or the input unchanged when nothing usable came back.
    pub text: String,
    pub insights: String,
}

#[derive(Debug, Deserialize)]
struct LearnerResponse {
    improved_prompt: String,
    #[serde(default)]
    insights: Insights,
}

/// Models return insights either as a list or as a single sentence.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum Insights {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl Insights {
    fn into_vec(self) -> Vec<String> {
        let notes = match self {
            Insights::None => Vec::new(),
            Insights::One(note) => vec![note],
            Insights::Many(notes) => notes,
        };
        notes
            .into_iter()
            .map(|note| note.trim().to_string())
            .filter(|note| !note.is_empty())
            .collect()
    }
}

/// Synthesizes a candidate from the best-performing similar records.
pub struct RetrievalLearner {
    llm: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    max_tokens: u32,
    top_performers: usize,
}

impl RetrievalLearner {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            model: String::new(),
            temperature: 0.7,
            max_tokens: 1500,
            top_performers: 3,
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

    pub fn with_top_performers(mut self, top_performers: usize) -> Self {
        self.top_performers = top_performers.max(1);
        self
    }

    /// Highest success rates first, at most `top_performers` of them.
    fn top<'a>(&self, similar: &'a [PromptRecord]) -> Vec<&'a PromptRecord> {
        let mut ranked: Vec<&PromptRecord> = similar.iter().collect();
        ranked.sort_by(|a, b| {
            b.metrics
                .success_rate
                .total_cmp(&a.metrics.success_rate)
        });
        ranked.truncate(self.top_performers);
        ranked
    }

    /// Rewrites `prompt` using what the strongest of `similar` have in common.
    ///
    /// Callers skip this entirely when `similar` is empty.
    pub async fn learn_from_similar(
        &self,
        prompt: &str,
        similar: &[PromptRecord],
    ) -> Result<Learned, LlmError> {
        let top = self.top(similar);
        let examples = top
            .iter()
            .enumerate()
            .map(|(i, record)| {
                format!(
                    "Example {} (success rate {:.0}%, {} observations):\n{}",
                    i + 1,
                    record.metrics.success_rate * 100.0,
                    record.metrics.observation_count,
                    record.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let request = GenerationRequest::new(
            self.model.clone(),
            vec![
                Message::system(LEARNER_SYSTEM_PROMPT),
                Message::user(format!(
                    "Prompt to improve:\n---\n{}\n---\n\nSuccessful similar prompts:\n\n{}",
                    prompt, examples
                )),
            ],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let response = self.llm.generate(request).await?;
        let best = top.first().map_or(0.0, |r| r.metrics.success_rate);
        let summary = format!(
            "learned from {} similar prompt(s), best success rate {:.0}%",
            top.len(),
            best * 100.0
        );

        let Some(content) = response.usable_text() else {
            tracing::warn!("Retrieval learner returned no text, keeping prompt");
            return Ok(Learned {
                text: prompt.to_string(),
                insights: summary,
            });
        };

        let learned = match parse_json_object::<LearnerResponse>(content) {
            Ok(parsed) if !parsed.improved_prompt.trim().is_empty() => {
                let notes = parsed.insights.into_vec();
                let insights = if notes.is_empty() {
                    summary
                } else {
                    format!("{}: {}", summary, notes.join("; "))
                };
                Learned {
                    text: parsed.improved_prompt.trim().to_string(),
                    insights,
                }
            }
            Ok(_) => {
                tracing::warn!("Retrieval learner returned an empty improved_prompt, keeping prompt");
                Learned {
                    text: prompt.to_string(),
                    insights: summary,
                }
            }
            Err(JsonExtractionError::Invalid(e)) => {
                tracing::warn!(error = %e, "Retrieval learner returned malformed JSON, keeping prompt");
                Learned {
                    text: prompt.to_string(),
                    insights: summary,
                }
            }
            Err(JsonExtractionError::NotFound { .. }) => {
                tracing::debug!("Retrieval learner answered in plain text");
                Learned {
                    text: strip_wrapping(content).to_string(),
                    insights: summary,
                }
            }
        };
        Ok(learned)
    }
}
