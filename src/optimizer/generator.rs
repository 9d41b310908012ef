//! History-aware candidate generation.

use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::utils::preview;

const GENERATOR_SYSTEM_PROMPT: &str = r#"You improve prompts written for large language models.

You receive the current prompt, its domain, and the recent attempts made during this optimization run together with their quality scores (0 to 1, higher is better).

Write a new version of the current prompt that:
- scores strictly higher than every previous attempt
- keeps the original intent and every concrete detail the user supplied
- uses conventions that suit the domain
- is explicit about the expected steps, constraints and output

Output ONLY the rewritten prompt text, without commentary or quotes."#;

const PREVIEW_CHARS: usize = 200;

/// Produces rewritten candidates from the current prompt and run history.
pub struct CandidateGenerator {
    llm: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    max_tokens: u32,
    /// Number of trailing history entries shown to the model.
    history_window: usize,
}

impl CandidateGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            model: String::new(),
            temperature: 0.7,
            max_tokens: 1500,
            history_window: 5,
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

    pub fn with_history_window(mut self, history_window: usize) -> Self {
        self.history_window = history_window.max(1);
        self
    }

    fn build_meta_prompt(&self, current: &str, domain: &str, history: &[(String, f64)]) -> String {
        let start = history.len().saturating_sub(self.history_window);
        let attempts = history[start..]
            .iter()
            .enumerate()
            .map(|(i, (prompt, score))| {
                format!(
                    "Attempt {} (score {:.2}):\n{}",
                    start + i + 1,
                    score,
                    preview(prompt, PREVIEW_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "Domain: {}\n\nRecent attempts:\n{}\n\nCurrent prompt:\n---\n{}\n---\n\n\
             Write an improved version of the current prompt.",
            domain,
            if attempts.is_empty() { "(none)".to_string() } else { attempts },
            current
        )
    }

    /// Asks the model for a better version of `current`.
    ///
    /// An empty generation yields `current` unchanged.
    pub async fn generate(
        &self,
        current: &str,
        domain: &str,
        history: &[(String, f64)],
    ) -> Result<String, LlmError> {
        let request = GenerationRequest::new(
            self.model.clone(),
            vec![
                Message::system(GENERATOR_SYSTEM_PROMPT),
                Message::user(self.build_meta_prompt(current, domain, history)),
            ],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let response = self.llm.generate(request).await?;
        match response.usable_text().map(strip_wrapping) {
            Some(candidate) if !candidate.is_empty() => Ok(candidate.to_string()),
            _ => {
                tracing::warn!(domain, "Generator returned no text, keeping current prompt");
                Ok(current.to_string())
            }
        }
    }
}

/// Removes a surrounding code fence or quote pair some models add.
pub(crate) fn strip_wrapping(text: &str) -> &str {
    let text = text.trim();
    if let Some(inner) = text
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    {
        // Drop an info string such as "text" on the opening fence line.
        return match inner.split_once('\n') {
            Some((first, body)) if !first.trim().contains(' ') => body.trim(),
            _ => inner.trim(),
        };
    }
    text.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(str::trim)
        .unwrap_or(text)
}
