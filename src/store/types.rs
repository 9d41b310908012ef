//! Prompt record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embedding::contextualize;

/// Aggregated performance of a stored prompt.
///
/// `success_rate`, `avg_latency_ms` and `token_efficiency` are exponential
/// moving averages over observed outcomes; `observation_count` only grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptMetrics {
    /// Fraction of runs judged successful, in [0, 1].
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    /// Useful output per token spent, in [0, 1].
    pub token_efficiency: f64,
    pub observation_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl PromptMetrics {
    /// Metrics seeded from a first observed outcome.
    pub fn from_outcome(outcome: &Outcome) -> Self {
        Self {
            success_rate: outcome.success.clamp(0.0, 1.0),
            avg_latency_ms: outcome.latency_ms.max(0.0),
            token_efficiency: outcome.token_efficiency.clamp(0.0, 1.0),
            observation_count: 1,
            last_updated: Utc::now(),
        }
    }

    /// Folds one more outcome in with `new = alpha * observed + (1 - alpha) * old`.
    pub fn observe(&mut self, outcome: &Outcome, alpha: f64) {
        let alpha = alpha.clamp(0.0, 1.0);
        let ema = |old: f64, new: f64| alpha * new + (1.0 - alpha) * old;

        self.success_rate = ema(self.success_rate, outcome.success.clamp(0.0, 1.0));
        self.avg_latency_ms = ema(self.avg_latency_ms, outcome.latency_ms.max(0.0));
        self.token_efficiency = ema(
            self.token_efficiency,
            outcome.token_efficiency.clamp(0.0, 1.0),
        );
        self.observation_count += 1;
        self.last_updated = Utc::now();
    }
}

/// One observed use of a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    /// Success signal in [0, 1]; 1.0 for a fully successful run.
    pub success: f64,
    pub latency_ms: f64,
    pub token_efficiency: f64,
}

impl Outcome {
    pub fn new(success: f64) -> Self {
        Self {
            success,
            latency_ms: 0.0,
            token_efficiency: 0.5,
        }
    }

    pub fn with_latency_ms(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_token_efficiency(mut self, token_efficiency: f64) -> Self {
        self.token_efficiency = token_efficiency;
        self
    }
}

/// A previously seen prompt with its performance history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRecord {
    pub id: String,
    pub text: String,
    /// `text` prefixed with domain and task tags, the string that gets embedded.
    pub contextualized_text: String,
    pub domain: String,
    pub task_type: Option<String>,
    pub metrics: PromptMetrics,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PromptRecord {
    /// Creates a record from its first observed outcome.
    pub fn new(
        text: impl Into<String>,
        domain: impl Into<String>,
        task_type: Option<String>,
        outcome: &Outcome,
    ) -> Self {
        let text = text.into();
        let domain = domain.into();
        Self {
            id: Uuid::new_v4().to_string(),
            contextualized_text: contextualize(&text, &domain, task_type.as_deref()),
            text,
            domain,
            task_type,
            metrics: PromptMetrics::from_outcome(outcome),
            created_at: Utc::now(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_new_contextualizes_text() {
        let record = PromptRecord::new(
            "Write code",
            "code",
            Some("generation".to_string()),
            &Outcome::new(0.8),
        );
        assert_eq!(
            record.contextualized_text,
            "[domain: code] [task: generation] Write code"
        );
        assert_eq!(record.metrics.observation_count, 1);
        assert!((record.metrics.success_rate - 0.8).abs() < 1e-10);
        assert!(!record.id.is_empty());
    }

    #[test]
    fn test_observe_applies_ema() {
        let mut metrics = PromptMetrics::from_outcome(&Outcome::new(1.0).with_latency_ms(100.0));
        metrics.observe(&Outcome::new(0.0).with_latency_ms(200.0), 0.25);

        assert!((metrics.success_rate - 0.75).abs() < 1e-10);
        assert!((metrics.avg_latency_ms - 125.0).abs() < 1e-10);
        assert_eq!(metrics.observation_count, 2);
    }

    #[test]
    fn test_observe_clamps_inputs() {
        let mut metrics = PromptMetrics::from_outcome(&Outcome::new(1.5));
        assert_eq!(metrics.success_rate, 1.0);
        metrics.observe(&Outcome::new(-3.0).with_latency_ms(-10.0), 1.0);
        assert_eq!(metrics.success_rate, 0.0);
        assert_eq!(metrics.avg_latency_ms, 0.0);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = PromptRecord::new("p", "general", None, &Outcome::new(0.5));
        let json = serde_json::to_string(&record).expect("serializable");
        assert!(json.contains("\"contextualizedText\""));
        assert!(json.contains("\"successRate\""));
        assert!(json.contains("\"observationCount\""));
    }
}
