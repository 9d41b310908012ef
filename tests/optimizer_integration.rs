//! End-to-end optimization runs against a scripted provider.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use promptsmith::embedding::HashEmbedder;
use promptsmith::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
use promptsmith::store::{MemoryStore, Outcome, PromptHistory, PromptRecord, RetrievalConfig};
use promptsmith::{LlmError, OptimizerConfig, OptimizerError, PromptOptimizer};

/// Routes on the system prompt: judge calls get `judge_reply`, every other
/// call gets a numbered rewrite. Fails every call from `fail_after` on.
struct ScriptedProvider {
    judge_reply: String,
    calls: AtomicUsize,
    fail_after: Option<usize>,
}

impl ScriptedProvider {
    fn new(judge_reply: &str) -> Self {
        Self {
            judge_reply: judge_reply.to_string(),
            calls: AtomicUsize::new(0),
            fail_after: None,
        }
    }

    fn failing_after(mut self, calls: usize) -> Self {
        self.fail_after = Some(calls);
        self
    }
}

fn rubric(value: u8) -> String {
    format!(
        r#"{{"clarity": {v}, "specificity": {v}, "completeness": {v}, "structure": {v}, "effectiveness": {v}, "reasoning": "scripted"}}"#,
        v = value
    )
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| call >= limit) {
            return Err(LlmError::RequestFailed("connection refused".to_string()));
        }

        let system = request.system_prompt().unwrap_or_default();
        let content = if system.contains("grading prompts") {
            self.judge_reply.clone()
        } else if system.contains("performed well in the past") {
            r#"{"improved_prompt": "You are a senior engineer. Write tested, documented code.", "insights": ["role framing", "explicit quality bar"]}"#.to_string()
        } else {
            format!("Rewritten candidate {}", call)
        };

        Ok(GenerationResponse {
            id: format!("call-{}", call),
            model: "scripted".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(content),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        })
    }
}

fn optimizer(provider: ScriptedProvider) -> PromptOptimizer {
    PromptOptimizer::new(Arc::new(provider), OptimizerConfig::default())
}

#[tokio::test]
async fn test_cold_start_lengthens_prompt() {
    let result = optimizer(ScriptedProvider::new(&rubric(6)))
        .optimize("Write code", &[], "code")
        .await
        .expect("run completes");

    assert_eq!(result.original_prompt, "Write code");
    assert_ne!(result.optimized_prompt, "Write code");
    assert!(result.optimized_prompt.len() > result.original_prompt.len());
    assert!(!result.improvements.is_empty());
    assert_eq!(result.similar_prompts_used, 0);
    assert!(result.iterations >= 1 && result.iterations <= 5);
    assert_eq!(result.scores.len(), result.iterations + 1);
}

#[tokio::test]
async fn test_warm_start_uses_retrieval_learning() {
    let similar = vec![PromptRecord::new(
        "You are a senior engineer. Write code with tests.",
        "code",
        None,
        &Outcome::new(0.95),
    )];

    let result = optimizer(ScriptedProvider::new(&rubric(6)))
        .optimize("Write code", &similar, "code")
        .await
        .expect("run completes");

    assert_eq!(result.similar_prompts_used, 1);
    assert!(result
        .improvements
        .iter()
        .any(|line| line.contains("retrieval-based learning")));
    assert!(result.optimized_prompt.contains("senior engineer"));
}

#[tokio::test]
async fn test_malformed_judge_output_falls_back() {
    let result = optimizer(ScriptedProvider::new("not json"))
        .optimize("Write code", &[], "code")
        .await
        .expect("malformed judge output never fails the run");

    assert!(result.baseline_score > 0.0 && result.baseline_score <= 1.0);
    assert!(result.final_score > 0.0 && result.final_score <= 1.0);
    assert!(result
        .last_evaluation
        .as_ref()
        .is_some_and(|evaluation| evaluation.is_heuristic()));
}

#[tokio::test]
async fn test_transport_failure_aborts_run() {
    // Baseline and initial scoring succeed, the first generation fails.
    let provider = ScriptedProvider::new(&rubric(6)).failing_after(2);
    let err = optimizer(provider)
        .optimize("Write code", &[], "code")
        .await
        .expect_err("transport failure surfaces");

    assert_eq!(err.operation(), "candidate generation");
    assert!(matches!(
        err,
        OptimizerError::Transport {
            source: LlmError::RequestFailed(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_baseline_failure_aborts_run() {
    let provider = ScriptedProvider::new(&rubric(6)).failing_after(0);
    let err = optimizer(provider)
        .optimize("Write code", &[], "code")
        .await
        .expect_err("transport failure surfaces");
    assert_eq!(err.operation(), "baseline scoring");
}

#[tokio::test]
async fn test_recorded_history_warm_starts_run() {
    let store = Arc::new(MemoryStore::new());
    let history = PromptHistory::new(Arc::new(HashEmbedder::default()), store);
    history
        .record(
            "Write Rust code that parses a CSV file",
            "code",
            None,
            &Outcome::new(0.9),
        )
        .await
        .expect("record");

    let similar = history
        .retrieve(
            "Write Rust code that parses a JSON file",
            "code",
            None,
            &RetrievalConfig::default(),
        )
        .await;
    assert_eq!(similar.len(), 1);

    let result = optimizer(ScriptedProvider::new(&rubric(7)))
        .optimize("Write Rust code that parses a JSON file", &similar, "code")
        .await
        .expect("run completes");
    assert_eq!(result.similar_prompts_used, 1);
}

#[tokio::test]
async fn test_concurrent_runs_share_one_optimizer() {
    let optimizer = Arc::new(optimizer(ScriptedProvider::new(&rubric(6))));

    let a = {
        let optimizer = optimizer.clone();
        tokio::spawn(async move { optimizer.optimize("Write code", &[], "code").await })
    };
    let b = {
        let optimizer = optimizer.clone();
        tokio::spawn(async move { optimizer.optimize("Summarise a paper", &[], "writing").await })
    };

    let a = a.await.expect("join").expect("run a");
    let b = b.await.expect("join").expect("run b");
    assert_eq!(a.original_prompt, "Write code");
    assert_eq!(b.original_prompt, "Summarise a paper");
    assert_eq!(a.scores.len(), a.iterations + 1);
    assert_eq!(b.scores.len(), b.iterations + 1);
}
