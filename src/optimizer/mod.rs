//! The prompt optimization engine.
//!
//! - [`patterns`]: cheap deterministic rewrite rules
//! - [`evaluator`]: weighted-rubric scoring with a heuristic fallback
//! - [`generator`]: history-aware rewrites
//! - [`learner`]: rewrites informed by similar high performers
//! - [`convergence`]: plateau detection
//! - [`controller`]: the iteration loop tying them together

pub mod controller;
pub mod convergence;
pub mod evaluator;
pub mod generator;
pub mod learner;
pub mod patterns;

pub use controller::{OptimizationResult, PromptOptimizer, StopReason};
pub use convergence::ConvergenceDetector;
pub use evaluator::{heuristic_score, weighted_score, Evaluation, Evaluator, CRITERIA};
pub use generator::CandidateGenerator;
pub use learner::{Learned, RetrievalLearner};
pub use patterns::{apply_patterns, Pattern, PATTERNS};
