//! promptsmith: iterative prompt optimization with retrieval-based learning.
//!
//! The engine in [`optimizer`] scores a prompt against a weighted rubric,
//! applies cheap rewrite patterns, learns from similar prompts that did
//! well in the past, and iterates on LLM rewrites until the score plateaus.
//! [`store`] and [`embedding`] keep the history it learns from.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod optimizer;
pub mod store;
pub mod utils;

pub use config::{ConfigError, OptimizerConfig};
pub use error::{EmbeddingError, LlmError, OptimizerError, StoreError};
pub use optimizer::{Evaluation, OptimizationResult, PromptOptimizer};
