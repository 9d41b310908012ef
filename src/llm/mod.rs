//! LLM integration for promptsmith.
//!
//! A single [`LlmProvider`] serves both external calls the optimizer makes:
//! the rubric judge used by the evaluator and the free-text rewrite calls
//! used by the candidate generator and the retrieval learner.
//!
//! ```ignore
//! use promptsmith::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("Hello")]);
//! let response = client.generate(request).await?;
//! ```

pub mod litellm;

pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
};
