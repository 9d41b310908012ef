//! LiteLLM-compatible client implementation for promptsmith.
//!
//! Speaks the OpenAI-compatible `/chat/completions` endpoint for judge and
//! rewrite calls, and `/embeddings` for vectorising prompt text.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::embedding::{Embedded, Embedder};
use crate::error::{EmbeddingError, LlmError};

const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "anthropic/claude-opus-4.5";
const DEFAULT_EMBEDDING_MODEL: &str = "openai/text-embedding-3-small";
const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender ("system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }
}

/// Request for text generation from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model identifier. Empty means the client's default model.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling parameter (0.0 - 1.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

impl GenerationRequest {
    /// Create a new generation request with default sampling parameters.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            top_p: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Content of the system message, if the request carries one.
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.as_str())
    }
}

/// Response from an LLM generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl GenerationResponse {
    /// Get the content of the first choice, if available.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }

    /// First choice content with surrounding whitespace removed, or `None`
    /// when the model produced nothing usable.
    pub fn usable_text(&self) -> Option<&str> {
        self.first_content()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// A single generated choice from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    /// Reason the generation stopped (e.g., "stop", "length").
    pub finish_reason: String,
}

/// Token usage statistics for a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Trait for LLM providers that can generate text.
///
/// An `Err` from `generate` is a transport-level failure. A response with
/// empty content is a successful call that produced nothing.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;
}

/// Client for LiteLLM-compatible APIs.
pub struct LiteLlmClient {
    api_base: String,
    api_key: Option<String>,
    default_model: String,
    embedding_model: String,
    embedding_dimension: usize,
    /// USD per 1k embedding tokens, used to report embedding cost.
    embedding_price_per_1k: f64,
    http_client: Client,
}

fn build_http_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

impl LiteLlmClient {
    /// Create a new LiteLLM client with explicit configuration.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL for the API (e.g., "http://localhost:4000")
    /// * `api_key` - Optional API key for authentication
    /// * `default_model` - Model used when a request leaves `model` empty
    pub fn new(api_base: String, api_key: Option<String>, default_model: String) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            default_model,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            embedding_price_per_1k: 0.00002,
            http_client: build_http_client(),
        }
    }

    /// Create a client pre-configured for OpenRouter.
    pub fn new_with_defaults(api_key: String) -> Self {
        Self::new(
            OPENROUTER_API_BASE.to_string(),
            Some(api_key),
            DEFAULT_MODEL.to_string(),
        )
    }

    /// Create a new client from environment variables.
    ///
    /// - `LITELLM_API_BASE`: Base URL for the API (required)
    /// - `LITELLM_API_KEY`: API key for authentication (optional)
    /// - `LITELLM_DEFAULT_MODEL`: Default model
    /// - `LITELLM_EMBEDDING_MODEL`: Embedding model
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingApiBase` if `LITELLM_API_BASE` is not set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_base = env::var("LITELLM_API_BASE").map_err(|_| LlmError::MissingApiBase)?;
        let api_key = env::var("LITELLM_API_KEY").ok();
        let default_model =
            env::var("LITELLM_DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let mut client = Self::new(api_base, api_key, default_model);
        if let Ok(model) = env::var("LITELLM_EMBEDDING_MODEL") {
            client.embedding_model = model;
        }
        Ok(client)
    }

    /// Set the embedding model and the dimension of the vectors it returns.
    pub fn with_embedding_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.embedding_model = model.into();
        self.embedding_dimension = dimension;
        self
    }

    pub fn with_embedding_price(mut self, usd_per_1k_tokens: f64) -> Self {
        self.embedding_price_per_1k = usd_per_1k_tokens;
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.api_base, path);
        let mut request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-Title", "promptsmith");

        if let Some(ref api_key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }
        request
    }

    /// Turns a non-success HTTP response into a typed error.
    async fn error_from_response(response: reqwest::Response) -> LlmError {
        let status_code = response.status().as_u16();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());

        let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
            .map(|parsed| parsed.error.message)
            .unwrap_or(error_text);

        if status_code == 429 {
            LlmError::RateLimited(message)
        } else {
            LlmError::ApiError {
                code: status_code,
                message,
            }
        }
    }
}

/// Internal request structure for the OpenAI-compatible API.
#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    index: u32,
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    role: Option<String>,
    /// Null when the model answered with tool calls only.
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingApiRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingApiDatum>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiDatum {
    embedding: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl LlmProvider for LiteLlmClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model
        };

        let api_request = ApiRequest {
            model,
            messages: request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
        };

        let http_response = self
            .post("chat/completions")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !http_response.status().is_success() {
            return Err(Self::error_from_response(http_response).await);
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        let choices = api_response
            .choices
            .into_iter()
            .map(|choice| Choice {
                index: choice.index,
                message: Message {
                    role: choice.message.role.unwrap_or_else(|| "assistant".to_string()),
                    content: choice.message.content.unwrap_or_default(),
                },
                finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            })
            .collect();

        Ok(GenerationResponse {
            id: api_response.id,
            model: api_response.model,
            choices,
            usage: api_response.usage.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl Embedder for LiteLlmClient {
    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedded, EmbeddingError> {
        let http_response = self
            .post("embeddings")
            .json(&EmbeddingApiRequest {
                model: &self.embedding_model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        if !http_response.status().is_success() {
            return Err(Self::error_from_response(http_response).await.into());
        }

        let body: EmbeddingApiResponse = http_response
            .json()
            .await
            .map_err(|e| EmbeddingError::Transport(format!("bad embeddings payload: {}", e)))?;

        let vector = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(EmbeddingError::Empty)?;

        if vector.len() != self.embedding_dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.embedding_dimension,
                actual: vector.len(),
            });
        }

        let tokens = body.usage.map(|u| u.prompt_tokens).unwrap_or(0);
        Ok(Embedded {
            vector: vector.into(),
            cost: f64::from(tokens) / 1000.0 * self.embedding_price_per_1k,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let system = Message::system("You are an evaluator.");
        assert_eq!(system.role, "system");
        assert_eq!(system.content, "You are an evaluator.");
        assert_eq!(Message::user("Hi").role, "user");
        assert_eq!(Message::assistant("Hello").role, "assistant");
    }

    #[test]
    fn test_generation_request_builder() {
        let request = GenerationRequest::new(
            "gpt-4",
            vec![Message::system("judge"), Message::user("score this")],
        )
        .with_temperature(0.2)
        .with_max_tokens(800)
        .with_top_p(0.9);

        assert_eq!(request.model, "gpt-4");
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(800));
        assert_eq!(request.top_p, Some(0.9));
        assert_eq!(request.system_prompt(), Some("judge"));
    }

    #[test]
    fn test_usable_text_rejects_blank_content() {
        let mut response = GenerationResponse {
            id: "id".to_string(),
            model: "m".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant("   \n"),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        };
        assert_eq!(response.usable_text(), None);

        response.choices[0].message.content = "  Rewritten prompt ".to_string();
        assert_eq!(response.usable_text(), Some("Rewritten prompt"));

        response.choices.clear();
        assert_eq!(response.first_content(), None);
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = LiteLlmClient::new(
            "http://localhost:4000/".to_string(),
            None,
            "gpt-4".to_string(),
        );
        assert_eq!(client.api_base(), "http://localhost:4000");
        assert_eq!(client.default_model(), "gpt-4");
        assert!(!client.has_api_key());
    }

    #[test]
    fn test_client_new_with_defaults() {
        let client = LiteLlmClient::new_with_defaults("key".to_string());
        assert_eq!(client.api_base(), OPENROUTER_API_BASE);
        assert_eq!(client.default_model(), DEFAULT_MODEL);
        assert!(client.has_api_key());
        assert_eq!(client.dimension(), DEFAULT_EMBEDDING_DIMENSION);
    }

    #[tokio::test]
    async fn test_generate_connection_error() {
        let client = LiteLlmClient::new(
            "http://localhost:65535".to_string(),
            None,
            "gpt-4".to_string(),
        );

        let request = GenerationRequest::new("", vec![Message::user("test")]);
        let err = client
            .generate(request)
            .await
            .expect_err("no server is listening");
        assert!(matches!(err, LlmError::RequestFailed(_)));
    }

    #[tokio::test]
    async fn test_embed_connection_error() {
        let client = LiteLlmClient::new(
            "http://localhost:65535".to_string(),
            None,
            "gpt-4".to_string(),
        );
        let err = client.embed("hello").await.expect_err("no server");
        assert!(matches!(err, EmbeddingError::Transport(_)));
    }

    #[test]
    fn test_api_response_tolerates_null_content() {
        let raw = r#"{"id":"x","model":"m","choices":[{"index":0,"message":{"role":"assistant","content":null},"finish_reason":"tool_calls"}]}"#;
        let parsed: ApiResponse = serde_json::from_str(raw).expect("valid payload");
        assert!(parsed.choices[0].message.content.is_none());
        assert!(parsed.usage.is_none());
    }

    #[test]
    fn test_api_request_serialization_skips_none() {
        let request = ApiRequest {
            model: "gpt-4".to_string(),
            messages: vec![Message::user("test")],
            temperature: Some(0.7),
            max_tokens: None,
            top_p: None,
        };
        let json = serde_json::to_string(&request).expect("serialization should succeed");
        assert!(json.contains("\"temperature\":0.7"));
        assert!(!json.contains("max_tokens"));
        assert!(!json.contains("top_p"));
    }
}
