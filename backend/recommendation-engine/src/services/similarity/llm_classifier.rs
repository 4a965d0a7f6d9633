// ============================================
// LLM Similarity Classifier
// ============================================
//
// Asks a hosted language model how related two articles are and expects a
// bare number in [0, 1] back. Supports Anthropic and OpenAI chat endpoints.

use super::{ClassifierError, Result, SimilarityClassifier};
use crate::config::LlmConfig;
use crate::models::ContentItem;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Excerpts are cut to this many characters before prompting
const MAX_EXCERPT_CHARS: usize = 400;

// ============================================
// LLM Provider Trait
// ============================================

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate completion from prompt
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;

    /// Get provider name
    fn name(&self) -> &str;
}

fn http_client(timeout: Duration) -> Result<HttpClient> {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ClassifierError::Transport(format!("Failed to create HTTP client: {}", e)))
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClassifierError::Status {
        status: status.as_u16(),
        body,
    })
}

// ============================================
// Anthropic Provider
// ============================================

pub struct AnthropicProvider {
    client: HttpClient,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: String,
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ClassifierError::Transport(format!("Anthropic API error: {}", e)))?;

        let result: AnthropicResponse = error_for_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(format!("Parse error: {}", e)))?;

        Ok(result
            .content
            .first()
            .map(|c| c.text.clone())
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

// ============================================
// OpenAI Provider
// ============================================

pub struct OpenAIProvider {
    client: HttpClient,
    api_key: String,
    model: String,
}

impl OpenAIProvider {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[derive(Serialize)]
struct OpenAICompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAICompletionResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: String,
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = OpenAICompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens,
            temperature: 0.0,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ClassifierError::Transport(format!("OpenAI API error: {}", e)))?;

        let result: OpenAICompletionResponse = error_for_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(format!("Parse error: {}", e)))?;

        Ok(result
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================
// Similarity Classifier
// ============================================

pub struct LlmSimilarityClassifier {
    provider: Arc<dyn LlmProvider>,
    max_tokens: u32,
}

impl LlmSimilarityClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>, max_tokens: u32) -> Self {
        Self {
            provider,
            max_tokens,
        }
    }

    fn build_prompt(candidate: &ContentItem, current: &ContentItem) -> String {
        format!(
            r#"You compare news articles. Rate how similar in topic these two articles are.

Article A:
Title: {title_a}
Excerpt: {excerpt_a}

Article B:
Title: {title_b}
Excerpt: {excerpt_b}

Answer with ONLY a number between 0 and 1, where 0 means unrelated and 1 means the same story. No other text."#,
            title_a = current.title,
            excerpt_a = truncate_chars(&current.excerpt, MAX_EXCERPT_CHARS),
            title_b = candidate.title,
            excerpt_b = truncate_chars(&candidate.excerpt, MAX_EXCERPT_CHARS),
        )
    }
}

#[async_trait]
impl SimilarityClassifier for LlmSimilarityClassifier {
    async fn similarity(&self, candidate: &ContentItem, current: &ContentItem) -> Result<f32> {
        let prompt = Self::build_prompt(candidate, current);
        let response = self.provider.complete(&prompt, self.max_tokens).await?;
        parse_similarity_response(&response)
    }
}

/// Parse a bare float in [0, 1], tolerating code fences and whitespace
pub fn parse_similarity_response(response: &str) -> Result<f32> {
    let text = if response.contains("```") {
        response.split("```").nth(1).unwrap_or(response)
    } else {
        response
    };
    let text = text.trim().trim_start_matches("json").trim();

    let score: f32 = text.parse().map_err(|_| {
        ClassifierError::InvalidResponse(format!("expected a number, got {:?}", response))
    })?;

    if !score.is_finite() || !(0.0..=1.0).contains(&score) {
        return Err(ClassifierError::InvalidResponse(format!(
            "score {} outside [0, 1]",
            score
        )));
    }

    Ok(score)
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Build the configured classifier, or None when the LLM is disabled or
/// cannot be constructed
pub fn build_classifier(config: &LlmConfig) -> Option<Arc<dyn SimilarityClassifier>> {
    if !config.enabled {
        info!("LLM similarity classifier is disabled");
        return None;
    }

    let timeout = Duration::from_millis(config.timeout_ms);
    let provider: Result<Arc<dyn LlmProvider>> = match config.provider.as_str() {
        "openai" => OpenAIProvider::new(&config.api_key, &config.model, timeout)
            .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
        "anthropic" => AnthropicProvider::new(&config.api_key, &config.model, timeout)
            .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
        other => {
            warn!(provider = %other, "Unknown LLM provider, using Anthropic");
            AnthropicProvider::new(&config.api_key, &config.model, timeout)
                .map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
        }
    };

    match provider {
        Ok(provider) => {
            info!(
                provider = provider.name(),
                model = %config.model,
                "LLM similarity classifier initialized"
            );
            Some(Arc::new(LlmSimilarityClassifier::new(
                provider,
                config.max_tokens,
            )))
        }
        Err(e) => {
            warn!(error = %e, "Failed to build LLM provider, heuristic similarity only");
            None
        }
    }
}
