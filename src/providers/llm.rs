use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("completion response contained no choices")]
    Empty,
    #[error("no API key configured")]
    MissingApiKey,
}

impl LlmError {
    /// Rate limits, server-side failures and transport errors are worth
    /// retrying; anything else is terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Transport(_) => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::Empty | LlmError::MissingApiKey => false,
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError>;
}

/// Client for the Groq OpenAI-compatible chat completion API.
///
/// Transient failures are retried in-place with a fixed backoff, so
/// callers only ever see the final outcome.
#[derive(Debug, Clone)]
pub struct GroqProvider {
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    retry_backoff: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

impl GroqProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: "llama-3.3-70b-versatile".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_retry(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        self
    }

    async fn complete_once(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let result: CompletionResponse = response.json().await?;
        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(LlmError::Empty)
    }
}

#[async_trait]
impl LlmProvider for GroqProvider {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let mut attempt = 0;
        loop {
            match self.complete_once(&messages).await {
                Ok(content) => return Ok(content),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        error = %err,
                        "transient completion failure, retrying"
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Scripted provider for tests: fixed response, optional latency, a
/// failure budget, and peak-concurrency tracking for permit-pool tests.
pub struct MockLlmProvider {
    response: String,
    delay: Option<Duration>,
    fail_first: AtomicU32,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self::with_response("Mock response with enough detail to rank as a confident answer.")
    }

    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            delay: None,
            fail_first: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the first `n` calls with a transient error.
    pub fn failing_first(self, n: u32) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, _messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(LlmError::Api {
                status: 503,
                body: "mock outage".to_string(),
            });
        }

        Ok(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        assert_eq!(ChatMessage::system("a").role, "system");
        assert_eq!(ChatMessage::user("b").role, "user");
        assert_eq!(ChatMessage::assistant("c").role, "assistant");
    }

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::Api {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(LlmError::Api {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(!LlmError::Api {
            status: 401,
            body: String::new()
        }
        .is_transient());
        assert!(!LlmError::Empty.is_transient());
        assert!(!LlmError::MissingApiKey.is_transient());
    }

    #[test]
    fn test_groq_provider_builder() {
        let provider = GroqProvider::new("key".to_string())
            .with_model("mixtral-8x7b-32768".to_string())
            .with_retry(5, Duration::from_millis(10));
        assert_eq!(provider.model, "mixtral-8x7b-32768");
        assert_eq!(provider.max_retries, 5);
    }

    #[tokio::test]
    async fn test_groq_provider_requires_api_key() {
        let provider = GroqProvider::new(String::new());
        let err = provider
            .complete(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_mock_provider_counts_calls() {
        let provider = MockLlmProvider::with_response("ok");
        provider.complete(vec![ChatMessage::user("x")]).await.unwrap();
        provider.complete(vec![ChatMessage::user("y")]).await.unwrap();
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_provider_failure_budget() {
        let provider = MockLlmProvider::new().failing_first(1);
        let first = provider.complete(vec![ChatMessage::user("x")]).await;
        assert!(first.is_err());
        assert!(first.unwrap_err().is_transient());
        let second = provider.complete(vec![ChatMessage::user("x")]).await;
        assert!(second.is_ok());
    }
}
