//! Chat-completion transport boundary
//!
//! Every probe in the harness submits through the [`TransportClient`] trait:
//! a single-shot, blocking chat-completion call with no retries. The trait
//! keeps the wire protocol out of the core and lets tests inject
//! deterministic mocks.
//!
//! [`HttpTransport`] is the production implementation, speaking the
//! OpenAI-compatible `/v1/chat/completions` convention (vLLM, llama.cpp,
//! Ollama's OpenAI facade).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SondearError};

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// A single message in a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,
    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// One chat-completion request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier
    pub model: String,
    /// Conversation messages
    pub messages: Vec<ChatMessage>,
    /// Output token ceiling
    pub max_tokens: usize,
    /// Sampling temperature (0.0-0.2 for factual retrieval)
    pub temperature: f32,
}

/// Token usage reported by the endpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: usize,
    /// Tokens generated in the completion
    pub completion_tokens: usize,
    /// Prompt + completion tokens
    pub total_tokens: usize,
}

/// A well-formed completion result
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// Generated text, possibly empty
    pub content: String,
    /// Token usage, when the endpoint reports it
    pub usage: Option<TokenUsage>,
    /// Finish reason, when the endpoint reports it
    pub finish_reason: Option<String>,
}

/// Single-shot blocking chat-completion transport
///
/// Implementations perform exactly one attempt per call; the harness never
/// retries. Failures carry a human-readable message so the scaling probe can
/// match the context-limit signature against it.
pub trait TransportClient {
    /// Submit one chat-completion request and block until it resolves
    ///
    /// # Errors
    /// Returns [`SondearError::Transport`] on network failure, timeout, or
    /// non-2xx status, and [`SondearError::Format`] when the body cannot be
    /// parsed as a completion.
    fn submit(&self, request: &ChatRequest) -> Result<ChatOutcome>;
}

// ============================================================================
// Wire types (OpenAI chat-completion convention)
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP transport for OpenAI-compatible endpoints
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    /// Create a transport with the default 120 s timeout
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT_SECS)
    }

    /// Create a transport with a custom per-request timeout
    #[must_use]
    pub fn with_timeout(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .expect("failed to build HTTP client"),
            base_url: base_url.into(),
            api_key: None,
        }
    }

    /// Attach a bearer API key to every request
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Base URL this transport targets
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check whether the endpoint answers on `/v1/models`
    ///
    /// # Errors
    /// Returns [`SondearError::Transport`] when the server is unreachable.
    pub fn health_check(&self) -> Result<bool> {
        let url = format!("{}/v1/models", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| SondearError::Transport(format!("health check failed: {}", e)))?;
        Ok(response.status().is_success())
    }
}

impl TransportClient for HttpTransport {
    fn submit(&self, request: &ChatRequest) -> Result<ChatOutcome> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));

        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .map_err(|e| SondearError::Transport(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            // The body text is what carries a server's context-limit message
            let body = response.text().unwrap_or_default();
            return Err(SondearError::Transport(format!(
                "HTTP {} from {}: {}",
                status, url, body
            )));
        }

        let wire: WireResponse = response.json().map_err(|e| SondearError::Format {
            reason: format!("failed to parse completion response: {}", e),
        })?;

        let (content, finish_reason) = wire
            .choices
            .into_iter()
            .next()
            .map_or((String::new(), None), |c| {
                (c.message.content.unwrap_or_default(), c.finish_reason)
            });

        Ok(ChatOutcome {
            content,
            usage: wire.usage,
            finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_serializes_openai_shape() {
        let request = ChatRequest {
            model: "nemotron".to_string(),
            messages: vec![ChatMessage::user("hello")],
            max_tokens: 50,
            temperature: 0.1,
        };
        let json = serde_json::to_value(&request).expect("serializable");
        assert_eq!(json["model"], "nemotron");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
        assert_eq!(json["max_tokens"], 50);
    }

    #[test]
    fn test_wire_response_parses_usage_and_content() {
        let body = r#"{
            "choices": [{
                "message": {"role": "assistant", "content": "RAINBOW-UNICORN-42"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 1000, "completion_tokens": 12, "total_tokens": 1012}
        }"#;
        let wire: WireResponse = serde_json::from_str(body).expect("valid wire body");
        assert_eq!(wire.choices[0].message.content.as_deref(), Some("RAINBOW-UNICORN-42"));
        let usage = wire.usage.expect("usage present");
        assert_eq!(usage.total_tokens, 1012);
    }

    #[test]
    fn test_wire_response_tolerates_missing_fields() {
        let body = r#"{"choices": [{"message": {}}]}"#;
        let wire: WireResponse = serde_json::from_str(body).expect("minimal body parses");
        assert!(wire.choices[0].message.content.is_none());
        assert!(wire.usage.is_none());
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(ChatMessage::user("x").role, "user");
        assert_eq!(ChatMessage::system("x").role, "system");
    }

    #[test]
    fn test_transport_builder() {
        let transport = HttpTransport::new("http://localhost:8000/").with_api_key("not-needed");
        assert_eq!(transport.base_url(), "http://localhost:8000/");
    }
}
